// src/ingest/mod.rs
//! Collection collaborators and the text helpers the collector relies on.

pub mod providers;
pub mod types;

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    out = RE_TAGS.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 8000 chars (summarizers only look at the head anyway)
    if out.chars().count() > 8000 {
        out = out.chars().take(8000).collect();
    }

    out
}

/// Title form used for fingerprinting: normalized, lowercased, trailing
/// sentence punctuation removed.
pub fn normalize_title(s: &str) -> String {
    let mut out = normalize_text(s).to_lowercase();
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | '…') {
            out.pop();
        } else {
            break;
        }
    }
    out.trim_end().to_string()
}

/// True when `keywords` is empty or any keyword occurs (case-insensitive) in title+body.
pub fn is_ai_related(title: &str, body: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let text = format!("{title} {body}").to_lowercase();
    keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}
