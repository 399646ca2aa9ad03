//! Keyword heuristics for summary, key points, importance and AI relevance.
//!
//! All functions are pure. Keyword matching is case-insensitive substring
//! matching on `title + " " + body`.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("sentence regex"));

/// AI terms and how strongly each signals AI relevance.
pub const AI_KEYWORD_WEIGHTS: &[(&str, f32)] = &[
    ("GPT", 0.9),
    ("ChatGPT", 0.9),
    ("LLM", 0.8),
    ("대규모 언어 모델", 0.9),
    ("deep learning", 0.7),
    ("딥러닝", 0.8),
    ("machine learning", 0.6),
    ("머신러닝", 0.7),
    ("neural network", 0.6),
    ("신경망", 0.7),
    ("computer vision", 0.6),
    ("컴퓨터 비전", 0.7),
    ("NLP", 0.6),
    ("자연어 처리", 0.7),
    ("AGI", 0.9),
    ("인공지능", 0.7),
];

/// Event words that make a story more important (launches, deals).
pub const EVENT_KEYWORD_WEIGHTS: &[(&str, f32)] = &[
    ("발표", 0.2),
    ("출시", 0.2),
    ("투자", 0.15),
    ("인수", 0.15),
    ("launch", 0.2),
    ("release", 0.2),
    ("investment", 0.15),
    ("acquisition", 0.15),
];

const BASE_IMPORTANCE: f32 = 0.3;
const MIN_SENTENCE_CHARS: usize = 10;
const SUMMARY_SENTENCES: usize = 8;

fn sentences(body: &str) -> impl Iterator<Item = &str> {
    RE_SENTENCE_END
        .split(body)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Title line followed by up to 8 bullet sentences longer than 10 chars.
pub fn simple_summary(title: &str, body: &str, max_lines: usize) -> String {
    let mut lines = vec![format!("제목: {title}")];
    lines.extend(
        sentences(body)
            .take(SUMMARY_SENTENCES)
            .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
            .map(|s| format!("• {s}")),
    );
    lines.truncate(max_lines.max(1));
    lines.join("\n")
}

/// Sentences mentioning an AI keyword, prefixed with the first keyword found.
pub fn key_points(body: &str, max_points: usize) -> Vec<String> {
    sentences(body)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .filter_map(|s| {
            let lower = s.to_lowercase();
            AI_KEYWORD_WEIGHTS
                .iter()
                .find(|(k, _)| lower.contains(&k.to_lowercase()))
                .map(|(k, _)| format!("{k}: {s}"))
        })
        .take(max_points)
        .collect()
}

/// 0.3 base, plus event keywords, plus a bonus for long bodies; capped at 1.
pub fn importance(title: &str, body: &str) -> f32 {
    let text = format!("{title} {body}").to_lowercase();
    let mut score = BASE_IMPORTANCE;
    for (k, w) in EVENT_KEYWORD_WEIGHTS {
        if text.contains(k) {
            score += w;
        }
    }
    let len = body.chars().count();
    if len > 2000 {
        score += 0.2;
    } else if len > 1000 {
        score += 0.1;
    }
    score.min(1.0)
}

/// Sum of matched AI keyword weights, ×1.2 when more than one matched; capped at 1.
pub fn ai_relevance(title: &str, body: &str) -> f32 {
    let text = format!("{title} {body}").to_lowercase();
    let mut score = 0.0;
    let mut matched = 0usize;
    for (k, w) in AI_KEYWORD_WEIGHTS {
        if text.contains(&k.to_lowercase()) {
            score += w;
            matched += 1;
        }
    }
    if matched > 1 {
        score *= 1.2;
    }
    f32::min(score, 1.0)
}
