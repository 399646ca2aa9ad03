//! # Pipeline artifacts
//! Typed artifacts that travel through the pipeline, in causal order:
//! `NewsItem` → (`TranslatedNews`) → `AnalyzedNews` → `CategorizedNews`.
//!
//! Every artifact is validated once by its constructor and is immutable
//! afterwards (private fields, read-only accessors). Downstream stages never
//! re-validate what an upstream constructor accepted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::ingest::types::RawDocument;

/// Stable identity for a source document: first 12 hex chars of sha256(source|url).
pub fn news_id(source: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(url.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn non_empty(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(v.to_string())
}

fn unit_interval(field: &'static str, value: f32) -> Result<f32, ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange { field, value });
    }
    Ok(value)
}

/// Trigger payload for the collector.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CollectRequest {
    pub requested_at: DateTime<Utc>,
    pub forced: bool,
}

/// Raw collected, deduplicated news document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewsItem {
    id: String,
    title: String,
    body: String,
    url: String,
    source: String,
    published_at: DateTime<Utc>,
    language: String,
    country: String,
}

impl NewsItem {
    /// Build from a fetched document. Title, url, source and language are required.
    pub fn from_raw(doc: &RawDocument) -> Result<Self, ValidationError> {
        let title = non_empty("title", &doc.title)?;
        let url = non_empty("url", &doc.url)?;
        let source = non_empty("source", &doc.source)?;
        let language = non_empty("language", &doc.language)?.to_ascii_lowercase();
        Ok(Self {
            id: news_id(&source, &url),
            title,
            body: doc.body.trim().to_string(),
            url,
            source,
            published_at: doc.published_at.unwrap_or_else(Utc::now),
            language,
            country: doc.country.trim().to_ascii_lowercase(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn body(&self) -> &str {
        &self.body
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
    pub fn language(&self) -> &str {
        &self.language
    }
    pub fn country(&self) -> &str {
        &self.country
    }
}

/// A non-domestic `NewsItem` with its translation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranslatedNews {
    original: NewsItem,
    title: String,
    body: String,
    confidence: f32,
}

impl TranslatedNews {
    pub fn new(
        original: NewsItem,
        title: String,
        body: String,
        confidence: f32,
    ) -> Result<Self, ValidationError> {
        let title = non_empty("translated title", &title)?;
        let confidence = unit_interval("translation confidence", confidence)?;
        Ok(Self {
            original,
            title,
            body: body.trim().to_string(),
            confidence,
        })
    }

    pub fn original(&self) -> &NewsItem {
        &self.original
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn body(&self) -> &str {
        &self.body
    }
    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// What the analyzer consumed: the original item or its translation, never both.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "news", rename_all = "snake_case")]
pub enum AnalysisSource {
    Original(NewsItem),
    Translated(TranslatedNews),
}

impl AnalysisSource {
    /// The underlying collected item.
    pub fn item(&self) -> &NewsItem {
        match self {
            Self::Original(n) => n,
            Self::Translated(t) => t.original(),
        }
    }

    /// Title in the domestic locale.
    pub fn title(&self) -> &str {
        match self {
            Self::Original(n) => n.title(),
            Self::Translated(t) => t.title(),
        }
    }

    /// Body in the domestic locale.
    pub fn body(&self) -> &str {
        match self {
            Self::Original(n) => n.body(),
            Self::Translated(t) => t.body(),
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, Self::Translated(_))
    }
}

/// Bounds applied when an `AnalyzedNews` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    pub max_lines: usize,
    pub max_chars: usize,
    pub max_key_points: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_lines: 10,
            max_chars: 2000,
            max_key_points: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyzedNews {
    source: AnalysisSource,
    summary: String,
    key_points: Vec<String>,
    importance: f32,
    ai_relevance: f32,
}

impl AnalyzedNews {
    /// Summary is cut to `limits` (lines first, then chars); scores must be in [0, 1].
    pub fn new(
        source: AnalysisSource,
        summary: &str,
        key_points: Vec<String>,
        importance: f32,
        ai_relevance: f32,
        limits: &SummaryLimits,
    ) -> Result<Self, ValidationError> {
        let summary = bound_summary(summary, limits);
        let summary = non_empty("summary", &summary)?;
        let importance = unit_interval("importance score", importance)?;
        let ai_relevance = unit_interval("ai relevance score", ai_relevance)?;
        let key_points = key_points
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .take(limits.max_key_points)
            .collect();
        Ok(Self {
            source,
            summary,
            key_points,
            importance,
            ai_relevance,
        })
    }

    pub fn source(&self) -> &AnalysisSource {
        &self.source
    }
    pub fn item(&self) -> &NewsItem {
        self.source.item()
    }
    pub fn title(&self) -> &str {
        self.source.title()
    }
    pub fn summary(&self) -> &str {
        &self.summary
    }
    pub fn key_points(&self) -> &[String] {
        &self.key_points
    }
    pub fn importance(&self) -> f32 {
        self.importance
    }
    pub fn ai_relevance(&self) -> f32 {
        self.ai_relevance
    }
}

fn bound_summary(summary: &str, limits: &SummaryLimits) -> String {
    let by_lines = summary
        .lines()
        .take(limits.max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if by_lines.chars().count() > limits.max_chars {
        by_lines.chars().take(limits.max_chars).collect()
    } else {
        by_lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLevel {
    High,
    Medium,
    Low,
}

impl TrendLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for TrendLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown trend level '{other}'")),
        }
    }
}

/// Terminal artifact, fanned out to every sender.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorizedNews {
    analyzed: AnalyzedNews,
    category: String,
    tags: Vec<String>,
    trend: TrendLevel,
}

impl CategorizedNews {
    pub fn new(
        analyzed: AnalyzedNews,
        category: &str,
        tags: Vec<String>,
        trend: TrendLevel,
    ) -> Result<Self, ValidationError> {
        let category = non_empty("category", category)?;
        Ok(Self {
            analyzed,
            category,
            tags,
            trend,
        })
    }

    pub fn analyzed(&self) -> &AnalyzedNews {
        &self.analyzed
    }
    pub fn item(&self) -> &NewsItem {
        self.analyzed.item()
    }
    pub fn category(&self) -> &str {
        &self.category
    }
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
    pub fn trend(&self) -> TrendLevel {
        self.trend
    }
}

/// Payload carried by an envelope.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    Collect(CollectRequest),
    News(NewsItem),
    Translated(TranslatedNews),
    Analyzed(AnalyzedNews),
    Categorized(CategorizedNews),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collect(_) => "collect_request",
            Self::News(_) => "news_item",
            Self::Translated(_) => "translated_news",
            Self::Analyzed(_) => "analyzed_news",
            Self::Categorized(_) => "categorized_news",
        }
    }

    /// Id of the collected item this artifact descends from (None for triggers).
    pub fn news_id(&self) -> Option<&str> {
        match self {
            Self::Collect(_) => None,
            Self::News(n) => Some(n.id()),
            Self::Translated(t) => Some(t.original().id()),
            Self::Analyzed(a) => Some(a.item().id()),
            Self::Categorized(c) => Some(c.item().id()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn raw(title: &str, source: &str, url: &str, language: &str) -> RawDocument {
        RawDocument {
            title: title.to_string(),
            body: format!("{title}. Body text about machine learning research."),
            url: url.to_string(),
            source: source.to_string(),
            published_at: None,
            language: language.to_string(),
            country: "us".to_string(),
        }
    }

    pub fn item(language: &str) -> NewsItem {
        NewsItem::from_raw(&raw("OpenAI ships GPT update", "TechCrunch", "https://t.test/1", language))
            .unwrap()
    }
}
