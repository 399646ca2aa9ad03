// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Document as returned by a fetch collaborator, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub body: String,
    pub url: String,
    pub source: String, // e.g., "TechCrunch", "ZDNet Korea"
    pub published_at: Option<DateTime<Utc>>,
    pub language: String, // e.g., "en", "ko"
    pub country: String,  // e.g., "us", "kr"
}

/// One configured news source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

/// Collection collaborator: `fetch(sourceSpec) -> list of RawDocument`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, spec: &SourceSpec) -> Result<Vec<RawDocument>, CollaboratorError>;
    fn name(&self) -> &'static str;
}
