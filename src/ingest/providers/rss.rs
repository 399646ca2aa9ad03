// src/ingest/providers/rss.rs
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::CollaboratorError;
use crate::ingest::normalize_text;
use crate::ingest::types::{RawDocument, SourceFetcher, SourceSpec};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

enum Mode {
    /// url -> xml body
    Fixture(HashMap<String, String>),
    Http { client: reqwest::Client },
}

/// RSS 2.0 fetcher. Over HTTP in production, from in-memory fixtures in tests.
pub struct RssFetcher {
    mode: Mode,
    max_items: usize,
}

impl RssFetcher {
    pub fn http(timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .user_agent("ai-news-alert/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Network(format!("building http client: {e}")))?;
        Ok(Self {
            mode: Mode::Http { client },
            max_items: 10,
        })
    }

    pub fn from_fixture(url: &str, xml: &str) -> Self {
        let mut map = HashMap::new();
        map.insert(url.to_string(), xml.to_string());
        Self {
            mode: Mode::Fixture(map),
            max_items: 10,
        }
    }

    pub fn with_fixture(mut self, url: &str, xml: &str) -> Self {
        if let Mode::Fixture(map) = &mut self.mode {
            map.insert(url.to_string(), xml.to_string());
        }
        self
    }

    /// Only the newest `n` entries of each feed are kept.
    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n.max(1);
        self
    }

    async fn load(&self, spec: &SourceSpec) -> Result<String, CollaboratorError> {
        match &self.mode {
            Mode::Fixture(map) => map
                .get(&spec.url)
                .cloned()
                .ok_or_else(|| CollaboratorError::Rejected(format!("no fixture for {}", spec.url))),
            Mode::Http { client } => {
                let rsp = client
                    .get(&spec.url)
                    .send()
                    .await
                    .map_err(|e| CollaboratorError::from_reqwest(&spec.name, e))?;
                let status = rsp.status();
                if !status.is_success() {
                    return Err(CollaboratorError::from_status(
                        &spec.name,
                        status.as_u16(),
                        status.canonical_reason().unwrap_or_default(),
                    ));
                }
                rsp.text()
                    .await
                    .map_err(|e| CollaboratorError::from_reqwest(&spec.name, e))
            }
        }
    }

    fn parse(&self, spec: &SourceSpec, xml: &str) -> Result<Vec<RawDocument>, CollaboratorError> {
        let rss: Rss = from_str(xml)
            .map_err(|e| CollaboratorError::Malformed(format!("{}: {e}", spec.name)))?;
        let source = rss
            .channel
            .title
            .as_deref()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| spec.name.clone());

        let mut out = Vec::new();
        for it in rss.channel.item.into_iter().take(self.max_items) {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let Some(url) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
            else {
                continue;
            };
            if title.is_empty() {
                continue;
            }
            out.push(RawDocument {
                title,
                body: normalize_text(it.description.as_deref().unwrap_or_default()),
                url,
                source: source.clone(),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                language: spec.language.clone(),
                country: spec.country.clone(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self, spec: &SourceSpec) -> Result<Vec<RawDocument>, CollaboratorError> {
        let t0 = std::time::Instant::now();
        let xml = self.load(spec).await?;
        let docs = self.parse(spec, &xml)?;

        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_documents_total").increment(docs.len() as u64);
        Ok(docs)
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}
