//! Collector: fetches every enabled source, filters, deduplicates, emits NewsItems.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dedup::{fingerprint, FingerprintStore};
use crate::envelope::{Envelope, Topic};
use crate::error::StageError;
use crate::ingest::is_ai_related;
use crate::ingest::types::{SourceFetcher, SourceSpec};
use crate::model::{Artifact, NewsItem};
use crate::routing::RoutingPolicy;
use crate::stage::Stage;

pub const NAME: &str = "collector";

/// Runtime switches for domestic / international sources.
#[derive(Debug)]
pub struct SourceToggles {
    domestic: AtomicBool,
    international: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleState {
    pub domestic: bool,
    pub international: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            domestic: AtomicBool::new(true),
            international: AtomicBool::new(true),
        }
    }
}

impl SourceToggles {
    /// `None` leaves a switch as it is.
    pub fn set(&self, domestic: Option<bool>, international: Option<bool>) -> ToggleState {
        if let Some(v) = domestic {
            self.domestic.store(v, Ordering::SeqCst);
        }
        if let Some(v) = international {
            self.international.store(v, Ordering::SeqCst);
        }
        self.get()
    }

    pub fn get(&self) -> ToggleState {
        ToggleState {
            domestic: self.domestic.load(Ordering::SeqCst),
            international: self.international.load(Ordering::SeqCst),
        }
    }
}

pub struct CollectorStage {
    fetcher: Arc<dyn SourceFetcher>,
    sources: Vec<SourceSpec>,
    keywords: Vec<String>,
    dedup: Arc<FingerprintStore>,
    toggles: Arc<SourceToggles>,
    routing: RoutingPolicy,
}

impl CollectorStage {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        sources: Vec<SourceSpec>,
        keywords: Vec<String>,
        dedup: Arc<FingerprintStore>,
        toggles: Arc<SourceToggles>,
        routing: RoutingPolicy,
    ) -> Self {
        Self {
            fetcher,
            sources,
            keywords,
            dedup,
            toggles,
            routing,
        }
    }

    fn enabled(&self) -> Vec<&SourceSpec> {
        let t = self.toggles.get();
        self.sources
            .iter()
            .filter(|s| {
                if self.routing.is_domestic(&s.language) {
                    t.domestic
                } else {
                    t.international
                }
            })
            .collect()
    }
}

#[async_trait]
impl Stage for CollectorStage {
    fn name(&self) -> &str {
        NAME
    }

    fn topics(&self) -> Vec<Topic> {
        vec![Topic::collect()]
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError> {
        if !matches!(*env.payload, Artifact::Collect(_)) {
            return Err(super::unexpected(NAME, env));
        }

        let sources = self.enabled();
        let mut out = Vec::new();
        let mut fetched_ok = 0usize;
        let mut last_transient: Option<String> = None;
        let (mut filtered, mut duplicates, mut invalid) = (0usize, 0usize, 0usize);

        for spec in &sources {
            let docs = match self.fetcher.fetch(spec).await {
                Ok(docs) => {
                    fetched_ok += 1;
                    docs
                }
                Err(e) => {
                    warn!(target: "collector", source = %spec.name, error = %e, "fetch failed");
                    if e.is_retryable() {
                        last_transient = Some(format!("{}: {e}", spec.name));
                    }
                    continue;
                }
            };

            for doc in docs {
                if !is_ai_related(&doc.title, &doc.body, &self.keywords) {
                    filtered += 1;
                    continue;
                }
                let item = match NewsItem::from_raw(&doc) {
                    Ok(item) => item,
                    Err(e) => {
                        invalid += 1;
                        debug!(target: "collector", source = %spec.name, error = %e, "document rejected");
                        continue;
                    }
                };
                // same title from the same source, or the same item id under an edited title
                let title_key = fingerprint(item.title(), item.source());
                let id_key = format!("id:{}", item.id());
                if !self.dedup.check_and_insert_all(&[&title_key, &id_key]) {
                    duplicates += 1;
                    counter!("dedup_suppressed_total").increment(1);
                    continue;
                }
                out.push(Artifact::News(item));
            }
        }

        // every source failed, at least one of them transiently: worth another attempt
        if fetched_ok == 0 && !sources.is_empty() {
            if let Some(err) = last_transient {
                return Err(StageError::transient(format!("all sources failed; last: {err}")));
            }
        }

        info!(
            target: "collector",
            cycle = %env.cycle,
            sources = sources.len(),
            emitted = out.len(),
            filtered,
            duplicates,
            invalid,
            "collection finished"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CycleToken;
    use crate::error::CollaboratorError;
    use crate::ingest::types::RawDocument;
    use crate::model::fixtures::raw;
    use crate::model::CollectRequest;
    use std::time::Duration;

    struct Fixed(Vec<RawDocument>);

    #[async_trait]
    impl SourceFetcher for Fixed {
        async fn fetch(&self, spec: &SourceSpec) -> Result<Vec<RawDocument>, CollaboratorError> {
            if spec.name == "down" {
                return Err(CollaboratorError::Timeout(Duration::from_secs(1)));
            }
            Ok(self
                .0
                .iter()
                .filter(|d| d.language == spec.language)
                .cloned()
                .collect())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn spec(name: &str, lang: &str) -> SourceSpec {
        SourceSpec {
            name: name.into(),
            url: format!("https://{name}.test/rss"),
            language: lang.into(),
            country: "kr".into(),
        }
    }

    fn trigger() -> Envelope {
        Envelope::trigger(
            CycleToken::fresh(),
            CollectRequest {
                requested_at: chrono::Utc::now(),
                forced: false,
            },
        )
    }

    fn collector(docs: Vec<RawDocument>, sources: Vec<SourceSpec>, toggles: Arc<SourceToggles>) -> CollectorStage {
        CollectorStage::new(
            Arc::new(Fixed(docs)),
            sources,
            vec!["AI".into(), "GPT".into(), "인공지능".into()],
            Arc::new(FingerprintStore::new(Duration::from_secs(3600), 100)),
            toggles,
            RoutingPolicy::new("ko"),
        )
    }

    #[tokio::test]
    async fn duplicates_and_off_topic_documents_are_dropped() {
        let docs = vec![
            raw("OpenAI GPT update", "Wire", "https://w.test/1", "en"),
            raw("OpenAI GPT update!", "Wire", "https://w.test/1?utm=x", "en"),
            raw("Football results", "Wire", "https://w.test/2", "en"),
        ];
        let c = collector(docs, vec![spec("wire", "en")], Arc::default());
        let out = c.handle(&trigger()).await.unwrap();
        assert_eq!(out.len(), 1);

        // second cycle: same fingerprint is still within the TTL
        assert!(c.handle(&trigger()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edited_title_under_same_url_is_a_duplicate() {
        let docs = vec![
            raw("OpenAI ships GPT-5", "Wire", "https://w.test/a", "en"),
            raw("OpenAI ships GPT-5 (updated)", "Wire", "https://w.test/a", "en"),
        ];
        let c = collector(docs, vec![spec("wire", "en")], Arc::default());
        let out = c.handle(&trigger()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Artifact::News(n) if n.title() == "OpenAI ships GPT-5"));
    }

    #[tokio::test]
    async fn toggles_skip_disabled_source_groups() {
        let docs = vec![
            raw("인공지능 스타트업 투자", "국내", "https://k.test/1", "ko"),
            raw("GPT news", "Wire", "https://w.test/1", "en"),
        ];
        let toggles = Arc::new(SourceToggles::default());
        toggles.set(None, Some(false));
        let c = collector(docs, vec![spec("kr", "ko"), spec("wire", "en")], toggles);
        let out = c.handle(&trigger()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Artifact::News(n) if n.language() == "ko"));
    }

    #[tokio::test]
    async fn all_sources_down_is_transient() {
        let c = collector(vec![], vec![spec("down", "en")], Arc::default());
        assert!(c.handle(&trigger()).await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn partial_outage_still_emits() {
        let docs = vec![raw("AI chips", "Wire", "https://w.test/9", "en")];
        let c = collector(docs, vec![spec("down", "en"), spec("wire", "en")], Arc::default());
        assert_eq!(c.handle(&trigger()).await.unwrap().len(), 1);
    }
}
