//! Analyzer: domestic NewsItem or TranslatedNews -> AnalyzedNews.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::envelope::{Envelope, Topic};
use crate::error::StageError;
use crate::model::{AnalysisSource, AnalyzedNews, Artifact, SummaryLimits};
use crate::stage::Stage;
use crate::summarize::{Document, Summarizer};

pub const NAME: &str = "analyzer";

pub struct AnalyzerStage {
    summarizer: Arc<dyn Summarizer>,
    limits: SummaryLimits,
}

impl AnalyzerStage {
    pub fn new(summarizer: Arc<dyn Summarizer>, limits: SummaryLimits) -> Self {
        Self { summarizer, limits }
    }
}

#[async_trait]
impl Stage for AnalyzerStage {
    fn name(&self) -> &str {
        NAME
    }

    fn topics(&self) -> Vec<Topic> {
        vec![Topic::analyze()]
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError> {
        let source = match &*env.payload {
            Artifact::News(n) => AnalysisSource::Original(n.clone()),
            Artifact::Translated(t) => AnalysisSource::Translated(t.clone()),
            _ => return Err(super::unexpected(NAME, env)),
        };

        let s = self
            .summarizer
            .summarize(Document {
                title: source.title(),
                body: source.body(),
            })
            .await?;

        debug!(
            target: "analyzer",
            correlation_id = %env.correlation_id,
            model = self.summarizer.name(),
            importance = s.importance,
            ai_relevance = s.ai_relevance,
            "analyzed"
        );
        let analyzed = AnalyzedNews::new(
            source,
            &s.summary,
            s.key_points,
            s.importance,
            s.ai_relevance,
            &self.limits,
        )?;
        Ok(vec![Artifact::Analyzed(analyzed)])
    }
}
