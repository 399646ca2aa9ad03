//! Categorizer: AnalyzedNews -> CategorizedNews (terminal artifact).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::analyze::{trend_level, CategoryCatalog, TrendWeights};
use crate::envelope::{Envelope, Topic};
use crate::error::StageError;
use crate::history::History;
use crate::model::{Artifact, CategorizedNews};
use crate::stage::Stage;

pub const NAME: &str = "categorizer";

pub struct CategorizerStage {
    catalog: Arc<CategoryCatalog>,
    weights: TrendWeights,
    history: Arc<History>,
}

impl CategorizerStage {
    pub fn new(catalog: Arc<CategoryCatalog>, weights: TrendWeights, history: Arc<History>) -> Self {
        Self {
            catalog,
            weights: weights.sanitized(),
            history,
        }
    }
}

#[async_trait]
impl Stage for CategorizerStage {
    fn name(&self) -> &str {
        NAME
    }

    fn topics(&self) -> Vec<Topic> {
        vec![Topic::categorize()]
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError> {
        let Artifact::Analyzed(analyzed) = &*env.payload else {
            return Err(super::unexpected(NAME, env));
        };

        let class = self.catalog.classify(analyzed.title(), analyzed.summary());
        let trend = trend_level(analyzed.importance(), analyzed.ai_relevance(), &self.weights);
        let news = CategorizedNews::new(analyzed.clone(), &class.category_name, class.tags, trend)?;

        self.history.push(&news);
        info!(
            target: "categorizer",
            correlation_id = %env.correlation_id,
            category = %class.category_id,
            trend = %trend,
            title = %truncate(news.analyzed().title(), 60),
            "categorized"
        );
        Ok(vec![Artifact::Categorized(news)])
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
