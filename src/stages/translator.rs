//! Translator: non-domestic NewsItem -> TranslatedNews.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::envelope::{Envelope, Topic};
use crate::error::StageError;
use crate::model::{Artifact, TranslatedNews};
use crate::stage::Stage;
use crate::translate::{ratio_confidence, Translator};

pub const NAME: &str = "translator";

pub struct TranslatorStage {
    translator: Arc<dyn Translator>,
    target_locale: String,
}

impl TranslatorStage {
    pub fn new(translator: Arc<dyn Translator>, target_locale: &str) -> Self {
        Self {
            translator,
            target_locale: target_locale.to_string(),
        }
    }
}

#[async_trait]
impl Stage for TranslatorStage {
    fn name(&self) -> &str {
        NAME
    }

    fn topics(&self) -> Vec<Topic> {
        vec![Topic::translate()]
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError> {
        let Artifact::News(item) = &*env.payload else {
            return Err(super::unexpected(NAME, env));
        };

        let title = self
            .translator
            .translate(item.title(), item.language(), &self.target_locale)
            .await?;
        let body = self
            .translator
            .translate(item.body(), item.language(), &self.target_locale)
            .await?;

        let confidence = ratio_confidence(item.title(), &title, item.body(), &body);
        debug!(
            target: "translator",
            correlation_id = %env.correlation_id,
            from = item.language(),
            to = %self.target_locale,
            confidence,
            "translated"
        );
        let translated = TranslatedNews::new(item.clone(), title, body, confidence)?;
        Ok(vec![Artifact::Translated(translated)])
    }
}
