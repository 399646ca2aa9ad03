//! Concrete pipeline stages.

pub mod analyzer;
pub mod categorizer;
pub mod collector;
pub mod sender;
pub mod translator;

pub use analyzer::AnalyzerStage;
pub use categorizer::CategorizerStage;
pub use collector::{CollectorStage, SourceToggles};
pub use sender::SenderStage;
pub use translator::TranslatorStage;

use crate::envelope::Envelope;
use crate::error::StageError;

/// Envelope carried an artifact this stage does not consume.
pub(crate) fn unexpected(stage: &str, env: &Envelope) -> StageError {
    StageError::permanent(format!(
        "{stage} cannot handle {} on topic '{}'",
        env.payload.kind(),
        env.topic
    ))
}
