//! Routing policy: where an artifact goes next.
//!
//! Stateless; stages call it after a successful `handle()`. The broker never
//! consults it.

use crate::envelope::Topic;
use crate::model::Artifact;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    domestic_locale: String,
}

impl RoutingPolicy {
    pub fn new(domestic_locale: &str) -> Self {
        Self {
            domestic_locale: primary_subtag(domestic_locale),
        }
    }

    pub fn domestic_locale(&self) -> &str {
        &self.domestic_locale
    }

    /// `ko`, `KO` and `ko-KR` all count as Korean when the domestic locale is `ko`.
    pub fn is_domestic(&self, language: &str) -> bool {
        primary_subtag(language) == self.domestic_locale
    }

    pub fn route(&self, artifact: &Artifact) -> Vec<Topic> {
        match artifact {
            Artifact::Collect(_) => vec![Topic::collect()],
            Artifact::News(n) if self.is_domestic(n.language()) => vec![Topic::analyze()],
            Artifact::News(_) => vec![Topic::translate()],
            Artifact::Translated(_) => vec![Topic::analyze()],
            Artifact::Analyzed(_) => vec![Topic::categorize()],
            Artifact::Categorized(_) => vec![Topic::broadcast()],
        }
    }
}

fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
