//! Envelope: the unit the broker moves between stages.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{Artifact, CollectRequest};

/// Named broker channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Topic(String);

impl Topic {
    pub const COLLECT: &'static str = "collect";
    pub const TRANSLATE: &'static str = "translate";
    pub const ANALYZE: &'static str = "analyze";
    pub const CATEGORIZE: &'static str = "categorize";
    /// Reserved: consumed by every sender-class subscriber.
    pub const BROADCAST: &'static str = "broadcast";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn collect() -> Self {
        Self::new(Self::COLLECT)
    }
    pub fn translate() -> Self {
        Self::new(Self::TRANSLATE)
    }
    pub fn analyze() -> Self {
        Self::new(Self::ANALYZE)
    }
    pub fn categorize() -> Self {
        Self::new(Self::CATEGORIZE)
    }
    pub fn broadcast() -> Self {
        Self::new(Self::BROADCAST)
    }

    /// Per-target sender topic, e.g. `deliver.telegram.12345`.
    pub fn delivery(channel: &str, target: &str) -> Self {
        Self(format!("deliver.{channel}.{target}"))
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == Self::BROADCAST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag identifying one collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CycleToken(Uuid);

impl CycleToken {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CycleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell cycles apart in logs
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: Arc<Artifact>,
    /// Originating NewsItem id; stable across the whole causal chain.
    pub correlation_id: String,
    /// 1-based attempt number of the delivery being processed.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub cycle: CycleToken,
}

impl Envelope {
    /// Start of a cycle: the collect trigger.
    pub fn trigger(cycle: CycleToken, request: CollectRequest) -> Self {
        Self {
            topic: Topic::collect(),
            payload: Arc::new(Artifact::Collect(request)),
            correlation_id: format!("cycle-{cycle}"),
            attempt: 1,
            enqueued_at: Utc::now(),
            cycle,
        }
    }

    /// Child envelope for an artifact produced while handling `self`.
    /// The correlation id switches to the item id once an item exists.
    pub fn derive(&self, topic: Topic, artifact: Artifact) -> Self {
        let correlation_id = artifact
            .news_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.correlation_id.clone());
        Self {
            topic,
            payload: Arc::new(artifact),
            correlation_id,
            attempt: 1,
            enqueued_at: Utc::now(),
            cycle: self.cycle,
        }
    }

    /// Same envelope, next attempt. Never exceeds `max_attempts`.
    pub fn next_attempt(&self, max_attempts: u32) -> Self {
        let mut next = self.clone();
        next.attempt = (self.attempt + 1).min(max_attempts.max(1));
        next
    }

    /// Copy stamped at enqueue time.
    pub(crate) fn stamped(&self) -> Self {
        let mut e = self.clone();
        e.enqueued_at = Utc::now();
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::item;

    fn trigger() -> Envelope {
        Envelope::trigger(
            CycleToken::fresh(),
            CollectRequest {
                requested_at: Utc::now(),
                forced: false,
            },
        )
    }

    #[test]
    fn derived_envelope_takes_item_id_as_correlation() {
        let t = trigger();
        let news = item("en");
        let id = news.id().to_string();
        let child = t.derive(Topic::translate(), Artifact::News(news));
        assert_eq!(child.correlation_id, id);
        assert_eq!(child.cycle, t.cycle);
        assert_eq!(child.attempt, 1);
    }

    #[test]
    fn attempt_is_monotonic_and_capped() {
        let e = trigger();
        let e2 = e.next_attempt(3);
        let e3 = e2.next_attempt(3);
        let e4 = e3.next_attempt(3);
        assert_eq!((e2.attempt, e3.attempt, e4.attempt), (2, 3, 3));
    }

    #[test]
    fn delivery_topic_embeds_channel_and_target() {
        assert_eq!(
            Topic::delivery("email", "a@b.test").as_str(),
            "deliver.email.a@b.test"
        );
        assert!(Topic::broadcast().is_broadcast());
    }
}
