//! Sender: one broker subscriber per (channel, target), delivering CategorizedNews.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use crate::broker::SubscriberClass;
use crate::envelope::{Envelope, Topic};
use crate::error::StageError;
use crate::model::Artifact;
use crate::notify::{Channel, Deliverer};
use crate::stage::Stage;

pub struct SenderStage {
    name: String,
    channel: Channel,
    target: String,
    deliverer: Arc<dyn Deliverer>,
}

impl SenderStage {
    pub fn new(channel: Channel, target: &str, deliverer: Arc<dyn Deliverer>) -> Self {
        Self {
            name: Self::stage_name(channel, target),
            channel,
            target: target.to_string(),
            deliverer,
        }
    }

    /// Registry key for a delivery target; equals its delivery topic.
    pub fn stage_name(channel: Channel, target: &str) -> String {
        Topic::delivery(channel.as_str(), target).as_str().to_string()
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Stage for SenderStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn topics(&self) -> Vec<Topic> {
        vec![Topic::delivery(self.channel.as_str(), &self.target)]
    }

    fn class(&self) -> SubscriberClass {
        SubscriberClass::Sender
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError> {
        let Artifact::Categorized(news) = &*env.payload else {
            return Err(super::unexpected(&self.name, env));
        };

        match self.deliverer.deliver(news, &self.target).await {
            Ok(result) => {
                counter!("deliveries_total", "channel" => self.channel.as_str(), "outcome" => "ok")
                    .increment(1);
                info!(
                    target: "notify",
                    channel = %self.channel,
                    correlation_id = %env.correlation_id,
                    parts = result.parts,
                    "delivered"
                );
                Ok(Vec::new())
            }
            Err(e) => {
                let outcome = if e.is_retryable() { "retry" } else { "failed" };
                counter!("deliveries_total", "channel" => self.channel.as_str(), "outcome" => outcome)
                    .increment(1);
                warn!(
                    target: "notify",
                    channel = %self.channel,
                    correlation_id = %env.correlation_id,
                    attempt = env.attempt,
                    error = %e,
                    "delivery failed"
                );
                Err(e.into())
            }
        }
    }
}
