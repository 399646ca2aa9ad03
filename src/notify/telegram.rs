use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::format::{split_message, TELEGRAM_MAX_CHARS};
use super::{Channel, DeliveryResult, Deliverer, OutboundMessage};
use crate::error::CollaboratorError;

/// Bot API `sendMessage`; `target` is the chat id.
#[derive(Clone)]
pub struct TelegramDeliverer {
    token: String,
    client: Client,
    api_base: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramDeliverer {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `TELEGRAM_BOT_TOKEN` must be set.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
            .ok_or(CollaboratorError::NotConfigured("TELEGRAM_BOT_TOKEN"))
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn send_part(&self, chat_id: &str, text: &str) -> Result<(), CollaboratorError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let rsp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
                disable_web_page_preview: false,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest("telegram", e.without_url()))?;

        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status("telegram", status.as_u16(), &detail));
        }
        Ok(())
    }
}

#[async_trait]
impl Deliverer for TelegramDeliverer {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<DeliveryResult, CollaboratorError> {
        let parts = split_message(&message.text, TELEGRAM_MAX_CHARS);
        for (i, part) in parts.iter().enumerate() {
            self.send_part(target, part).await?;
            if i + 1 < parts.len() {
                // stay under the per-chat rate limit
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        debug!(target: "notify", chat = target, parts = parts.len(), "telegram message sent");
        Ok(DeliveryResult {
            channel: Channel::Telegram,
            target: target.to_string(),
            parts: parts.len(),
        })
    }
}
