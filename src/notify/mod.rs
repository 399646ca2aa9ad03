//! Delivery collaborators: channels, the `Deliverer` trait and its adapters.

pub mod email;
pub mod format;
pub mod telegram;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::model::CategorizedNews;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Telegram,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Telegram, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(Self::Telegram),
            "email" | "mail" => Ok(Self::Email),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// Rendered message, channel-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub subject: String,
    /// Markdown-flavoured plain text.
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub channel: Channel,
    pub target: String,
    /// Messages actually sent (long texts are split).
    pub parts: usize,
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<DeliveryResult, CollaboratorError>;

    async fn deliver(
        &self,
        news: &CategorizedNews,
        target: &str,
    ) -> Result<DeliveryResult, CollaboratorError> {
        self.send(target, &format::render(news)).await
    }
}
