use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use tracing::debug;

use super::{Channel, DeliveryResult, Deliverer, OutboundMessage};
use crate::error::CollaboratorError;

/// SMTP delivery; `target` is the recipient address.
pub struct EmailDeliverer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

fn env_required(key: &'static str) -> Result<String, CollaboratorError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(CollaboratorError::NotConfigured(key))
}

impl EmailDeliverer {
    /// Reads `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NOTIFY_EMAIL_FROM`.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        let host = env_required("SMTP_HOST")?;
        let user = env_required("SMTP_USER")?;
        let pass = env_required("SMTP_PASS")?;
        let from_addr = env_required("NOTIFY_EMAIL_FROM")?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .map_err(|e| CollaboratorError::Rejected(format!("invalid SMTP_HOST: {e}")))?
            .credentials(Credentials::new(user, pass))
            .build();
        let from = from_addr
            .parse()
            .map_err(|e| CollaboratorError::Rejected(format!("invalid NOTIFY_EMAIL_FROM: {e}")))?;

        Ok(Self { mailer, from })
    }

    fn build(&self, to: Mailbox, message: &OutboundMessage) -> Result<Message, CollaboratorError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone());

        let built = match &message.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                html.clone(),
            )),
            None => builder.singlepart(
                SinglePart::builder()
                    .header(header::ContentType::TEXT_PLAIN)
                    .body(message.text.clone()),
            ),
        };
        built.map_err(|e| CollaboratorError::Rejected(format!("building email: {e}")))
    }
}

#[async_trait]
impl Deliverer for EmailDeliverer {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<DeliveryResult, CollaboratorError> {
        let to: Mailbox = target
            .parse()
            .map_err(|e| CollaboratorError::Rejected(format!("invalid recipient '{target}': {e}")))?;
        let email = self.build(to, message)?;

        self.mailer.send(email).await.map_err(|e| {
            if e.is_transient() {
                CollaboratorError::Unavailable(format!("smtp: {e}"))
            } else if e.is_permanent() {
                CollaboratorError::Rejected(format!("smtp: {e}"))
            } else {
                CollaboratorError::Network(format!("smtp: {e}"))
            }
        })?;

        debug!(target: "notify", to = target, "email sent");
        Ok(DeliveryResult {
            channel: Channel::Email,
            target: target.to_string(),
            parts: 1,
        })
    }
}
