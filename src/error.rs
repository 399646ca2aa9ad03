//! Error taxonomy for the pipeline core.
//!
//! Collaborators report what went wrong (`CollaboratorError`), stages turn that
//! into a retry classification (`StageError`), and the broker reports queue
//! conditions (`PublishError`). Artifact constructors fail with
//! `ValidationError`, which is never retryable.

use std::time::Duration;

use thiserror::Error;

/// Raised once, at artifact construction time. Downstream stages trust it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
}

/// Failure reported by an external collaborator (fetch, translate, summarize, deliver).
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl CollaboratorError {
    /// Network, timeout, rate-limit and 5xx failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }

    /// Map a `reqwest` failure onto the taxonomy.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(Duration::ZERO);
        }
        if let Some(status) = err.status() {
            return Self::from_status(service, status.as_u16(), &err.to_string());
        }
        if err.is_decode() {
            return Self::Malformed(format!("{service}: {err}"));
        }
        Self::Network(format!("{service}: {err}"))
    }

    /// Map a non-2xx HTTP status onto the taxonomy.
    pub fn from_status(service: &str, status: u16, detail: &str) -> Self {
        match status {
            429 => Self::RateLimited(service.to_string()),
            500..=599 => Self::Unavailable(format!("{service} returned {status}: {detail}")),
            _ => Self::Rejected(format!("{service} returned {status}: {detail}")),
        }
    }
}

/// Classification a stage hands to the retry controller.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Retryable: network, timeout, rate limit.
    #[error("transient: {0}")]
    Transient(String),

    /// Not retryable: validation, malformed input.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl StageError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<CollaboratorError> for StageError {
    fn from(err: CollaboratorError) -> Self {
        if err.is_retryable() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<ValidationError> for StageError {
    fn from(err: ValidationError) -> Self {
        Self::Permanent(format!("validation: {err}"))
    }
}

/// Outcome of a failed `Broker::publish` / `Broker::requeue` toward one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Queue full: blocking timed out, or the drop policy is in effect.
    #[error("queue for subscriber '{subscriber}' is full")]
    Capacity { subscriber: String },

    /// The subscriber went away (stopped or unsubscribed).
    #[error("subscriber '{subscriber}' is closed")]
    Closed { subscriber: String },
}

/// Stage registry misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("stage '{0}' is already registered")]
    Duplicate(String),

    #[error("no stage named '{0}'")]
    Unknown(String),

    #[error("stage '{0}' was stopped and cannot be restarted")]
    Stopped(String),
}

/// Rejected control-surface request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no deliverer configured for channel '{0}'")]
    ChannelUnavailable(String),

    #[error("delivery target must not be empty")]
    EmptyTarget,

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
