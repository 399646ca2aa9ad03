//! Dead-letter log: append-only record of envelopes that will not be processed.
//!
//! Bounded in memory; once full the oldest entries are discarded.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::warn;

use crate::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Transient failures until `max_attempts`.
    Exhausted,
    /// Stage reported a permanent failure.
    Permanent,
    /// Subscriber queue full under the drop policy (or block timeout).
    Overflow,
    /// `handle()` panicked.
    Panicked,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Permanent => "permanent",
            Self::Overflow => "overflow",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Stage (or subscriber) the envelope failed at.
    pub stage: String,
    pub reason: DeadLetterReason,
    pub last_error: String,
    pub at: DateTime<Utc>,
    pub envelope: Envelope,
}

/// JSON view for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterView {
    pub stage: String,
    pub topic: String,
    pub correlation_id: String,
    pub attempt: u32,
    pub cycle: String,
    pub reason: DeadLetterReason,
    pub last_error: String,
    pub artifact: &'static str,
    pub at: DateTime<Utc>,
}

impl From<&DeadLetter> for DeadLetterView {
    fn from(d: &DeadLetter) -> Self {
        Self {
            stage: d.stage.clone(),
            topic: d.envelope.topic.to_string(),
            correlation_id: d.envelope.correlation_id.clone(),
            attempt: d.envelope.attempt,
            cycle: d.envelope.cycle.to_string(),
            reason: d.reason,
            last_error: d.last_error.clone(),
            artifact: d.envelope.payload.kind(),
            at: d.at,
        }
    }
}

/// Filter for `DeadLetterLog::query`. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQuery {
    pub stage: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DeadLetterQuery {
    fn matches(&self, d: &DeadLetter) -> bool {
        self.stage.as_deref().is_none_or(|s| s == d.stage)
            && self.since.is_none_or(|t| d.at >= t)
            && self.until.is_none_or(|t| d.at <= t)
    }
}

#[derive(Debug)]
pub struct DeadLetterLog {
    inner: Mutex<VecDeque<DeadLetter>>,
    cap: usize,
    total: std::sync::atomic::AtomicU64,
}

impl DeadLetterLog {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap,
            total: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn record(
        &self,
        stage: &str,
        envelope: &Envelope,
        reason: DeadLetterReason,
        last_error: impl Into<String>,
    ) {
        let last_error = last_error.into();
        warn!(
            target: "dead_letter",
            stage,
            topic = %envelope.topic,
            correlation_id = %envelope.correlation_id,
            attempt = envelope.attempt,
            cycle = %envelope.cycle,
            reason = %reason,
            error = %last_error,
            "envelope dead-lettered"
        );
        counter!("dead_letters_total", "stage" => stage.to_string(), "reason" => reason.as_str())
            .increment(1);

        let entry = DeadLetter {
            stage: stage.to_string(),
            reason,
            last_error,
            at: Utc::now(),
            envelope: envelope.clone(),
        };
        let mut q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        q.push_back(entry);
        while q.len() > self.cap {
            q.pop_front();
        }
        self.total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Entries matching `query`, oldest first.
    pub fn query(&self, query: &DeadLetterQuery) -> Vec<DeadLetter> {
        let q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        q.iter().filter(|d| query.matches(d)).cloned().collect()
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries ever recorded, including ones rotated out.
    pub fn total(&self) -> u64 {
        self.total.load(std::sync::atomic::Ordering::Relaxed)
    }
}
