//! Cycle tokens and in-flight accounting.
//!
//! One token is honored at a time. Every envelope successfully enqueued for a
//! cycle counts as in flight until a worker has finished with it (including
//! publishing its children), so a cycle is idle once its count drops to zero.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::envelope::CycleToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "cycle", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A fresh cycle was opened with this token.
    Started(CycleToken),
    /// A cycle is still in flight; the trigger was ignored.
    Coalesced(CycleToken),
}

impl TriggerOutcome {
    pub fn token(&self) -> CycleToken {
        match self {
            Self::Started(t) | Self::Coalesced(t) => *t,
        }
    }

    pub fn started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Debug, Default)]
struct State {
    current: Option<CycleToken>,
    pending: HashMap<CycleToken, usize>,
}

impl State {
    fn total(&self) -> usize {
        self.pending.values().sum()
    }
}

#[derive(Debug, Default)]
pub struct CycleTracker {
    state: Mutex<State>,
    idle: Notify,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cycle unless one is still in flight. `force` replaces the current
    /// token, invalidating it. A started cycle holds one reservation that the
    /// caller must release with `completed` once the trigger is published.
    pub fn begin(&self, force: bool) -> TriggerOutcome {
        let mut s = self.lock();
        if let Some(cur) = s.current {
            let busy = s.pending.get(&cur).copied().unwrap_or(0) > 0;
            if busy && !force {
                counter!("cycles_coalesced_total").increment(1);
                info!(target: "scheduler", cycle = %cur, "collection already in flight; trigger coalesced");
                return TriggerOutcome::Coalesced(cur);
            }
        }
        let token = CycleToken::fresh();
        if let Some(old) = s.current.replace(token) {
            debug!(target: "scheduler", old = %old, new = %token, "cycle token replaced");
        }
        *s.pending.entry(token).or_insert(0) += 1;
        counter!("cycles_started_total").increment(1);
        info!(target: "scheduler", cycle = %token, forced = force, "collection cycle started");
        TriggerOutcome::Started(token)
    }

    /// Invalidate the current token. Returns it if there was one.
    pub fn cancel(&self) -> Option<CycleToken> {
        let cancelled = self.lock().current.take();
        if let Some(t) = cancelled {
            info!(target: "scheduler", cycle = %t, "collection cycle cancelled");
        }
        cancelled
    }

    pub fn current(&self) -> Option<CycleToken> {
        self.lock().current
    }

    pub fn is_valid(&self, token: CycleToken) -> bool {
        self.lock().current == Some(token)
    }

    pub fn enqueued(&self, token: CycleToken) {
        *self.lock().pending.entry(token).or_insert(0) += 1;
    }

    pub fn completed(&self, token: CycleToken) {
        let idle = {
            let mut s = self.lock();
            if let Some(n) = s.pending.get_mut(&token) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    s.pending.remove(&token);
                }
            }
            s.total() == 0
        };
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Envelopes in flight across all cycles.
    pub fn in_flight(&self) -> usize {
        self.lock().total()
    }

    pub fn in_flight_for(&self, token: CycleToken) -> usize {
        self.lock().pending.get(&token).copied().unwrap_or(0)
    }

    /// Resolve once nothing is in flight. False on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight() == 0;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
