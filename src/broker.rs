//! Topic broker: one bounded queue per subscriber.
//!
//! `publish` fans an envelope out to every subscriber whose topic set contains
//! the envelope's topic; the reserved `broadcast` topic reaches every
//! sender-class subscriber. Per-subscriber order follows publish order.
//! A topic nobody listens to is logged and discarded.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{debug, warn};

use crate::cycle::CycleTracker;
use crate::dead_letter::{DeadLetterLog, DeadLetterReason};
use crate::envelope::{Envelope, Topic};
use crate::error::PublishError;

/// What to do when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait up to `block_timeout` for room, then dead-letter.
    #[default]
    Block,
    /// Dead-letter immediately.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub block_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            overflow: OverflowPolicy::Block,
            block_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberClass {
    /// Pipeline stage; receives only its own topics.
    Stage,
    /// Delivery endpoint; also receives `broadcast`.
    Sender,
}

#[derive(Debug)]
struct Subscription {
    id: String,
    topics: BTreeSet<Topic>,
    class: SubscriberClass,
    capacity: usize,
    tx: mpsc::Sender<Envelope>,
}

impl Subscription {
    fn accepts(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
            || (topic.is_broadcast() && self.class == SubscriberClass::Sender)
    }

    fn depth(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }
}

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: String,
    rx: mpsc::Receiver<Envelope>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn into_receiver(self) -> mpsc::Receiver<Envelope> {
        self.rx
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the envelope was enqueued on.
    pub delivered: usize,
    pub failed: Vec<PublishError>,
}

impl PublishReport {
    pub fn unrouted(&self) -> bool {
        self.delivered == 0 && self.failed.is_empty()
    }
}

/// Queue snapshot for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub subscriber: String,
    pub class: SubscriberClass,
    pub depth: usize,
    pub capacity: usize,
}

pub struct Broker {
    subs: RwLock<Vec<Arc<Subscription>>>,
    config: BrokerConfig,
    dead_letters: Arc<DeadLetterLog>,
    cycles: Arc<CycleTracker>,
}

impl Broker {
    pub fn new(
        config: BrokerConfig,
        dead_letters: Arc<DeadLetterLog>,
        cycles: Arc<CycleTracker>,
    ) -> Self {
        Self {
            subs: RwLock::new(Vec::new()),
            config,
            dead_letters,
            cycles,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn cycles(&self) -> &Arc<CycleTracker> {
        &self.cycles
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterLog> {
        &self.dead_letters
    }

    pub fn subscribe(
        &self,
        id: &str,
        topics: impl IntoIterator<Item = Topic>,
        class: SubscriberClass,
    ) -> SubscriptionHandle {
        self.subscribe_with_capacity(id, topics, class, self.config.queue_capacity)
    }

    /// Registering an id twice replaces the earlier subscription; its queue closes.
    pub fn subscribe_with_capacity(
        &self,
        id: &str,
        topics: impl IntoIterator<Item = Topic>,
        class: SubscriberClass,
        capacity: usize,
    ) -> SubscriptionHandle {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let sub = Arc::new(Subscription {
            id: id.to_string(),
            topics: topics.into_iter().collect(),
            class,
            capacity,
            tx,
        });
        debug!(target: "broker", subscriber = id, topics = ?sub.topics, ?class, capacity, "subscribed");

        let mut subs = self.subs.write().unwrap_or_else(|p| p.into_inner());
        if let Some(pos) = subs.iter().position(|s| s.id == id) {
            warn!(target: "broker", subscriber = id, "subscriber id re-registered; replacing");
            subs.remove(pos);
        }
        subs.push(sub);
        gauge!("broker_queue_depth", "subscriber" => id.to_string()).set(0.0);

        SubscriptionHandle {
            id: id.to_string(),
            rx,
        }
    }

    /// Stop routing to `id`. Already-queued envelopes stay with the receiver.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subs = self.subs.write().unwrap_or_else(|p| p.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if removed {
            debug!(target: "broker", subscriber = id, "unsubscribed");
        }
        removed
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.read().iter().any(|s| s.id == id)
    }

    /// Enqueue `env` on every matching subscriber.
    pub async fn publish(&self, env: Envelope) -> PublishReport {
        let targets: Vec<Arc<Subscription>> = self
            .read()
            .iter()
            .filter(|s| s.accepts(&env.topic))
            .cloned()
            .collect();

        let mut report = PublishReport::default();
        if targets.is_empty() {
            counter!("broker_unrouted_total").increment(1);
            warn!(
                target: "broker",
                topic = %env.topic,
                correlation_id = %env.correlation_id,
                artifact = env.payload.kind(),
                "no subscriber for topic; envelope discarded"
            );
            return report;
        }

        for sub in targets {
            match self.enqueue(&sub, env.stamped()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failed.push(e),
            }
        }
        counter!("broker_published_total").increment(1);
        report
    }

    /// Put `env` back on one subscriber's queue (retry path).
    pub async fn requeue(&self, subscriber: &str, env: Envelope) -> Result<(), PublishError> {
        let sub = self
            .read()
            .iter()
            .find(|s| s.id == subscriber)
            .cloned()
            .ok_or_else(|| PublishError::Closed {
                subscriber: subscriber.to_string(),
            })?;
        self.enqueue(&sub, env.stamped()).await
    }

    /// A worker finished with `env` (children already published).
    pub fn done(&self, env: &Envelope) {
        self.cycles.completed(env.cycle);
    }

    pub fn queue_depth(&self, subscriber: &str) -> Option<usize> {
        self.read()
            .iter()
            .find(|s| s.id == subscriber)
            .map(|s| s.depth())
    }

    pub fn queues(&self) -> Vec<QueueStatus> {
        self.read()
            .iter()
            .map(|s| QueueStatus {
                subscriber: s.id.clone(),
                class: s.class,
                depth: s.depth(),
                capacity: s.capacity,
            })
            .collect()
    }

    async fn enqueue(&self, sub: &Subscription, env: Envelope) -> Result<(), PublishError> {
        // counted before the send so a fast consumer can't complete it first
        self.cycles.enqueued(env.cycle);

        let res = match sub.tx.try_send(env) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(env)) => Err((env, closed(sub))),
            Err(TrySendError::Full(env)) => match self.config.overflow {
                OverflowPolicy::Drop => Err((env, capacity(sub))),
                OverflowPolicy::Block => {
                    counter!("broker_blocked_total").increment(1);
                    debug!(target: "broker", subscriber = %sub.id, "queue full; publisher blocking");
                    match sub.tx.send_timeout(env, self.config.block_timeout).await {
                        Ok(()) => Ok(()),
                        Err(SendTimeoutError::Timeout(env)) => Err((env, capacity(sub))),
                        Err(SendTimeoutError::Closed(env)) => Err((env, closed(sub))),
                    }
                }
            },
        };

        gauge!("broker_queue_depth", "subscriber" => sub.id.clone()).set(sub.depth() as f64);

        match res {
            Ok(()) => Ok(()),
            Err((env, err)) => {
                if matches!(err, PublishError::Capacity { .. }) {
                    counter!("broker_dropped_total").increment(1);
                    self.dead_letters.record(
                        &sub.id,
                        &env,
                        DeadLetterReason::Overflow,
                        err.to_string(),
                    );
                } else {
                    debug!(target: "broker", subscriber = %sub.id, topic = %env.topic, "subscriber closed; envelope skipped");
                }
                self.cycles.completed(env.cycle);
                Err(err)
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Subscription>>> {
        self.subs.read().unwrap_or_else(|p| p.into_inner())
    }
}

fn capacity(sub: &Subscription) -> PublishError {
    PublishError::Capacity {
        subscriber: sub.id.clone(),
    }
}

fn closed(sub: &Subscription) -> PublishError {
    PublishError::Closed {
        subscriber: sub.id.clone(),
    }
}
