//! Stage contract, registry and worker loops.
//!
//! A stage declares the topics it consumes and turns one envelope into zero or
//! more artifacts. The registry owns the workers: each worker pulls one
//! envelope, runs `handle()` to completion in its own task, routes and
//! publishes the outputs, then pulls the next. Failures go through the retry
//! policy; nothing a handler does can take a worker down.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{Broker, SubscriberClass};
use crate::dead_letter::DeadLetterReason;
use crate::envelope::{Envelope, Topic};
use crate::error::{RegistryError, StageError};
use crate::model::Artifact;
use crate::retry::{RetryPolicy, Verdict};
use crate::routing::RoutingPolicy;

#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Registry key and broker subscriber id.
    fn name(&self) -> &str;

    fn topics(&self) -> Vec<Topic>;

    fn class(&self) -> SubscriberClass {
        SubscriberClass::Stage
    }

    async fn handle(&self, env: &Envelope) -> Result<Vec<Artifact>, StageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub name: String,
    pub state: StageState,
    pub class: SubscriberClass,
    pub workers: usize,
    pub queue_depth: usize,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>;

struct Running {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    rx: SharedReceiver,
}

struct Entry {
    stage: Arc<dyn Stage>,
    workers: usize,
    state: StageState,
    running: Option<Running>,
}

pub struct StageRegistry {
    broker: Arc<Broker>,
    routing: RoutingPolicy,
    retry: RetryPolicy,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl StageRegistry {
    pub fn new(broker: Arc<Broker>, routing: RoutingPolicy, retry: RetryPolicy) -> Self {
        Self {
            broker,
            routing,
            retry,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn register(&self, stage: Arc<dyn Stage>, workers: usize) -> Result<(), RegistryError> {
        let name = stage.name().to_string();
        let mut entries = self.lock();
        if entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        entries.insert(
            name,
            Entry {
                stage,
                workers: workers.max(1),
                state: StageState::Idle,
                running: None,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<StageState> {
        self.lock().get(name).map(|e| e.state)
    }

    /// Idle -> Running: subscribe and spawn the workers. No-op when running.
    pub fn start(&self, name: &str) -> Result<(), RegistryError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        match entry.state {
            StageState::Running => return Ok(()),
            StageState::Stopped => return Err(RegistryError::Stopped(name.to_string())),
            StageState::Idle => {}
        }

        let handle = self
            .broker
            .subscribe(name, entry.stage.topics(), entry.stage.class());
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(handle.into_receiver()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handles = (0..entry.workers)
            .map(|idx| {
                let worker = Worker {
                    stage: Arc::clone(&entry.stage),
                    name: name.to_string(),
                    idx,
                    broker: Arc::clone(&self.broker),
                    routing: self.routing.clone(),
                    retry: self.retry,
                    rx: Arc::clone(&rx),
                    stop: stop_rx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        entry.running = Some(Running {
            stop: stop_tx,
            handles,
            rx,
        });
        entry.state = StageState::Running;
        info!(target: "stage", stage = name, workers = entry.workers, "stage started");
        Ok(())
    }

    /// Start every idle stage.
    pub fn start_all(&self) -> Result<(), RegistryError> {
        let idle: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.state == StageState::Idle)
            .map(|(n, _)| n.clone())
            .collect();
        for name in idle {
            self.start(&name)?;
        }
        Ok(())
    }

    /// Running -> Stopped. In-flight envelopes finish; queued ones are released.
    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let running = {
            let mut entries = self.lock();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
            entry.state = StageState::Stopped;
            entry.running.take()
        };
        let Some(running) = running else {
            return Ok(());
        };

        self.broker.unsubscribe(name);
        let _ = running.stop.send(true);
        for h in running.handles {
            if let Err(e) = h.await {
                warn!(target: "stage", stage = name, error = %e, "worker ended abnormally");
            }
        }

        let mut rx = running.rx.lock().await;
        rx.close();
        let mut released = 0usize;
        while let Ok(env) = rx.try_recv() {
            self.broker.done(&env);
            released += 1;
        }
        info!(target: "stage", stage = name, released, "stage stopped");
        Ok(())
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(target: "stage", stage = %name, error = %e, "stop failed");
            }
        }
    }

    /// Stop and forget a stage (sender targets come and go).
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.stop(name).await?;
        self.lock().remove(name);
        Ok(())
    }

    pub fn statuses(&self) -> Vec<StageStatus> {
        self.lock()
            .iter()
            .map(|(name, e)| StageStatus {
                name: name.clone(),
                state: e.state,
                class: e.stage.class(),
                workers: e.workers,
                queue_depth: self.broker.queue_depth(name).unwrap_or(0),
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

struct Worker {
    stage: Arc<dyn Stage>,
    name: String,
    idx: usize,
    broker: Arc<Broker>,
    routing: RoutingPolicy,
    retry: RetryPolicy,
    rx: SharedReceiver,
    stop: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        debug!(target: "stage", stage = %self.name, worker = self.idx, "worker up");
        loop {
            if *self.stop.borrow() {
                break;
            }
            let next = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    biased;
                    _ = self.stop.changed() => None,
                    env = rx.recv() => env,
                }
            };
            let Some(env) = next else {
                break;
            };
            self.process(env).await;
        }
        debug!(target: "stage", stage = %self.name, worker = self.idx, "worker down");
    }

    async fn process(&self, env: Envelope) {
        let name = self.name.as_str();

        if !self.broker.cycles().is_valid(env.cycle) {
            counter!("stage_cancelled_total", "stage" => self.name.clone()).increment(1);
            debug!(
                target: "stage",
                stage = name,
                correlation_id = %env.correlation_id,
                cycle = %env.cycle,
                "cycle token invalidated; envelope dropped"
            );
            self.broker.done(&env);
            return;
        }

        debug!(
            target: "stage",
            stage = name,
            topic = %env.topic,
            correlation_id = %env.correlation_id,
            attempt = env.attempt,
            "handling envelope"
        );

        let stage = Arc::clone(&self.stage);
        let input = env.clone();
        let joined = tokio::spawn(async move { stage.handle(&input).await }).await;

        match joined {
            Ok(Ok(outputs)) => {
                counter!("stage_processed_total", "stage" => self.name.clone()).increment(1);
                self.emit(&env, outputs).await;
            }
            Ok(Err(err)) => match self.retry.decide(env.attempt, &err) {
                Verdict::Retry { delay } => {
                    self.schedule_retry(env, delay, err);
                    return;
                }
                Verdict::DeadLetter => {
                    let reason = if err.is_transient() {
                        DeadLetterReason::Exhausted
                    } else {
                        DeadLetterReason::Permanent
                    };
                    self.broker
                        .dead_letters()
                        .record(name, &env, reason, err.to_string());
                }
            },
            Err(join) => {
                self.broker.dead_letters().record(
                    name,
                    &env,
                    DeadLetterReason::Panicked,
                    format!("handler panicked: {join}"),
                );
            }
        }
        self.broker.done(&env);
    }

    async fn emit(&self, parent: &Envelope, outputs: Vec<Artifact>) {
        for artifact in outputs {
            for topic in self.routing.route(&artifact) {
                let child = parent.derive(topic, artifact.clone());
                let report = self.broker.publish(child).await;
                if !report.failed.is_empty() {
                    warn!(
                        target: "stage",
                        stage = %self.name,
                        correlation_id = %parent.correlation_id,
                        failed = report.failed.len(),
                        "some subscribers did not accept the output"
                    );
                }
            }
        }
    }

    /// Keeps the envelope counted as in flight until it is back on the queue.
    fn schedule_retry(&self, env: Envelope, delay: Duration, err: StageError) {
        counter!("stage_retries_total", "stage" => self.name.clone()).increment(1);
        warn!(
            target: "stage",
            stage = %self.name,
            correlation_id = %env.correlation_id,
            attempt = env.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure; retry scheduled"
        );

        let broker = Arc::clone(&self.broker);
        let subscriber = self.name.clone();
        let next = env.next_attempt(self.retry.max_attempts);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = broker.requeue(&subscriber, next).await {
                warn!(target: "stage", stage = %subscriber, error = %e, "retry not requeued");
            }
            broker.done(&env);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, OverflowPolicy};
    use crate::cycle::CycleTracker;
    use crate::dead_letter::DeadLetterLog;
    use crate::model::CollectRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Panicky;

    #[async_trait]
    impl Stage for Panicky {
        fn name(&self) -> &str {
            "collector"
        }
        fn topics(&self) -> Vec<Topic> {
            vec![Topic::collect()]
        }
        async fn handle(&self, _env: &Envelope) -> Result<Vec<Artifact>, StageError> {
            panic!("boom");
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Counting {
        fn name(&self) -> &str {
            "collector"
        }
        fn topics(&self) -> Vec<Topic> {
            vec![Topic::collect()]
        }
        async fn handle(&self, _env: &Envelope) -> Result<Vec<Artifact>, StageError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    fn registry() -> StageRegistry {
        let broker = Arc::new(Broker::new(
            BrokerConfig {
                queue_capacity: 8,
                overflow: OverflowPolicy::Block,
                block_timeout: Duration::from_millis(100),
            },
            Arc::new(DeadLetterLog::with_capacity(16)),
            Arc::new(CycleTracker::new()),
        ));
        StageRegistry::new(
            broker,
            RoutingPolicy::new("ko"),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        )
    }

    async fn trigger(reg: &StageRegistry) {
        let cycles = reg.broker().cycles();
        let token = cycles.begin(true).token();
        let env = Envelope::trigger(
            token,
            CollectRequest {
                requested_at: chrono::Utc::now(),
                forced: true,
            },
        );
        reg.broker().publish(env).await;
        cycles.completed(token);
    }

    #[tokio::test]
    async fn lifecycle_idle_running_stopped() {
        let reg = registry();
        reg.register(Arc::new(Counting(Arc::default())), 2).unwrap();
        assert_eq!(reg.state("collector"), Some(StageState::Idle));
        reg.start_all().unwrap();
        assert_eq!(reg.state("collector"), Some(StageState::Running));
        reg.stop("collector").await.unwrap();
        assert_eq!(reg.state("collector"), Some(StageState::Stopped));
        assert_eq!(reg.start("collector"), Err(RegistryError::Stopped("collector".into())));
        assert!(!reg.broker().is_subscribed("collector"));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let reg = registry();
        reg.register(Arc::new(Counting(Arc::default())), 1).unwrap();
        assert!(matches!(
            reg.register(Arc::new(Panicky), 1),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn panic_is_isolated_and_dead_lettered() {
        let reg = registry();
        reg.register(Arc::new(Panicky), 1).unwrap();
        reg.start_all().unwrap();
        trigger(&reg).await;
        assert!(reg.broker().cycles().wait_idle(Duration::from_secs(2)).await);
        let dl = reg.broker().dead_letters().query(&Default::default());
        assert_eq!(dl.len(), 1);
        assert_eq!(dl[0].reason, DeadLetterReason::Panicked);
        // worker survived
        assert_eq!(reg.state("collector"), Some(StageState::Running));
        trigger(&reg).await;
        assert!(reg.broker().cycles().wait_idle(Duration::from_secs(2)).await);
        assert_eq!(reg.broker().dead_letters().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_cycle_envelopes_are_dropped_unprocessed() {
        let reg = registry();
        let hits = Arc::new(AtomicUsize::new(0));
        reg.register(Arc::new(Counting(hits.clone())), 1).unwrap();

        let cycles = reg.broker().cycles().clone();
        reg.start("collector").unwrap();
        let token = cycles.begin(false).token();
        cycles.cancel();
        reg.broker()
            .publish(Envelope::trigger(
                token,
                CollectRequest {
                    requested_at: chrono::Utc::now(),
                    forced: false,
                },
            ))
            .await;
        cycles.completed(token);
        assert!(cycles.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(reg.broker().dead_letters().is_empty());
    }
}
