//! Host-facing control surface.
//!
//! `NewsPipeline` wires the broker, the stage registry and the shared stores
//! together, registers one stage per pipeline step plus one sender stage per
//! delivery target, and exposes the operations the HTTP layer and the
//! binaries call.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::config::PipelineConfig;
use crate::cycle::{CycleTracker, TriggerOutcome};
use crate::dead_letter::{DeadLetterLog, DeadLetterQuery, DeadLetterView};
use crate::dedup::FingerprintStore;
use crate::envelope::{CycleToken, Envelope};
use crate::error::{CollaboratorError, ControlError, RegistryError};
use crate::history::{History, HistoryEntry, HistoryFilter};
use crate::ingest::providers::rss::RssFetcher;
use crate::ingest::types::SourceFetcher;
use crate::model::{CollectRequest, TrendLevel};
use crate::notify::email::EmailDeliverer;
use crate::notify::telegram::TelegramDeliverer;
use crate::notify::{format, Channel, Deliverer, OutboundMessage};
use crate::routing::RoutingPolicy;
use crate::stage::{StageRegistry, StageStatus};
use crate::stages::collector::ToggleState;
use crate::stages::{
    AnalyzerStage, CategorizerStage, CollectorStage, SenderStage, SourceToggles, TranslatorStage,
};
use crate::subscribers::SubscriberDirectory;
use crate::summarize::{GeminiSummarizer, HeuristicSummarizer, OpenAiSummarizer, Summarizer};
use crate::translate::{self, TaggingTranslator, Translator};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// External collaborators the stages call into.
pub struct Collaborators {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub translator: Arc<dyn Translator>,
    pub summarizer: Arc<dyn Summarizer>,
    pub deliverers: HashMap<Channel, Arc<dyn Deliverer>>,
}

impl Collaborators {
    /// Real adapters, configured from the environment. Channels whose
    /// credentials are missing are left out.
    pub fn from_env(cfg: &PipelineConfig) -> Result<Self> {
        let fetcher = RssFetcher::http(FETCH_TIMEOUT)
            .context("building RSS client")?
            .with_max_items(cfg.collector.max_items_per_source);

        let translator: Arc<dyn Translator> = match translate::from_env() {
            Ok(t) => Arc::from(t),
            Err(e) => {
                warn!(target: "translator", error = %e, "falling back to offline tagging translator");
                Arc::new(TaggingTranslator)
            }
        };

        let heuristic = HeuristicSummarizer::new(
            cfg.analysis.max_summary_lines,
            cfg.analysis.max_key_points,
        );
        let summarizer: Arc<dyn Summarizer> = match cfg.analysis.model.as_str() {
            "openai" => match OpenAiSummarizer::from_env(heuristic.clone()) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    warn!(target: "summarize", error = %e, "OpenAI unavailable; using simple model");
                    Arc::new(heuristic)
                }
            },
            "gemini" => match GeminiSummarizer::from_env(heuristic.clone()) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    warn!(target: "summarize", error = %e, "Gemini unavailable; using simple model");
                    Arc::new(heuristic)
                }
            },
            _ => Arc::new(heuristic),
        };

        let mut deliverers: HashMap<Channel, Arc<dyn Deliverer>> = HashMap::new();
        register_channel(&mut deliverers, Channel::Telegram, TelegramDeliverer::from_env());
        register_channel(&mut deliverers, Channel::Email, EmailDeliverer::from_env());

        Ok(Self {
            fetcher: Arc::new(fetcher),
            translator,
            summarizer,
            deliverers,
        })
    }
}

fn register_channel<D: Deliverer + 'static>(
    map: &mut HashMap<Channel, Arc<dyn Deliverer>>,
    channel: Channel,
    built: Result<D, CollaboratorError>,
) {
    match built {
        Ok(d) => {
            map.insert(channel, Arc::new(d));
        }
        Err(e) => info!(target: "notify", %channel, error = %e, "channel disabled"),
    }
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub stages: Vec<StageStatus>,
    /// Entries currently retained in the dead-letter log.
    pub dead_letters: usize,
    pub dead_letters_total: u64,
    pub subscribers: BTreeMap<Channel, usize>,
    pub cycle: Option<CycleToken>,
    pub in_flight: usize,
    pub sources: ToggleState,
    pub dedup_entries: usize,
    pub history_entries: usize,
}

/// Result of `subscribe` / `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionChange {
    pub channel: Channel,
    pub target: String,
    /// False when the request was a no-op.
    pub changed: bool,
}

/// One target's outcome for `send_test` / `send_digest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectDelivery {
    pub target: String,
    pub ok: bool,
    pub parts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct NewsPipeline {
    config: PipelineConfig,
    registry: StageRegistry,
    broker: Arc<Broker>,
    cycles: Arc<CycleTracker>,
    dead_letters: Arc<DeadLetterLog>,
    dedup: Arc<FingerprintStore>,
    subscribers: Arc<SubscriberDirectory>,
    history: Arc<History>,
    toggles: Arc<SourceToggles>,
    catalog: Arc<crate::analyze::CategoryCatalog>,
    deliverers: HashMap<Channel, Arc<dyn Deliverer>>,
    closed: AtomicBool,
}

impl NewsPipeline {
    /// Build every component, reload persisted state and start all stages.
    /// Must run inside a Tokio runtime.
    pub fn launch(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        let config = config.sanitized();
        let routing = RoutingPolicy::new(&config.domestic_locale);

        let dead_letters = Arc::new(DeadLetterLog::with_capacity(config.dead_letter_capacity));
        let cycles = Arc::new(CycleTracker::new());
        let broker = Arc::new(Broker::new(
            config.broker_config(),
            Arc::clone(&dead_letters),
            Arc::clone(&cycles),
        ));
        let registry = StageRegistry::new(Arc::clone(&broker), routing.clone(), config.retry_policy());

        let dedup = Arc::new(FingerprintStore::new(config.dedup_ttl(), config.dedup.capacity));
        if let Some(path) = &config.dedup.snapshot_path {
            match dedup.load_from(path) {
                Ok(n) => info!(target: "collector", restored = n, "dedup snapshot loaded"),
                Err(e) => warn!(target: "collector", error = %e, "dedup snapshot ignored"),
            }
        }

        let subscribers = Arc::new(match &config.subscribers_path {
            Some(path) => SubscriberDirectory::open(path)?,
            None => SubscriberDirectory::in_memory(),
        });

        let history = Arc::new(History::with_capacity(config.history_capacity));
        let toggles = Arc::new(SourceToggles::default());
        let catalog = Arc::new(config.catalog());

        let w = &config.workers;
        registry.register(
            Arc::new(CollectorStage::new(
                collaborators.fetcher,
                config.sources.clone(),
                config.collector.keywords.clone(),
                Arc::clone(&dedup),
                Arc::clone(&toggles),
                routing.clone(),
            )),
            w.collector,
        )?;
        registry.register(
            Arc::new(TranslatorStage::new(collaborators.translator, &config.domestic_locale)),
            w.translator,
        )?;
        registry.register(
            Arc::new(AnalyzerStage::new(collaborators.summarizer, config.summary_limits())),
            w.analyzer,
        )?;
        registry.register(
            Arc::new(CategorizerStage::new(
                Arc::clone(&catalog),
                config.trend_weights(),
                Arc::clone(&history),
            )),
            w.categorizer,
        )?;

        let pipeline = Self {
            registry,
            broker,
            cycles,
            dead_letters,
            dedup,
            subscribers,
            history,
            toggles,
            catalog,
            deliverers: collaborators.deliverers,
            closed: AtomicBool::new(false),
            config,
        };

        for (channel, target) in pipeline.subscribers.all() {
            if let Err(e) = pipeline.register_sender(channel, &target) {
                warn!(target: "subscribers", %channel, error = %e, "stored subscriber not activated");
            }
        }
        pipeline.registry.start_all()?;

        info!(
            target: "stage",
            domestic = %pipeline.config.domestic_locale,
            sources = pipeline.config.sources.len(),
            channels = pipeline.deliverers.len(),
            "pipeline running"
        );
        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    /// Open a cycle and publish its trigger, unless one is still in flight
    /// and `force` is false.
    pub async fn start_collection(&self, force: bool) -> Result<TriggerOutcome, ControlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ControlError::ShuttingDown);
        }
        let outcome = self.cycles.begin(force);
        if let TriggerOutcome::Started(token) = outcome {
            let trigger = Envelope::trigger(
                token,
                CollectRequest {
                    requested_at: Utc::now(),
                    forced: force,
                },
            );
            self.broker.publish(trigger).await;
            // release the reservation taken by `begin`
            self.cycles.completed(token);
        }
        Ok(outcome)
    }

    pub fn cancel_cycle(&self) -> Option<CycleToken> {
        self.cycles.cancel()
    }

    /// Newest categorized items first. `category` matches a category id or
    /// its display name.
    pub fn get_summary(
        &self,
        limit: usize,
        category: Option<&str>,
        trend: Option<TrendLevel>,
    ) -> Vec<HistoryEntry> {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| self.category_name(c));
        self.history.query(limit, &HistoryFilter { category, trend })
    }

    fn category_name(&self, key: &str) -> String {
        self.catalog
            .categories()
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(key))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    pub async fn subscribe(
        &self,
        channel: Channel,
        target: &str,
    ) -> Result<SubscriptionChange, ControlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ControlError::ShuttingDown);
        }
        let target = target.trim();
        if target.is_empty() {
            return Err(ControlError::EmptyTarget);
        }
        if !self.deliverers.contains_key(&channel) {
            return Err(ControlError::ChannelUnavailable(channel.to_string()));
        }

        let changed = self.subscribers.add(channel, target);
        self.register_sender(channel, target)?;
        self.registry.start(&SenderStage::stage_name(channel, target))?;
        info!(target: "subscribers", %channel, changed, "subscribed");
        Ok(SubscriptionChange {
            channel,
            target: target.to_string(),
            changed,
        })
    }

    pub async fn unsubscribe(
        &self,
        channel: Channel,
        target: &str,
    ) -> Result<SubscriptionChange, ControlError> {
        let target = target.trim();
        let changed = self.subscribers.remove(channel, target);
        let name = SenderStage::stage_name(channel, target);
        if self.registry.contains(&name) {
            self.registry.remove(&name).await?;
        }
        info!(target: "subscribers", %channel, changed, "unsubscribed");
        Ok(SubscriptionChange {
            channel,
            target: target.to_string(),
            changed,
        })
    }

    /// Registers the sender stage for a target; an existing one is kept.
    fn register_sender(&self, channel: Channel, target: &str) -> Result<(), ControlError> {
        let deliverer = self
            .deliverers
            .get(&channel)
            .cloned()
            .ok_or_else(|| ControlError::ChannelUnavailable(channel.to_string()))?;
        let stage = SenderStage::new(channel, target, deliverer);
        match self.registry.register(Arc::new(stage), self.config.workers.sender) {
            Ok(()) | Err(RegistryError::Duplicate(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_status(&self) -> PipelineStatus {
        PipelineStatus {
            stages: self.registry.statuses(),
            dead_letters: self.dead_letters.len(),
            dead_letters_total: self.dead_letters.total(),
            subscribers: self.subscribers.counts(),
            cycle: self.cycles.current(),
            in_flight: self.cycles.in_flight(),
            sources: self.toggles.get(),
            dedup_entries: self.dedup.len(),
            history_entries: self.history.len(),
        }
    }

    /// Send the fixed test message straight to every target of `channel`.
    pub async fn send_test(&self, channel: Channel) -> Result<Vec<DirectDelivery>, ControlError> {
        self.send_direct(channel, &format::test_message(), "test message")
            .await
    }

    /// One digest of the `limit` newest categorized items, most important
    /// first, sent straight to every target of `channel`. Nothing is sent
    /// while the history is empty.
    pub async fn send_digest(
        &self,
        channel: Channel,
        limit: usize,
    ) -> Result<Vec<DirectDelivery>, ControlError> {
        if !self.deliverers.contains_key(&channel) {
            return Err(ControlError::ChannelUnavailable(channel.to_string()));
        }
        let entries = self.history.query(limit, &HistoryFilter::default());
        if entries.is_empty() {
            info!(target: "notify", %channel, "no news for digest");
            return Ok(Vec::new());
        }
        let message = format::render_digest(&entries, Utc::now());
        info!(target: "notify", %channel, items = entries.len(), "sending digest");
        self.send_direct(channel, &message, "digest").await
    }

    async fn send_direct(
        &self,
        channel: Channel,
        message: &OutboundMessage,
        what: &'static str,
    ) -> Result<Vec<DirectDelivery>, ControlError> {
        let deliverer = self
            .deliverers
            .get(&channel)
            .ok_or_else(|| ControlError::ChannelUnavailable(channel.to_string()))?;

        let mut out = Vec::new();
        for target in self.subscribers.targets(channel) {
            let res = deliverer.send(&target, message).await;
            if let Err(e) = &res {
                warn!(target: "notify", %channel, error = %e, "{what} failed");
            }
            out.push(match res {
                Ok(r) => DirectDelivery {
                    target,
                    ok: true,
                    parts: r.parts,
                    error: None,
                },
                Err(e) => DirectDelivery {
                    target,
                    ok: false,
                    parts: 0,
                    error: Some(e.to_string()),
                },
            });
        }
        Ok(out)
    }

    pub fn configure_sources(&self, domestic: Option<bool>, international: Option<bool>) -> ToggleState {
        let state = self.toggles.set(domestic, international);
        info!(
            target: "collector",
            domestic = state.domestic,
            international = state.international,
            "source toggles updated"
        );
        state
    }

    pub fn dead_letters(&self, query: &DeadLetterQuery) -> Vec<DeadLetterView> {
        self.dead_letters.query(query).iter().map(DeadLetterView::from).collect()
    }

    /// True once nothing is in flight; false if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.cycles.wait_idle(timeout).await
    }

    /// Stop every stage and persist the dedup snapshot and subscriber list.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.registry.stop_all().await;
        if let Some(path) = &self.config.dedup.snapshot_path {
            self.dedup.save_to(path)?;
        }
        self.subscribers.save()?;
        info!(target: "stage", "pipeline stopped");
        Ok(())
    }
}
