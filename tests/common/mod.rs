// tests/common/mod.rs
//
// Mock collaborators and a pipeline builder shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai_news_alert::error::CollaboratorError;
use ai_news_alert::ingest::types::{RawDocument, SourceFetcher, SourceSpec};
use ai_news_alert::model::CategorizedNews;
use ai_news_alert::notify::{Channel, Deliverer, DeliveryResult, OutboundMessage};
use ai_news_alert::summarize::HeuristicSummarizer;
use ai_news_alert::translate::{TaggingTranslator, Translator};
use ai_news_alert::{Collaborators, NewsPipeline, PipelineConfig};
use async_trait::async_trait;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn doc(title: &str, source: &str, url: &str, language: &str) -> RawDocument {
    RawDocument {
        title: title.to_string(),
        body: format!("{title}. 인공지능 AI 모델 연구 결과가 발표되었습니다. More details follow here."),
        url: url.to_string(),
        source: source.to_string(),
        published_at: None,
        language: language.to_string(),
        country: if language == "ko" { "kr".into() } else { "us".into() },
    }
}

pub fn source(name: &str, language: &str) -> SourceSpec {
    SourceSpec {
        name: name.to_string(),
        url: format!("https://{name}.test/rss"),
        language: language.to_string(),
        country: "xx".to_string(),
    }
}

/// Serves documents per source name; optional delay per fetch.
#[derive(Default)]
pub struct FixtureFetcher {
    docs: Mutex<HashMap<String, Vec<RawDocument>>>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FixtureFetcher {
    pub fn with(mut self, source: &str, docs: Vec<RawDocument>) -> Self {
        self.docs.get_mut().unwrap().insert(source.to_string(), docs);
        self
    }

    pub fn delayed(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    pub fn set(&self, source: &str, docs: Vec<RawDocument>) {
        self.docs.lock().unwrap().insert(source.to_string(), docs);
    }
}

#[async_trait]
impl SourceFetcher for FixtureFetcher {
    async fn fetch(&self, spec: &SourceSpec) -> Result<Vec<RawDocument>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.docs.lock().unwrap().get(&spec.name).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Tagging translator that remembers the languages it was asked to translate from.
#[derive(Default)]
pub struct RecordingTranslator {
    pub from: Mutex<Vec<String>>,
}

#[async_trait]
impl Translator for RecordingTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_locale: &str,
    ) -> Result<String, CollaboratorError> {
        self.from.lock().unwrap().push(source_lang.to_string());
        TaggingTranslator.translate(text, source_lang, target_locale).await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// How a target listed in `RecordingDeliverer::fail` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// 503 from the channel; the sender stage retries.
    Transient,
    /// 400 from the channel; dead-lettered at once.
    Permanent,
}

/// Records every delivery; fails for targets listed in `fail`.
pub struct RecordingDeliverer {
    channel: Channel,
    pub delivered: Mutex<Vec<(String, String)>>,
    pub news: Mutex<Vec<CategorizedNews>>,
    /// target -> (failure, remaining failing calls)
    pub fail: Mutex<HashMap<String, (Failure, usize)>>,
    /// deliver() calls per target, failed ones included
    pub attempts: Mutex<HashMap<String, usize>>,
    /// (target, subject) of messages sent outside the pipeline
    pub direct: Mutex<Vec<(String, String)>>,
    pub tests: AtomicUsize,
}

impl RecordingDeliverer {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            delivered: Mutex::new(Vec::new()),
            news: Mutex::new(Vec::new()),
            fail: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            direct: Mutex::new(Vec::new()),
            tests: AtomicUsize::new(0),
        })
    }

    /// Fail the next `times` deliveries to `target`; `usize::MAX` fails forever.
    pub fn fail_target(&self, target: &str, failure: Failure, times: usize) {
        self.fail.lock().unwrap().insert(target.to_string(), (failure, times));
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn delivered_to(&self, target: &str) -> usize {
        self.delivered.lock().unwrap().iter().filter(|(t, _)| t == target).count()
    }

    pub fn attempts_for(&self, target: &str) -> usize {
        self.attempts.lock().unwrap().get(target).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<DeliveryResult, CollaboratorError> {
        self.tests.fetch_add(1, Ordering::SeqCst);
        self.direct
            .lock()
            .unwrap()
            .push((target.to_string(), message.subject.clone()));
        Ok(DeliveryResult {
            channel: self.channel,
            target: target.to_string(),
            parts: 1,
        })
    }

    async fn deliver(
        &self,
        news: &CategorizedNews,
        target: &str,
    ) -> Result<DeliveryResult, CollaboratorError> {
        *self.attempts.lock().unwrap().entry(target.to_string()).or_default() += 1;
        if let Some((failure, remaining)) = self.fail.lock().unwrap().get_mut(target) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(match failure {
                    Failure::Transient => CollaboratorError::Unavailable(format!("503 for {target}")),
                    Failure::Permanent => CollaboratorError::Rejected(format!("400 for {target}")),
                });
            }
        }

        self.delivered
            .lock()
            .unwrap()
            .push((target.to_string(), news.item().id().to_string()));
        self.news.lock().unwrap().push(news.clone());
        Ok(DeliveryResult {
            channel: self.channel,
            target: target.to_string(),
            parts: 1,
        })
    }
}

pub fn fast_config(sources: Vec<SourceSpec>) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.sources = sources;
    cfg.scheduler.interval_secs = 0;
    cfg.retry.base_delay_ms = 1;
    cfg.retry.max_delay_ms = 5;
    cfg.broker.block_timeout_ms = 500;
    cfg
}

pub struct Harness {
    pub pipeline: Arc<NewsPipeline>,
    pub fetcher: Arc<FixtureFetcher>,
    pub translator: Arc<RecordingTranslator>,
    pub telegram: Arc<RecordingDeliverer>,
    pub email: Arc<RecordingDeliverer>,
}

pub fn launch(cfg: PipelineConfig, fetcher: FixtureFetcher) -> Harness {
    let fetcher = Arc::new(fetcher);
    let translator = Arc::new(RecordingTranslator::default());
    let telegram = RecordingDeliverer::new(Channel::Telegram);
    let email = RecordingDeliverer::new(Channel::Email);

    let mut deliverers: HashMap<Channel, Arc<dyn Deliverer>> = HashMap::new();
    deliverers.insert(Channel::Telegram, telegram.clone());
    deliverers.insert(Channel::Email, email.clone());

    let pipeline = NewsPipeline::launch(
        cfg,
        Collaborators {
            fetcher: fetcher.clone(),
            translator: translator.clone(),
            summarizer: Arc::new(HeuristicSummarizer::default()),
            deliverers,
        },
    )
    .expect("launch pipeline");

    Harness {
        pipeline: Arc::new(pipeline),
        fetcher,
        translator,
        telegram,
        email,
    }
}

/// Force one cycle and wait until nothing is in flight.
pub async fn run_cycle(p: &NewsPipeline) {
    p.start_collection(true).await.expect("trigger");
    assert!(p.wait_idle(WAIT).await, "cycle did not settle");
}
