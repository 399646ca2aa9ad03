// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyze::{Category, CategoryCatalog, TrendWeights};
use crate::broker::{BrokerConfig, OverflowPolicy};
use crate::ingest::types::SourceSpec;
use crate::model::SummaryLimits;
use crate::retry::RetryPolicy;

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub block_timeout_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            overflow: OverflowPolicy::Block,
            block_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DedupSection {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            capacity: 10_000,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// 0 disables the timer; collection then runs on command only.
    pub interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub collector: usize,
    pub translator: usize,
    pub analyzer: usize,
    pub categorizer: usize,
    /// Per delivery target.
    pub sender: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            collector: 1,
            translator: 1,
            analyzer: 1,
            categorizer: 1,
            sender: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// "simple" | "openai" | "gemini"; ANALYSIS_MODEL wins when set.
    pub model: String,
    pub max_summary_lines: usize,
    pub max_summary_chars: usize,
    pub max_key_points: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            model: "simple".to_string(),
            max_summary_lines: 10,
            max_summary_chars: 2_000,
            max_key_points: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollectorSection {
    /// AI-relevance pre-filter; empty accepts everything.
    pub keywords: Vec<String>,
    pub max_items_per_source: usize,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            max_items_per_source: 10,
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "AI",
        "인공지능",
        "머신러닝",
        "딥러닝",
        "machine learning",
        "deep learning",
        "GPT",
        "LLM",
        "ChatGPT",
        "OpenAI",
        "neural network",
        "신경망",
        "생성형",
        "generative",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sources() -> Vec<SourceSpec> {
    let src = |name: &str, url: &str, language: &str, country: &str| SourceSpec {
        name: name.to_string(),
        url: url.to_string(),
        language: language.to_string(),
        country: country.to_string(),
    };
    vec![
        src("ZDNet Korea", "https://zdnet.co.kr/rss/all.xml", "ko", "kr"),
        src("AI타임스", "https://www.aitimes.com/rss/allArticle.xml", "ko", "kr"),
        src("TechCrunch", "https://techcrunch.com/feed/", "en", "us"),
        src("MIT Technology Review", "https://www.technologyreview.com/feed/", "en", "us"),
        src("The Verge", "https://www.theverge.com/rss/index.xml", "en", "us"),
    ]
}

/// Whole pipeline configuration. Every section is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub domestic_locale: String,
    pub broker: BrokerSection,
    pub retry: RetrySection,
    pub dedup: DedupSection,
    pub scheduler: SchedulerSection,
    pub workers: WorkerSection,
    pub analysis: AnalysisSection,
    pub scoring: TrendWeights,
    pub categories: Vec<Category>,
    pub sources: Vec<SourceSpec>,
    pub collector: CollectorSection,
    pub subscribers_path: Option<PathBuf>,
    pub history_capacity: usize,
    pub dead_letter_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            domestic_locale: "ko".to_string(),
            broker: BrokerSection::default(),
            retry: RetrySection::default(),
            dedup: DedupSection::default(),
            scheduler: SchedulerSection::default(),
            workers: WorkerSection::default(),
            analysis: AnalysisSection::default(),
            scoring: TrendWeights::default(),
            categories: Vec::new(),
            sources: default_sources(),
            collector: CollectorSection::default(),
            subscribers_path: None,
            history_capacity: 500,
            dead_letter_capacity: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_PATH);
            if pb.exists() {
                Self::load_from(&pb)?
            } else {
                Self::default()
            }
        };
        if let Ok(model) = std::env::var("ANALYSIS_MODEL") {
            if !model.trim().is_empty() {
                cfg.analysis.model = model.trim().to_ascii_lowercase();
            }
        }
        Ok(cfg)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Clamp into usable ranges. Applied by every loader.
    pub fn sanitized(mut self) -> Self {
        let locale = self.domestic_locale.trim().to_ascii_lowercase();
        self.domestic_locale = if locale.is_empty() { "ko".to_string() } else { locale };

        self.broker.queue_capacity = self.broker.queue_capacity.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }

        let w = &mut self.workers;
        for n in [
            &mut w.collector,
            &mut w.translator,
            &mut w.analyzer,
            &mut w.categorizer,
            &mut w.sender,
        ] {
            *n = (*n).max(1);
        }

        self.analysis.model = self.analysis.model.trim().to_ascii_lowercase();
        self.analysis.max_summary_lines = self.analysis.max_summary_lines.max(1);
        self.analysis.max_summary_chars = self.analysis.max_summary_chars.max(1);
        self.scoring = self.scoring.sanitized();
        self.collector.max_items_per_source = self.collector.max_items_per_source.max(1);
        self.history_capacity = self.history_capacity.clamp(1, 10_000);
        self.dead_letter_capacity = self.dead_letter_capacity.max(1);
        self
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            queue_capacity: self.broker.queue_capacity,
            overflow: self.broker.overflow,
            block_timeout: Duration::from_millis(self.broker.block_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn summary_limits(&self) -> SummaryLimits {
        SummaryLimits {
            max_lines: self.analysis.max_summary_lines,
            max_chars: self.analysis.max_summary_chars,
            max_key_points: self.analysis.max_key_points,
        }
    }

    pub fn trend_weights(&self) -> TrendWeights {
        self.scoring
    }

    /// Configured categories, or the built-in catalog when none are listed.
    pub fn catalog(&self) -> CategoryCatalog {
        CategoryCatalog::new(self.categories.clone())
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup.ttl_secs)
    }

    pub fn scheduler_interval(&self) -> Option<Duration> {
        match self.scheduler.interval_secs {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }
}
