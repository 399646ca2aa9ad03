// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod error;
pub mod model;
pub mod envelope;
pub mod persist;

// Broker core: queues, stages, routing, retries, cycles
pub mod broker;
pub mod cycle;
pub mod dead_letter;
pub mod retry;
pub mod routing;
pub mod stage;
pub mod stages;

// Scoring, categorization, dedup
pub mod analyze;
pub mod dedup;

// External collaborators
pub mod ingest;
pub mod notify;
pub mod summarize;
pub mod translate;

// Host-facing surface
pub mod api;
pub mod config;
pub mod history;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod subscribers;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::PipelineConfig;
pub use crate::pipeline::{Collaborators, NewsPipeline};
