//! Configuration loading.

pub mod pipeline;

pub use pipeline::PipelineConfig;
