// src/analyze/mod.rs
//! Pure analysis logic: keyword heuristics, categorization and trend scoring.

pub mod category;
pub mod heuristics;
pub mod scoring;

pub use category::{Category, CategoryCatalog, Classification};
pub use scoring::{combined_score, trend_level, TrendWeights};
