//! Bounded in-memory log of categorized news, newest last.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CategorizedNews, TrendLevel};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub language: String,
    pub translated: bool,
    pub category: String,
    pub tags: Vec<String>,
    pub trend: TrendLevel,
    pub summary: String,
    pub key_points: Vec<String>,
    pub importance: f32,
    pub ai_relevance: f32,
}

impl HistoryEntry {
    fn from_news(n: &CategorizedNews) -> Self {
        let a = n.analyzed();
        Self {
            recorded_at: Utc::now(),
            id: n.item().id().to_string(),
            title: a.title().to_string(),
            url: n.item().url().to_string(),
            source: n.item().source().to_string(),
            language: n.item().language().to_string(),
            translated: a.source().is_translated(),
            category: n.category().to_string(),
            tags: n.tags().to_vec(),
            trend: n.trend(),
            summary: a.summary().to_string(),
            key_points: a.key_points().to_vec(),
            importance: a.importance(),
            ai_relevance: a.ai_relevance(),
        }
    }
}

/// Filter for `History::query`.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub category: Option<String>,
    pub trend: Option<TrendLevel>,
}

#[derive(Debug)]
pub struct History {
    inner: Mutex<Vec<HistoryEntry>>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, news: &CategorizedNews) {
        let entry = HistoryEntry::from_news(news);
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `limit` newest entries matching `filter`, newest first.
    /// The category filter compares display names case-insensitively.
    pub fn query(&self, limit: usize, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.iter()
            .rev()
            .filter(|e| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| e.category.to_lowercase() == c.trim().to_lowercase())
            })
            .filter(|e| filter.trend.is_none_or(|t| e.trend == t))
            .take(limit)
            .cloned()
            .collect()
    }
}
