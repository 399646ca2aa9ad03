//! Fingerprint store: bounded, time-windowed set of seen documents.
//!
//! Expiry is checked lazily on insert; when the store is still full after
//! expiring, the oldest fingerprint is evicted.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::ingest::normalize_title;

/// sha256 over normalized title + source, hex encoded.
pub fn fingerprint(title: &str, source: &str) -> String {
    let mut h = Sha256::new();
    h.update(normalize_title(title).as_bytes());
    h.update(b"\x1f");
    h.update(source.trim().to_lowercase().as_bytes());
    h.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashMap<String, DateTime<Utc>>,
    // insertion order for expiry / capacity eviction
    order: VecDeque<(String, DateTime<Utc>)>,
}

impl Inner {
    fn evict_expired(&mut self, cutoff: DateTime<Utc>) {
        while let Some((fp, at)) = self.order.front() {
            if *at > cutoff {
                break;
            }
            // only remove if the map still holds this exact insertion
            if self.seen.get(fp) == Some(at) {
                self.seen.remove(fp);
            }
            self.order.pop_front();
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((fp, at)) = self.order.pop_front() {
            if self.seen.get(&fp) == Some(&at) {
                self.seen.remove(&fp);
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct FingerprintStore {
    inner: Mutex<Inner>,
    ttl: chrono::Duration,
    capacity: usize,
}

impl FingerprintStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            capacity: capacity.max(1),
        }
    }

    /// Record `fp` as seen at `now`. Returns false if it was already seen
    /// within the TTL (the caller treats that as a duplicate).
    pub fn check_and_insert_at(&self, fp: &str, now: DateTime<Utc>) -> bool {
        self.check_and_insert_all_at(&[fp], now)
    }

    /// All-or-nothing over several keys of one document: false (and nothing
    /// recorded) if any key was seen within the TTL.
    pub fn check_and_insert_all_at(&self, keys: &[&str], now: DateTime<Utc>) -> bool {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let cutoff = now - self.ttl;
        g.evict_expired(cutoff);

        if keys
            .iter()
            .any(|k| g.seen.get(*k).is_some_and(|at| *at > cutoff))
        {
            return false;
        }

        for key in keys {
            while g.seen.len() >= self.capacity {
                g.evict_oldest();
            }
            g.seen.insert(key.to_string(), now);
            g.order.push_back((key.to_string(), now));
        }
        true
    }

    pub fn check_and_insert_all(&self, keys: &[&str]) -> bool {
        self.check_and_insert_all_at(keys, Utc::now())
    }

    pub fn check_and_insert(&self, fp: &str) -> bool {
        self.check_and_insert_at(fp, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// fingerprint -> unix seconds
    pub fn snapshot(&self) -> HashMap<String, i64> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.seen
            .iter()
            .map(|(k, v)| (k.clone(), v.timestamp()))
            .collect()
    }

    /// Merge a snapshot, skipping entries already past the TTL.
    pub fn restore(&self, snapshot: HashMap<String, i64>, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut entries: Vec<(String, DateTime<Utc>)> = snapshot
            .into_iter()
            .filter_map(|(fp, ts)| DateTime::<Utc>::from_timestamp(ts, 0).map(|at| (fp, at)))
            .filter(|(_, at)| *at > cutoff)
            .collect();
        entries.sort_by_key(|(_, at)| *at);

        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut restored = 0;
        for (fp, at) in entries {
            while g.seen.len() >= self.capacity {
                g.evict_oldest();
            }
            g.seen.insert(fp.clone(), at);
            g.order.push_back((fp, at));
            restored += 1;
        }
        restored
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot()).context("serializing dedup snapshot")?;
        crate::persist::write_atomic(path, &json)
            .with_context(|| format!("writing dedup snapshot to {}", path.display()))
    }

    /// Missing file is not an error.
    pub fn load_from(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading dedup snapshot from {}", path.display()))?;
        let snap: HashMap<String, i64> =
            serde_json::from_slice(&bytes).context("parsing dedup snapshot")?;
        Ok(self.restore(snap, Utc::now()))
    }
}
