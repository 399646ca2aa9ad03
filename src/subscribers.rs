//! Delivery target directory, optionally persisted as JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use tracing::warn;

use crate::notify::Channel;
use crate::persist::write_atomic;

type Targets = BTreeMap<Channel, BTreeSet<String>>;

#[derive(Debug, Default)]
pub struct SubscriberDirectory {
    targets: RwLock<Targets>,
    path: Option<PathBuf>,
}

impl SubscriberDirectory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path` if it exists; later changes are written back there.
    pub fn open(path: &Path) -> Result<Self> {
        let targets = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading subscribers from {}", path.display()))?;
            serde_json::from_str::<Targets>(&raw)
                .with_context(|| format!("parsing subscribers in {}", path.display()))?
        } else {
            Targets::new()
        };
        Ok(Self {
            targets: RwLock::new(targets),
            path: Some(path.to_path_buf()),
        })
    }

    /// Returns false if the target was already subscribed.
    pub fn add(&self, channel: Channel, target: &str) -> bool {
        let target = target.trim();
        if target.is_empty() {
            return false;
        }
        let added = self
            .write()
            .entry(channel)
            .or_default()
            .insert(target.to_string());
        if added {
            self.persist();
        }
        added
    }

    pub fn remove(&self, channel: Channel, target: &str) -> bool {
        let removed = {
            let mut t = self.write();
            let removed = t
                .get_mut(&channel)
                .is_some_and(|set| set.remove(target.trim()));
            if t.get(&channel).is_some_and(BTreeSet::is_empty) {
                t.remove(&channel);
            }
            removed
        };
        if removed {
            self.persist();
        }
        removed
    }

    pub fn targets(&self, channel: Channel) -> Vec<String> {
        self.read()
            .get(&channel)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (channel, target) pair.
    pub fn all(&self) -> Vec<(Channel, String)> {
        self.read()
            .iter()
            .flat_map(|(c, set)| set.iter().map(move |t| (*c, t.clone())))
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<Channel, usize> {
        self.read().iter().map(|(c, s)| (*c, s.len())).collect()
    }

    /// Write the current list if a path is configured.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&*self.read()).context("serializing subscribers")?;
        write_atomic(path, &json)
            .with_context(|| format!("writing subscribers to {}", path.display()))
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(target: "subscribers", error = %e, "subscriber list not persisted");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Targets> {
        self.targets.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Targets> {
        self.targets.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_remove_reports() {
        let d = SubscriberDirectory::in_memory();
        assert!(d.add(Channel::Telegram, "123"));
        assert!(!d.add(Channel::Telegram, " 123 "));
        assert!(d.add(Channel::Email, "a@b.test"));
        assert_eq!(d.all().len(), 2);
        assert!(d.remove(Channel::Telegram, "123"));
        assert!(!d.remove(Channel::Telegram, "123"));
        assert!(d.targets(Channel::Telegram).is_empty());
    }

    #[test]
    fn persisted_list_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        {
            let d = SubscriberDirectory::open(&path).unwrap();
            d.add(Channel::Telegram, "1");
            d.add(Channel::Telegram, "2");
            d.add(Channel::Email, "x@y.test");
        }
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"telegram\""));

        let d = SubscriberDirectory::open(&path).unwrap();
        assert_eq!(d.targets(Channel::Telegram), vec!["1", "2"]);
        assert_eq!(d.counts()[&Channel::Email], 1);
    }
}
