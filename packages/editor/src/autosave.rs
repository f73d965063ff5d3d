//! # Autosave Orchestrator
//!
//! Coalesces rapid local edits into infrequent saves, one single-flight slot
//! per entity. The orchestrator never sleeps or spawns; callers feed it the
//! current instant and act on the save requests it hands out.
//!
//! ```text
//! Clean ──edit──► Dirty ──debounce/ceiling──► Saving ──ok──► Clean
//!                   ▲                            │
//!                   └────────failure─────────────┘   (values kept, retry later)
//! ```
//!
//! - The debounce window restarts on every edit.
//! - The ceiling forces a save once an entity has been dirty for
//!   `max_interval`, even under continuous typing.
//! - An edit arriving while `Saving` is queued: the newest values are kept
//!   and a new cycle starts once the in-flight save settles.
//! - A failed save returns the entity to `Dirty` with its newest values intact.
//! - Revisions only grow per entity, across pruning. A save the server
//!   rejects as stale lifts the counter past the server's revision and goes
//!   out again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub debounce: Duration,
    pub max_interval: Duration,
    pub retry_backoff: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            max_interval: Duration::from_secs(20),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Clean,
    Dirty,
    Saving,
}

/// Aggregate indicator for the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "indicator", rename_all = "snake_case")]
pub enum SaveIndicator {
    Saved,
    Unsaved,
    Saving,
    Failed { message: String },
}

/// One save to perform
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest<K, V> {
    pub key: K,
    /// Local edit counter; pass back to `save_succeeded`/`save_failed`
    pub revision: u64,
    pub values: V,
}

#[derive(Debug, Clone)]
struct Slot<V> {
    status: SaveStatus,
    latest: V,
    latest_revision: u64,
    saved_revision: u64,
    in_flight: Option<u64>,
    last_edit: Instant,
    /// First edit not yet covered by a successful save
    dirty_since: Option<Instant>,
    /// First edit made while a save was in flight
    queued_since: Option<Instant>,
    retry_at: Option<Instant>,
    last_error: Option<String>,
    failures: u32,
}

impl<V> Slot<V> {
    fn due_at(&self, config: &AutosaveConfig) -> Option<Instant> {
        if self.status != SaveStatus::Dirty || self.in_flight.is_some() {
            return None;
        }
        let debounced = self.last_edit + config.debounce;
        let at = match self.dirty_since {
            Some(since) => debounced.min(since + config.max_interval),
            None => debounced,
        };
        Some(match self.retry_at {
            Some(retry) => at.max(retry),
            None => at,
        })
    }
}

/// Per-entity autosave state machines keyed by `K`
#[derive(Debug, Clone)]
pub struct Autosave<K: Ord + Clone, V: Clone> {
    config: AutosaveConfig,
    slots: BTreeMap<K, Slot<V>>,
    /// Last revision handed out for entities whose slot was pruned
    issued: BTreeMap<K, u64>,
}

impl<K: Ord + Clone + fmt::Debug, V: Clone> Autosave<K, V> {
    pub fn new(config: AutosaveConfig) -> Self {
        Self {
            config,
            slots: BTreeMap::new(),
            issued: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.config
    }

    /// Record a local edit carrying the entity's complete newest values
    pub fn edit(&mut self, key: K, values: V, now: Instant) {
        match self.slots.get_mut(&key) {
            Some(slot) => {
                slot.latest = values;
                slot.latest_revision += 1;
                slot.last_edit = now;
                slot.retry_at = None;
                match slot.status {
                    SaveStatus::Clean => {
                        slot.status = SaveStatus::Dirty;
                        slot.dirty_since = Some(now);
                    }
                    SaveStatus::Dirty => {
                        slot.dirty_since.get_or_insert(now);
                    }
                    SaveStatus::Saving => {
                        slot.queued_since.get_or_insert(now);
                    }
                }
            }
            None => {
                let floor = self.issued.remove(&key).unwrap_or(0);
                self.slots.insert(
                    key,
                    Slot {
                        status: SaveStatus::Dirty,
                        latest: values,
                        latest_revision: floor + 1,
                        saved_revision: floor,
                        in_flight: None,
                        last_edit: now,
                        dirty_since: Some(now),
                        queued_since: None,
                        retry_at: None,
                        last_error: None,
                        failures: 0,
                    },
                );
            }
        }
    }

    /// Hand out every save that is due at `now`, marking those entities `Saving`
    pub fn poll(&mut self, now: Instant) -> Vec<SaveRequest<K, V>> {
        let config = self.config;
        self.slots
            .iter_mut()
            .filter(|(_, slot)| slot.due_at(&config).map_or(false, |at| at <= now))
            .map(|(key, slot)| start_save(key, slot))
            .collect()
    }

    /// Start saves for every dirty entity immediately (e.g. on exit)
    pub fn flush(&mut self) -> Vec<SaveRequest<K, V>> {
        self.slots
            .iter_mut()
            .filter(|(_, slot)| slot.status == SaveStatus::Dirty && slot.in_flight.is_none())
            .map(|(key, slot)| start_save(key, slot))
            .collect()
    }

    /// Settle a save that reached storage; returns the resulting status
    pub fn save_succeeded(&mut self, key: &K, revision: u64) -> Option<SaveStatus> {
        let slot = self.slots.get_mut(key)?;
        if slot.in_flight != Some(revision) {
            tracing::debug!(key = ?key, revision, "Ignoring completion of a save that is not in flight");
            return Some(slot.status);
        }

        slot.in_flight = None;
        slot.saved_revision = revision;
        slot.last_error = None;
        slot.failures = 0;
        slot.retry_at = None;

        if slot.latest_revision > revision {
            slot.status = SaveStatus::Dirty;
            slot.dirty_since = slot.queued_since.take().or(Some(slot.last_edit));
        } else {
            slot.status = SaveStatus::Clean;
            slot.dirty_since = None;
            slot.queued_since = None;
        }
        Some(slot.status)
    }

    /// Settle a save the server ignored because it already holds
    /// `accepted`, a revision at least as new. The newest values go out
    /// again under a revision above `accepted`.
    pub fn save_superseded(&mut self, key: &K, revision: u64, accepted: u64) -> Option<SaveStatus> {
        let slot = self.slots.get_mut(key)?;
        if slot.in_flight != Some(revision) {
            return Some(slot.status);
        }

        slot.in_flight = None;
        slot.status = SaveStatus::Dirty;
        slot.latest_revision = slot.latest_revision.max(accepted + 1);
        slot.dirty_since = slot.queued_since.take().or(slot.dirty_since).or(Some(slot.last_edit));
        slot.retry_at = None;

        tracing::debug!(
            key = ?key,
            revision,
            accepted,
            next = slot.latest_revision,
            "Autosave superseded by a stored revision; resending"
        );
        Some(slot.status)
    }

    /// Settle a save that failed; the entity is dirty again and keeps its values
    pub fn save_failed(&mut self, key: &K, revision: u64, error: impl fmt::Display, now: Instant) -> Option<SaveStatus> {
        let slot = self.slots.get_mut(key)?;
        if slot.in_flight != Some(revision) {
            return Some(slot.status);
        }

        slot.in_flight = None;
        slot.status = SaveStatus::Dirty;
        slot.failures += 1;
        slot.last_error = Some(error.to_string());
        slot.queued_since = None;
        if slot.latest_revision == revision {
            slot.retry_at = Some(now + self.config.retry_backoff);
        }

        tracing::warn!(
            key = ?key,
            revision,
            failures = slot.failures,
            error = %slot.last_error.as_deref().unwrap_or_default(),
            "Autosave failed; will retry"
        );
        Some(slot.status)
    }

    pub fn status(&self, key: &K) -> SaveStatus {
        self.slots.get(key).map_or(SaveStatus::Clean, |slot| slot.status)
    }

    /// Newest local values for `key`, saved or not
    pub fn values(&self, key: &K) -> Option<&V> {
        self.slots.get(key).map(|slot| &slot.latest)
    }

    pub fn last_error(&self, key: &K) -> Option<&str> {
        self.slots.get(key).and_then(|slot| slot.last_error.as_deref())
    }

    /// Earliest instant at which `poll` will hand out a save
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| slot.due_at(&self.config))
            .min()
    }

    pub fn has_unsaved(&self) -> bool {
        self.slots.values().any(|slot| slot.status != SaveStatus::Clean)
    }

    pub fn indicator(&self) -> SaveIndicator {
        if self.slots.values().any(|s| s.status == SaveStatus::Saving) {
            return SaveIndicator::Saving;
        }
        if let Some(message) = self
            .slots
            .values()
            .find_map(|s| (s.status == SaveStatus::Dirty).then(|| s.last_error.clone()).flatten())
        {
            return SaveIndicator::Failed { message };
        }
        if self.has_unsaved() {
            SaveIndicator::Unsaved
        } else {
            SaveIndicator::Saved
        }
    }

    /// Drop clean entries, keeping their revision counters
    pub fn prune(&mut self) {
        let issued = &mut self.issued;
        self.slots.retain(|key, slot| {
            if slot.status == SaveStatus::Clean {
                issued.insert(key.clone(), slot.latest_revision);
                return false;
            }
            true
        });
    }
}

fn start_save<K: Clone, V: Clone>(key: &K, slot: &mut Slot<V>) -> SaveRequest<K, V> {
    slot.status = SaveStatus::Saving;
    slot.in_flight = Some(slot.latest_revision);
    slot.queued_since = None;
    SaveRequest {
        key: key.clone(),
        revision: slot.latest_revision,
        values: slot.latest.clone(),
    }
}
