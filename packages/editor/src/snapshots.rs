//! Immutable point-in-time copies of a composition graph.
//!
//! The log is append-only: snapshots are never edited or removed, and a
//! rollback always records the state it overwrites as a new entry first.

use chrono::{DateTime, Utc};
use railspress_common::{Composition, GraphState};
use serde::{Deserialize, Serialize};

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Manual,
    /// Live content captured just before a publish replaced it
    Publish,
    /// Content captured just before a rollback replaced it
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source: GraphState,
    pub trigger: SnapshotTrigger,
    pub composition: Composition,
}

/// Listing entry without the captured graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source: GraphState,
    pub trigger: SnapshotTrigger,
    pub section_count: usize,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            label: snapshot.label.clone(),
            created_at: snapshot.created_at,
            created_by: snapshot.created_by.clone(),
            source: snapshot.source,
            trigger: snapshot.trigger,
            section_count: snapshot.composition.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotLog {
    entries: Vec<Snapshot>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, snapshot: Snapshot) {
        self.entries.push(snapshot);
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first; ties keep reverse insertion order
    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.entries.iter().rev().map(SnapshotSummary::from).collect()
    }
}
