//! # Template Records
//!
//! A template owns exactly one draft graph and at most one live graph, plus
//! its append-only snapshot log. All interactive edits go to the draft; only
//! [`TemplateRecord::publish`] and a live-targeted
//! [`TemplateRecord::rollback`] replace the live graph.
//!
//! Every operation works on a copy of whatever it touches and commits only
//! when it succeeds, so a failed call leaves the record exactly as it was.
//!
//! ```text
//! DraftOnly ──publish──► Published(v1) ──publish/rollback(live)──► Published(v2) ...
//! ```
//!
//! Once a live graph exists it is never removed again; rollback only replaces
//! its content.

use crate::errors::EditorError;
use crate::mutations::{DraftPatch, PatchContext, PatchOutcome, SettingsTarget};
use crate::publish::check_publishable;
use crate::resolved::{resolve_sections, ResolvedComposition};
use crate::snapshots::{Snapshot, SnapshotLog, SnapshotSummary, SnapshotTrigger};
use crate::theme::ThemeRecord;
use chrono::{DateTime, Utc};
use railspress_common::{Composition, EntityKind, GraphState, IdGenerator, Settings};
use railspress_schema::{resolve_settings, ContextProvider, SchemaRegistry, SettingsWrite};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker for the current live content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveVersion {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub published_by: String,
    /// Snapshot of the live content this version replaced (none on first publish)
    pub snapshot_id: Option<String>,
    /// Set when this version was produced by a rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishState {
    DraftOnly,
    Published { version: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReceipt {
    pub target: GraphState,
    pub restored_from: String,
    /// Implicit snapshot of what the rollback overwrote
    pub undo_snapshot_id: String,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub theme_id: String,
    draft: Composition,
    #[serde(default)]
    live: Option<Composition>,
    #[serde(default)]
    draft_revision: u64,
    #[serde(default)]
    live_version: Option<LiveVersion>,
    #[serde(default)]
    snapshots: SnapshotLog,
    ids: IdGenerator,
    #[serde(default)]
    settings_revisions: BTreeMap<String, u64>,
}

impl TemplateRecord {
    pub fn new(id: impl Into<String>, theme_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            ids: IdGenerator::new(&id),
            id,
            theme_id: theme_id.into(),
            draft: Composition::new(),
            live: None,
            draft_revision: 0,
            live_version: None,
            snapshots: SnapshotLog::new(),
            settings_revisions: BTreeMap::new(),
        }
    }

    pub fn draft(&self) -> &Composition {
        &self.draft
    }

    pub fn live(&self) -> Option<&Composition> {
        self.live.as_ref()
    }

    pub fn graph(&self, state: GraphState) -> Option<&Composition> {
        match state {
            GraphState::Draft => Some(&self.draft),
            GraphState::Live => self.live.as_ref(),
        }
    }

    pub fn draft_revision(&self) -> u64 {
        self.draft_revision
    }

    pub fn live_version(&self) -> Option<&LiveVersion> {
        self.live_version.as_ref()
    }

    /// Highest client revision applied to `target`'s settings
    pub fn settings_revision(&self, target: &SettingsTarget) -> Option<u64> {
        self.settings_revisions.get(&target.key()).copied()
    }

    /// Draft revision or live version number
    pub fn revision(&self, state: GraphState) -> Option<u64> {
        match state {
            GraphState::Draft => Some(self.draft_revision),
            GraphState::Live => self.live_version.as_ref().map(|v| v.version),
        }
    }

    pub fn publish_state(&self) -> PublishState {
        match &self.live_version {
            Some(marker) => PublishState::Published {
                version: marker.version,
            },
            None => PublishState::DraftOnly,
        }
    }

    pub fn snapshot_log(&self) -> &SnapshotLog {
        &self.snapshots
    }

    /// Apply one patch to the draft; the live graph is never touched
    pub fn mutate_draft(
        &mut self,
        patch: &DraftPatch,
        registry: &SchemaRegistry,
        context: Option<&dyn ContextProvider>,
    ) -> Result<PatchOutcome, EditorError> {
        let mut draft = self.draft.clone();
        let mut ids = self.ids.clone();
        let mut revisions = self.settings_revisions.clone();

        let outcome = {
            let mut cx = PatchContext {
                registry,
                context,
                ids: &mut ids,
                revisions: &mut revisions,
            };
            patch.apply(&mut draft, &mut cx)?
        };

        if outcome.changed {
            self.draft = draft;
            self.draft_revision += 1;
        }
        self.ids = ids;
        self.settings_revisions = revisions;

        tracing::debug!(
            template_id = %self.id,
            patch = patch.name(),
            changed = outcome.changed,
            revision = self.draft_revision,
            "Applied draft patch"
        );
        Ok(outcome)
    }

    /// Reorder sections of `state`; only the draft accepts structural edits
    pub fn reorder(
        &mut self,
        state: GraphState,
        order: Vec<String>,
        registry: &SchemaRegistry,
    ) -> Result<PatchOutcome, EditorError> {
        if state == GraphState::Live {
            return Err(EditorError::ReadOnly(state));
        }
        self.mutate_draft(&DraftPatch::ReorderSections { order }, registry, None)
    }

    /// Settings write for a section or block of the draft
    pub fn apply_settings(
        &mut self,
        target: SettingsTarget,
        write: SettingsWrite,
        client_revision: Option<u64>,
        registry: &SchemaRegistry,
        context: Option<&dyn ContextProvider>,
    ) -> Result<PatchOutcome, EditorError> {
        let patch = DraftPatch::SetSettings {
            target,
            values: write.values,
            strict: write.strict,
            replace: write.replace,
            client_revision,
        };
        self.mutate_draft(&patch, registry, context)
    }

    /// Copy the draft into live, snapshotting the previous live content first
    pub fn publish(&mut self, actor: &str, registry: &SchemaRegistry) -> Result<LiveVersion, EditorError> {
        let issues = check_publishable(&self.draft, registry);
        if !issues.is_empty() {
            tracing::warn!(
                template_id = %self.id,
                issues = issues.len(),
                "Publish rejected"
            );
            return Err(EditorError::PublishConflict(issues));
        }

        let mut ids = self.ids.clone();
        let mut snapshots = self.snapshots.clone();
        let next_version = self.live_version.as_ref().map_or(1, |v| v.version + 1);

        let snapshot_id = match &self.live {
            Some(live) => {
                let snapshot = Snapshot {
                    id: ids.new_id("snap"),
                    label: format!("Before publish v{}", next_version),
                    created_at: Utc::now(),
                    created_by: actor.to_string(),
                    source: GraphState::Live,
                    trigger: SnapshotTrigger::Publish,
                    composition: live.clone(),
                };
                let id = snapshot.id.clone();
                snapshots.append(snapshot);
                Some(id)
            }
            None => None,
        };

        let marker = LiveVersion {
            version: next_version,
            published_at: Utc::now(),
            published_by: actor.to_string(),
            snapshot_id,
            restored_from: None,
        };

        self.live = Some(self.draft.clone());
        self.live_version = Some(marker.clone());
        self.snapshots = snapshots;
        self.ids = ids;

        tracing::info!(
            template_id = %self.id,
            version = marker.version,
            actor = %actor,
            "Published draft"
        );
        Ok(marker)
    }

    /// Capture `state` as an immutable snapshot and return its id.
    ///
    /// Capturing live before the first publish records an empty graph.
    pub fn snapshot(&mut self, state: GraphState, label: Option<String>, actor: &str) -> String {
        let composition = self.graph(state).cloned().unwrap_or_default();
        let id = self.ids.new_id("snap");
        let label = label.unwrap_or_else(|| format!("{} snapshot {}", state, self.snapshots.len() + 1));

        self.snapshots.append(Snapshot {
            id: id.clone(),
            label,
            created_at: Utc::now(),
            created_by: actor.to_string(),
            source: state,
            trigger: SnapshotTrigger::Manual,
            composition,
        });

        tracing::info!(template_id = %self.id, snapshot_id = %id, state = %state, "Captured snapshot");
        id
    }

    /// Newest first
    pub fn list_snapshots(&self) -> Vec<SnapshotSummary> {
        self.snapshots.summaries()
    }

    /// Replace `target` with a snapshot's content.
    ///
    /// Whatever is overwritten is snapshotted first so the rollback itself
    /// can be undone. The restored snapshot is left as it was.
    pub fn rollback(
        &mut self,
        snapshot_id: &str,
        target: GraphState,
        actor: &str,
    ) -> Result<RollbackReceipt, EditorError> {
        let restored = self
            .snapshots
            .get(snapshot_id)
            .ok_or_else(|| EditorError::not_found(EntityKind::Snapshot, snapshot_id))?
            .composition
            .clone();

        let mut ids = self.ids.clone();
        let undo = Snapshot {
            id: ids.new_id("snap"),
            label: format!("Before rollback to {}", snapshot_id),
            created_at: Utc::now(),
            created_by: actor.to_string(),
            source: target,
            trigger: SnapshotTrigger::Rollback,
            composition: self.graph(target).cloned().unwrap_or_default(),
        };
        let undo_snapshot_id = undo.id.clone();

        let revision = match target {
            GraphState::Draft => {
                self.draft = restored;
                self.draft_revision += 1;
                self.draft_revision
            }
            GraphState::Live => {
                let version = self.live_version.as_ref().map_or(1, |v| v.version + 1);
                self.live = Some(restored);
                self.live_version = Some(LiveVersion {
                    version,
                    published_at: Utc::now(),
                    published_by: actor.to_string(),
                    snapshot_id: Some(undo_snapshot_id.clone()),
                    restored_from: Some(snapshot_id.to_string()),
                });
                version
            }
        };
        self.snapshots.append(undo);
        self.ids = ids;

        tracing::info!(
            template_id = %self.id,
            snapshot_id = %snapshot_id,
            target = %target,
            revision,
            "Rolled back"
        );
        Ok(RollbackReceipt {
            target,
            restored_from: snapshot_id.to_string(),
            undo_snapshot_id,
            revision,
        })
    }

    /// Fully resolved graph for rendering; without a theme record the theme
    /// schema defaults apply
    pub fn current_state(
        &self,
        state: GraphState,
        registry: &SchemaRegistry,
        theme: Option<&ThemeRecord>,
    ) -> Result<ResolvedComposition, EditorError> {
        let (composition, revision) = match state {
            GraphState::Draft => (&self.draft, self.draft_revision),
            GraphState::Live => match (&self.live, &self.live_version) {
                (Some(live), Some(marker)) => (live, marker.version),
                _ => return Err(EditorError::not_found(EntityKind::LiveGraph, &self.id)),
            },
        };

        let empty = Settings::new();
        let theme_settings = theme.map_or(&empty, |t| &t.settings);

        Ok(ResolvedComposition {
            template_id: self.id.clone(),
            theme_id: self.theme_id.clone(),
            state,
            revision,
            theme_revision: theme.map_or(0, ThemeRecord::settings_revision),
            theme_settings: resolve_settings(registry.theme(), theme_settings),
            sections: resolve_sections(composition, registry),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::IssueReason;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_value(json!({
            "theme": { "settings": [ { "key": "accent", "type": "color", "default": "#000000" } ] },
            "sections": [
                { "type": "hero", "settings": [ { "key": "heading", "type": "text", "default": "Hi" } ] },
                { "type": "text", "settings": [] }
            ]
        }))
        .unwrap()
    }

    fn add(record: &mut TemplateRecord, section_type: &str, id: &str) {
        record
            .mutate_draft(
                &DraftPatch::AddSection {
                    section_type: section_type.into(),
                    index: None,
                    settings: Settings::new(),
                    section_id: Some(id.into()),
                },
                &registry(),
                None,
            )
            .unwrap();
    }

    #[test]
    fn test_new_template_is_draft_only() {
        let record = TemplateRecord::new("index", "dawn");

        assert_eq!(record.publish_state(), PublishState::DraftOnly);
        assert!(record.live().is_none());
        assert_eq!(record.revision(GraphState::Live), None);
    }

    #[test]
    fn test_revision_bumps_only_on_change() {
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");
        add(&mut record, "text", "b");
        assert_eq!(record.draft_revision(), 2);

        record
            .reorder(GraphState::Draft, vec!["a".into(), "b".into()], &registry())
            .unwrap();
        assert_eq!(record.draft_revision(), 2);
    }

    #[test]
    fn test_failed_patch_leaves_record_untouched() {
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");
        let before = record.clone();

        let err = record
            .reorder(GraphState::Draft, vec!["a".into(), "zz".into()], &registry())
            .unwrap_err();
        assert!(matches!(err, EditorError::OrderMismatch(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn test_live_is_read_only() {
        let mut record = TemplateRecord::new("index", "dawn");
        let err = record.reorder(GraphState::Live, vec![], &registry()).unwrap_err();
        assert_eq!(err, EditorError::ReadOnly(GraphState::Live));
    }

    #[test]
    fn test_publish_snapshots_previous_live() {
        let registry = registry();
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");

        let first = record.publish("alice", &registry).unwrap();
        assert_eq!(first.version, 1);
        assert!(first.snapshot_id.is_none());
        assert!(record.list_snapshots().is_empty());

        add(&mut record, "text", "b");
        let second = record.publish("bob", &registry).unwrap();
        assert_eq!(second.version, 2);

        let snapshots = record.list_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(Some(&snapshots[0].id), second.snapshot_id.as_ref());
        assert_eq!(snapshots[0].section_count, 1);
        assert_eq!(record.live().map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_publish_empty_draft_conflicts() {
        let mut record = TemplateRecord::new("index", "dawn");
        let err = record.publish("alice", &registry()).unwrap_err();

        match err {
            EditorError::PublishConflict(issues) => {
                assert_eq!(issues[0].reason, IssueReason::EmptyDraft)
            }
            other => panic!("expected publish conflict, got {:?}", other),
        }
        assert_eq!(record.publish_state(), PublishState::DraftOnly);
    }

    #[test]
    fn test_rollback_draft_is_undoable() {
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");
        let snap = record.snapshot(GraphState::Draft, Some("one section".into()), "alice");
        add(&mut record, "text", "b");

        let receipt = record.rollback(&snap, GraphState::Draft, "alice").unwrap();
        assert_eq!(record.draft().section_ids(), vec!["a"]);

        record
            .rollback(&receipt.undo_snapshot_id, GraphState::Draft, "alice")
            .unwrap();
        assert_eq!(record.draft().section_ids(), vec!["a", "b"]);

        // The restored snapshot is unchanged
        let original = record.snapshot_log().get(&snap).unwrap();
        assert_eq!(original.composition.len(), 1);
        assert_eq!(original.label, "one section");
    }

    #[test]
    fn test_rollback_unknown_snapshot() {
        let mut record = TemplateRecord::new("index", "dawn");
        let err = record.rollback("snap-x", GraphState::Draft, "alice").unwrap_err();
        assert!(matches!(err, EditorError::NotFound { kind: EntityKind::Snapshot, .. }));
    }

    #[test]
    fn test_current_state_resolves_defaults() {
        let registry = registry();
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");

        let resolved = record
            .current_state(GraphState::Draft, &registry, None)
            .unwrap();
        assert_eq!(resolved.sections[0].settings["heading"], json!("Hi"));
        assert_eq!(resolved.theme_settings["accent"], json!("#000000"));
        assert_eq!(resolved.revision, 1);
        assert_eq!(resolved.theme_revision, 0);

        let err = record
            .current_state(GraphState::Live, &registry, None)
            .unwrap_err();
        assert!(matches!(err, EditorError::NotFound { kind: EntityKind::LiveGraph, .. }));
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let mut record = TemplateRecord::new("index", "dawn");
        add(&mut record, "hero", "a");
        record.publish("alice", &registry()).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: TemplateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
