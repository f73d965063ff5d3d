//! # RailsPress Editor
//!
//! Composition editing engine: everything that happens to a template between
//! the operator's edit and the storage write, with no I/O of its own.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ schema: registry, settings validation       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: TemplateRecord lifecycle            │
//! │  - Draft patches with validation            │
//! │  - Ordering engine (dedup, fail closed)     │
//! │  - Publish draft → live, snapshot, rollback │
//! │  - Resolved graphs for rendering            │
//! │  - Autosave + preview + drag state machines │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ workspace: locking, persistence, transport  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Draft is the only editable graph**: live changes only by publish or
//!    an explicit live rollback
//! 2. **All or nothing**: every record operation works on a copy and commits
//!    on success
//! 3. **Positions follow list order**: always `0..n`, renumbered after every
//!    structural change
//! 4. **Snapshots are immutable**: rollback snapshots what it overwrites
//!
//! ## Usage
//!
//! ```rust,ignore
//! use railspress_editor::{DraftPatch, TemplateRecord};
//! use railspress_common::GraphState;
//!
//! let mut record = TemplateRecord::new("index", "dawn");
//! record.mutate_draft(&DraftPatch::AddSection { .. }, &registry, None)?;
//! record.reorder(GraphState::Draft, vec!["hero".into(), "faq".into()], &registry)?;
//!
//! let marker = record.publish("alice", &registry)?;
//! let page = record.current_state(GraphState::Live, &registry, Some(&theme))?;
//! ```

mod autosave;
mod errors;
mod mutations;
mod ordering;
mod preview;
mod publish;
mod resolved;
mod session;
mod snapshots;
mod template;
mod theme;

pub use autosave::{Autosave, AutosaveConfig, SaveIndicator, SaveRequest, SaveStatus};
pub use errors::EditorError;
pub use mutations::{DraftPatch, PatchContext, PatchOutcome, SettingsTarget};
pub use ordering::{
    check_sequence, dedup_stable, insert_at, remove_by_id, renumber, reorder, Deduplicated,
    OrderMismatch, Positioned, ReorderOutcome, SequenceFault,
};
pub use preview::{PreviewDecision, PreviewLedger, PreviewVersion, RenderToken, RenderedPreview};
pub use publish::{check_publishable, IssueReason, PublishIssue};
pub use resolved::{resolve_sections, ResolvedBlock, ResolvedComposition, ResolvedSection};
pub use session::{CommitResolution, DragScope, DragState, EditSession, SessionError};
pub use snapshots::{Snapshot, SnapshotLog, SnapshotSummary, SnapshotTrigger};
pub use template::{LiveVersion, PublishState, RollbackReceipt, TemplateRecord};
pub use theme::{
    install, BlockPreset, SectionPreset, TemplatePreset, ThemeManifest, ThemeRecord,
    ThemeSettingsOutcome,
};
