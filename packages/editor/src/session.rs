//! # Edit Session Management
//!
//! Tracks one operator's editing state for one template: the current
//! selection and the drag-and-drop machine.
//!
//! ```text
//! Idle ──begin_drag──► Dragging ──drop──► Committing ──finish_commit──► Idle
//!                         │
//!                         └──cancel_drag──► Idle
//! ```
//!
//! Click handling is only enabled while `Idle`, so a drop can never be
//! mistaken for a click on the item under the pointer.

use crate::mutations::DraftPatch;
use crate::ordering::dedup_stable;
use railspress_common::EntityRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What is being reordered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DragScope {
    Sections,
    Blocks { section_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DragState {
    Idle,
    Dragging {
        scope: DragScope,
        original: Vec<String>,
        current: Vec<String>,
    },
    Committing {
        scope: DragScope,
        original: Vec<String>,
        order: Vec<String>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A drag is already in progress")]
    NotIdle,

    #[error("No drag in progress")]
    NotDragging,

    #[error("No reorder is being committed")]
    NotCommitting,
}

/// How the UI should settle after a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommitResolution {
    Applied { order: Vec<String> },
    /// The reorder was rejected; show the pre-drag order again
    Reverted { order: Vec<String> },
}

/// Single edit session (one operator, one template)
#[derive(Debug, Clone)]
pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    pub template_id: String,

    selection: Option<EntityRef>,

    drag: DragState,
}

impl EditSession {
    pub fn new(id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            selection: None,
            drag: DragState::Idle,
        }
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn accepts_clicks(&self) -> bool {
        matches!(self.drag, DragState::Idle)
    }

    pub fn selection(&self) -> Option<&EntityRef> {
        self.selection.as_ref()
    }

    /// Select an entity; ignored (returns false) while a drag is active
    pub fn select(&mut self, entity: Option<EntityRef>) -> bool {
        if !self.accepts_clicks() {
            return false;
        }
        self.selection = entity;
        true
    }

    pub fn begin_drag(&mut self, scope: DragScope, current_order: Vec<String>) -> Result<(), SessionError> {
        if !self.accepts_clicks() {
            return Err(SessionError::NotIdle);
        }
        self.drag = DragState::Dragging {
            scope,
            current: current_order.clone(),
            original: current_order,
        };
        Ok(())
    }

    /// Record the order as currently displayed, which may repeat an id mid-drag
    pub fn drag_over(&mut self, order: Vec<String>) -> Result<(), SessionError> {
        match &mut self.drag {
            DragState::Dragging { current, .. } => {
                *current = order;
                Ok(())
            }
            _ => Err(SessionError::NotDragging),
        }
    }

    pub fn cancel_drag(&mut self) -> Result<(), SessionError> {
        match self.drag {
            DragState::Dragging { .. } => {
                self.drag = DragState::Idle;
                Ok(())
            }
            _ => Err(SessionError::NotDragging),
        }
    }

    /// Finish the drag and produce the reorder to send.
    ///
    /// Returns `None` (and goes straight back to `Idle`) when the dropped
    /// order equals the original.
    pub fn drop_drag(&mut self) -> Result<Option<DraftPatch>, SessionError> {
        if !matches!(self.drag, DragState::Dragging { .. }) {
            return Err(SessionError::NotDragging);
        }
        let DragState::Dragging {
            scope,
            original,
            current,
        } = std::mem::replace(&mut self.drag, DragState::Idle)
        else {
            return Err(SessionError::NotDragging);
        };

        let order = dedup_stable(&current).order;
        if order == original {
            return Ok(None);
        }

        let patch = match &scope {
            DragScope::Sections => DraftPatch::ReorderSections {
                order: order.clone(),
            },
            DragScope::Blocks { section_id } => DraftPatch::ReorderBlocks {
                section_id: section_id.clone(),
                order: order.clone(),
            },
        };
        self.drag = DragState::Committing {
            scope,
            original,
            order,
        };
        Ok(Some(patch))
    }

    /// Settle the in-flight reorder and return to `Idle`
    pub fn finish_commit(&mut self, accepted: bool) -> Result<CommitResolution, SessionError> {
        if !matches!(self.drag, DragState::Committing { .. }) {
            return Err(SessionError::NotCommitting);
        }
        let DragState::Committing { original, order, .. } =
            std::mem::replace(&mut self.drag, DragState::Idle)
        else {
            return Err(SessionError::NotCommitting);
        };

        Ok(if accepted {
            CommitResolution::Applied { order }
        } else {
            CommitResolution::Reverted { order: original }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_session_creation() {
        let session = EditSession::new("client-1", "index");

        assert_eq!(session.id, "client-1");
        assert!(session.accepts_clicks());
        assert!(session.selection().is_none());
    }

    #[test]
    fn test_clicks_ignored_while_dragging() {
        let mut session = EditSession::new("client-1", "index");
        session.begin_drag(DragScope::Sections, ids(&["a", "b"])).unwrap();

        assert!(!session.select(Some(EntityRef::section("index", "a"))));
        assert!(session.selection().is_none());
        assert_eq!(
            session.begin_drag(DragScope::Sections, vec![]),
            Err(SessionError::NotIdle)
        );
    }

    #[test]
    fn test_drop_dedups_and_commits() {
        let mut session = EditSession::new("client-1", "index");
        session.begin_drag(DragScope::Sections, ids(&["a", "b", "c"])).unwrap();
        session.drag_over(ids(&["c", "a", "c", "b"])).unwrap();

        let patch = session.drop_drag().unwrap().unwrap();
        assert_eq!(
            patch,
            DraftPatch::ReorderSections {
                order: ids(&["c", "a", "b"])
            }
        );
        assert!(!session.accepts_clicks());

        let resolution = session.finish_commit(true).unwrap();
        assert_eq!(
            resolution,
            CommitResolution::Applied {
                order: ids(&["c", "a", "b"])
            }
        );
        assert!(session.accepts_clicks());
    }

    #[test]
    fn test_rejected_commit_reverts() {
        let mut session = EditSession::new("client-1", "index");
        session
            .begin_drag(
                DragScope::Blocks {
                    section_id: "faq".into(),
                },
                ids(&["q1", "q2"]),
            )
            .unwrap();
        session.drag_over(ids(&["q2", "q1"])).unwrap();
        session.drop_drag().unwrap();

        let resolution = session.finish_commit(false).unwrap();
        assert_eq!(
            resolution,
            CommitResolution::Reverted {
                order: ids(&["q1", "q2"])
            }
        );
    }

    #[test]
    fn test_unchanged_drop_skips_commit() {
        let mut session = EditSession::new("client-1", "index");
        session.begin_drag(DragScope::Sections, ids(&["a", "b"])).unwrap();

        assert_eq!(session.drop_drag().unwrap(), None);
        assert_eq!(session.drag_state(), &DragState::Idle);
        assert_eq!(session.finish_commit(true), Err(SessionError::NotCommitting));
    }
}
