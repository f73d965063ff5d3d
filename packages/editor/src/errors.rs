//! Error types for the editor

use crate::ordering::OrderMismatch;
use crate::publish::PublishIssue;
use railspress_common::{Classify, EntityKind, ErrorKind, GraphState};
use railspress_schema::FieldErrors;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Validation failed for: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    Validation(FieldErrors),

    #[error("{0}")]
    OrderMismatch(#[from] OrderMismatch),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Publish rejected: {} issue(s) in draft", .0.len())]
    PublishConflict(Vec<PublishIssue>),

    #[error("The {0} graph is read-only; edit the draft and publish")]
    ReadOnly(GraphState),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

impl EditorError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        EditorError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl Classify for EditorError {
    fn kind(&self) -> ErrorKind {
        match self {
            EditorError::Validation(_)
            | EditorError::ReadOnly(_)
            | EditorError::InvalidStructure(_) => ErrorKind::Validation,
            EditorError::OrderMismatch(_) => ErrorKind::OrderMismatch,
            EditorError::NotFound { .. } => ErrorKind::NotFound,
            EditorError::PublishConflict(_) => ErrorKind::PublishConflict,
        }
    }

    fn details(&self) -> Value {
        match self {
            EditorError::Validation(errors) => json!({ "fields": errors }),
            EditorError::OrderMismatch(mismatch) => json!(mismatch),
            EditorError::NotFound { kind, id } => json!({ "kind": kind, "id": id }),
            EditorError::PublishConflict(issues) => json!({ "issues": issues }),
            EditorError::ReadOnly(_) | EditorError::InvalidStructure(_) => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railspress_common::Severity;

    #[test]
    fn test_not_found_is_blocking() {
        let err = EditorError::not_found(EntityKind::Snapshot, "snap-1");
        let report = err.report();

        assert_eq!(report.kind, ErrorKind::NotFound);
        assert_eq!(report.severity, Severity::Blocking);
        assert_eq!(report.message, "Snapshot not found: snap-1");
        assert_eq!(report.details["id"], "snap-1");
    }

    #[test]
    fn test_read_only_classifies_as_validation() {
        let err = EditorError::ReadOnly(GraphState::Live);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("live graph is read-only"));
    }
}
