use crate::store::StoreError;
use railspress_common::{Classify, EntityKind, ErrorKind};
use railspress_editor::EditorError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Template {template_id} is busy (waited {waited_ms}ms)")]
    Busy { template_id: String, waited_ms: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl Classify for ServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Editor(e) => e.kind(),
            ServiceError::Store(e) => e.kind(),
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Busy { .. } => ErrorKind::ConcurrencyConflict,
            ServiceError::InvalidRequest(_) => ErrorKind::Validation,
            ServiceError::Encode(_) => ErrorKind::TransportFailure,
        }
    }

    fn details(&self) -> Value {
        match self {
            ServiceError::Editor(e) => e.details(),
            ServiceError::Store(_) | ServiceError::InvalidRequest(_) | ServiceError::Encode(_) => {
                Value::Null
            }
            ServiceError::NotFound { kind, id } => json!({ "kind": kind, "id": id }),
            ServiceError::Busy {
                template_id,
                waited_ms,
            } => json!({ "template_id": template_id, "waited_ms": waited_ms }),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
