use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error taxonomy shared by every builder operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A settings value failed its field contract (per field, recoverable)
    Validation,
    /// Reorder payload does not match the known identifier set
    OrderMismatch,
    /// Unknown template, section, block, snapshot or operation
    NotFound,
    /// Draft graph invalid at publish time, live left untouched
    PublishConflict,
    /// Storage or network unavailable, retry expected
    TransportFailure,
    /// Another mutation holds the template, retry after backoff
    ConcurrencyConflict,
}

/// How an error should be presented to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient notification, editor stays usable
    Transient,
    /// Blocking message requiring acknowledgement
    Blocking,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::NotFound | ErrorKind::PublishConflict => Severity::Blocking,
            ErrorKind::Validation
            | ErrorKind::OrderMismatch
            | ErrorKind::TransportFailure
            | ErrorKind::ConcurrencyConflict => Severity::Transient,
        }
    }

    /// Whether repeating the same request later may succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransportFailure | ErrorKind::ConcurrencyConflict
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::OrderMismatch => "order_mismatch",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PublishConflict => "publish_conflict",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every crate error so transports can classify it
pub trait Classify: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Structured payload (field errors, offending sections, ...)
    fn details(&self) -> Value {
        Value::Null
    }

    fn report(&self) -> ErrorReport {
        let kind = self.kind();
        ErrorReport {
            kind,
            severity: kind.severity(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Serializable error payload handed to any transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}
