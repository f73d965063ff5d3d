//! # RailsPress Workspace
//!
//! Async service layer around the editing engine: per-template locking,
//! persistence, the named-operation dispatch table, background preview
//! rendering and the autosave driver. The `railspress-server` binary exposes
//! it over HTTP.

pub mod autosave;
pub mod config;
pub mod error;
pub mod locks;
pub mod operations;
pub mod preview;
pub mod service;
pub mod store;

pub use autosave::{AutosaveHandle, DriverStopped, SettingsSink};
pub use config::{Config, DEFAULT_CONFIG_NAME};
pub use error::{ServiceError, ServiceResult};
pub use locks::TemplateLocks;
pub use operations::{dispatch, Operation, OPERATIONS};
pub use preview::{HashingRenderer, PreviewEvent, PreviewSynchronizer, RenderError, RenderService};
pub use service::{BuilderService, InstallReport, SettingsReply, TemplateSummary};
pub use store::{CompositionStore, JsonFileStore, MemoryStore, StoreError};
