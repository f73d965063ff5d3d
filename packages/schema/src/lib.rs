//! # RailsPress Schema
//!
//! Schema-driven settings for sections, blocks and themes.
//!
//! ```text
//! schema JSON ──► SchemaRegistry
//!                    │
//!      raw values ──►│ apply_settings ──► stored Settings (+ per-field errors)
//!                    │
//!    context data ──►│ resolve_form   ──► ResolvedField[] (value, options, constraints)
//! ```
//!
//! The registry is immutable once loaded; context data is supplied per call
//! and never cached here.

mod context;
mod field;
mod resolve;
mod schema;
mod validate;

pub use context::{ContextData, ContextProvider, NoContext};
pub use field::{Constraints, FieldType, OptionsSource, SelectOption, SettingField};
pub use resolve::{resolve_form, resolve_settings, resolve_value, ResolvedField};
pub use schema::{Schema, SchemaError, SchemaKind, SchemaRegistry};
pub use validate::{
    apply_settings, validate_value, FieldError, FieldErrorCode, FieldErrors, SettingsOutcome,
    SettingsWrite,
};
