//! # Settings Validation
//!
//! Every raw value is checked against its field contract before it reaches a
//! stored settings bag. Validation is per field: one failing key never
//! prevents its siblings from being applied, unless the write is strict.
//!
//! ## Coercion
//!
//! Form inputs often arrive as strings. Numeric fields accept numeric strings
//! (`"5"` → `5`), checkboxes accept `"true"` / `"false"`, and select values
//! are stored as strings. A `null` clears the stored override so the default
//! applies again.

use crate::context::ContextProvider;
use crate::field::{FieldType, SettingField};
use crate::schema::Schema;
use railspress_common::Settings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    Required,
    WrongType,
    BelowMinimum,
    AboveMaximum,
    StepMismatch,
    TooShort,
    TooLong,
    PatternMismatch,
    InvalidFormat,
    NotInOptions,
    UnknownField,
}

/// Why one key of a settings write was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub key: String,
    pub code: FieldErrorCode,
    pub message: String,
}

impl FieldError {
    pub fn new(key: &str, code: FieldErrorCode, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Per-field error map, keyed by setting key
pub type FieldErrors = BTreeMap<String, FieldError>;

/// Validate one raw value against its field.
///
/// Returns `Ok(None)` when the value clears the override.
pub fn validate_value(
    field: &SettingField,
    raw: &Value,
    context: Option<&dyn ContextProvider>,
) -> Result<Option<Value>, FieldError> {
    let key = field.key.as_str();
    let constraints = &field.constraints;

    if raw.is_null() {
        if constraints.required {
            return Err(FieldError::new(key, FieldErrorCode::Required, "is required"));
        }
        return Ok(None);
    }

    match field.field_type {
        FieldType::Text
        | FieldType::Textarea
        | FieldType::Richtext
        | FieldType::Url
        | FieldType::Color
        | FieldType::Image => {
            let text = raw.as_str().ok_or_else(|| {
                FieldError::new(key, FieldErrorCode::WrongType, "must be a string")
            })?;
            validate_text(field, text)?;
            Ok(Some(Value::String(text.to_string())))
        }
        FieldType::Number | FieldType::Range => {
            let (number, value) = coerce_number(key, raw)?;
            validate_number(field, number)?;
            Ok(Some(value))
        }
        FieldType::Checkbox => {
            let flag = match raw {
                Value::Bool(b) => *b,
                Value::String(s) if s == "true" => true,
                Value::String(s) if s == "false" => false,
                _ => {
                    return Err(FieldError::new(
                        key,
                        FieldErrorCode::WrongType,
                        "must be true or false",
                    ))
                }
            };
            Ok(Some(Value::Bool(flag)))
        }
        FieldType::Select | FieldType::Radio => {
            let choice = match raw {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => {
                    return Err(FieldError::new(
                        key,
                        FieldErrorCode::WrongType,
                        "must be a string or number",
                    ))
                }
            };
            if choice.is_empty() {
                if constraints.required {
                    return Err(FieldError::new(key, FieldErrorCode::Required, "is required"));
                }
                return Ok(Some(Value::String(choice)));
            }
            validate_choice(field, &choice, context)?;
            Ok(Some(Value::String(choice)))
        }
    }
}

fn validate_text(field: &SettingField, text: &str) -> Result<(), FieldError> {
    let key = field.key.as_str();
    let constraints = &field.constraints;

    if text.trim().is_empty() {
        if constraints.required {
            return Err(FieldError::new(key, FieldErrorCode::Required, "must not be empty"));
        }
        return Ok(());
    }

    let length = text.chars().count();
    if let Some(min) = constraints.min_length {
        if length < min {
            return Err(FieldError::new(
                key,
                FieldErrorCode::TooShort,
                format!("must be at least {} characters", min),
            ));
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            return Err(FieldError::new(
                key,
                FieldErrorCode::TooLong,
                format!("must be at most {} characters", max),
            ));
        }
    }

    match field.field_type {
        FieldType::Color if !is_hex_color(text) => {
            return Err(FieldError::new(
                key,
                FieldErrorCode::InvalidFormat,
                "must be a hex color like #1a2b3c",
            ));
        }
        FieldType::Url if !is_url_like(text) => {
            return Err(FieldError::new(
                key,
                FieldErrorCode::InvalidFormat,
                "must be an absolute URL or a site path",
            ));
        }
        _ => {}
    }

    if let Some(pattern) = &constraints.pattern {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            FieldError::new(
                key,
                FieldErrorCode::PatternMismatch,
                format!("pattern is invalid: {}", e),
            )
        })?;
        if !regex.is_match(text) {
            return Err(FieldError::new(
                key,
                FieldErrorCode::PatternMismatch,
                format!("must match {}", pattern),
            ));
        }
    }

    Ok(())
}

fn coerce_number(key: &str, raw: &Value) -> Result<(f64, Value), FieldError> {
    let wrong_type = || FieldError::new(key, FieldErrorCode::WrongType, "must be a number");

    match raw {
        Value::Number(n) => {
            let number = n.as_f64().ok_or_else(wrong_type)?;
            Ok((number, raw.clone()))
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok((int as f64, Value::Number(int.into())));
            }
            let float = trimmed.parse::<f64>().map_err(|_| wrong_type())?;
            let number = Number::from_f64(float).ok_or_else(wrong_type)?;
            Ok((float, Value::Number(number)))
        }
        _ => Err(wrong_type()),
    }
}

fn validate_number(field: &SettingField, number: f64) -> Result<(), FieldError> {
    let key = field.key.as_str();
    let constraints = &field.constraints;

    if let Some(min) = constraints.min {
        if number < min {
            return Err(FieldError::new(
                key,
                FieldErrorCode::BelowMinimum,
                format!("must be at least {}", min),
            ));
        }
    }
    if let Some(max) = constraints.max {
        if number > max {
            return Err(FieldError::new(
                key,
                FieldErrorCode::AboveMaximum,
                format!("must be at most {}", max),
            ));
        }
    }
    if let Some(step) = constraints.step.filter(|s| *s > 0.0) {
        let base = constraints.min.unwrap_or(0.0);
        let steps = (number - base) / step;
        if (steps - steps.round()).abs() > 1e-9 {
            return Err(FieldError::new(
                key,
                FieldErrorCode::StepMismatch,
                format!("must be a multiple of {} from {}", step, base),
            ));
        }
    }
    Ok(())
}

fn validate_choice(
    field: &SettingField,
    choice: &str,
    context: Option<&dyn ContextProvider>,
) -> Result<(), FieldError> {
    // Static options are always enforced; dynamic ones only when the
    // provider actually knows the source.
    let allowed = match (&field.options, &field.options_source, context) {
        (Some(options), _, _) => Some(options.clone()),
        (None, Some(source), Some(ctx)) => ctx.options(source.key()),
        _ => None,
    };

    match allowed {
        Some(options) if !options.iter().any(|o| o.value == choice) => Err(FieldError::new(
            &field.key,
            FieldErrorCode::NotInOptions,
            format!("'{}' is not one of the available options", choice),
        )),
        _ => Ok(()),
    }
}

fn is_hex_color(text: &str) -> bool {
    match text.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_url_like(text: &str) -> bool {
    ["http://", "https://", "mailto:", "/", "#"]
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

/// A settings write request for one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsWrite {
    pub values: Settings,
    /// All-or-nothing: any field error leaves the stored bag untouched
    #[serde(default)]
    pub strict: bool,
    /// Full replace: declared keys absent from `values` return to defaults
    #[serde(default)]
    pub replace: bool,
}

impl SettingsWrite {
    pub fn partial(values: Settings) -> Self {
        Self {
            values,
            strict: false,
            replace: false,
        }
    }

    pub fn replace(values: Settings) -> Self {
        Self {
            values,
            strict: false,
            replace: true,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// What a settings write did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOutcome {
    /// Keys whose submitted value was accepted
    pub applied: Vec<String>,
    /// Keys whose override was removed
    pub cleared: Vec<String>,
    pub errors: FieldErrors,
    /// Whether the stored bag differs from before the write
    pub changed: bool,
}

impl SettingsOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Validate `write` against `schema` and apply it to `stored`.
///
/// Failing keys keep their previously stored value.
pub fn apply_settings(
    schema: &Schema,
    stored: &mut Settings,
    write: &SettingsWrite,
    context: Option<&dyn ContextProvider>,
) -> SettingsOutcome {
    let mut outcome = SettingsOutcome::default();
    let mut next = if write.replace {
        Settings::new()
    } else {
        stored.clone()
    };

    for (key, raw) in &write.values {
        let Some(field) = schema.field(key) else {
            outcome.errors.insert(
                key.clone(),
                FieldError::new(
                    key,
                    FieldErrorCode::UnknownField,
                    format!("'{}' is not declared by {}", key, schema.display_name()),
                ),
            );
            continue;
        };

        match validate_value(field, raw, context) {
            Ok(Some(value)) => {
                next.insert(key.clone(), value);
                outcome.applied.push(key.clone());
            }
            Ok(None) => {
                if next.remove(key).is_some() || stored.contains_key(key) {
                    outcome.cleared.push(key.clone());
                }
            }
            Err(error) => {
                match stored.get(key) {
                    Some(previous) => {
                        next.insert(key.clone(), previous.clone());
                    }
                    None => {
                        next.remove(key);
                    }
                }
                outcome.errors.insert(key.clone(), error);
            }
        }
    }

    if write.replace {
        for key in stored.keys() {
            if !write.values.contains_key(key) {
                outcome.cleared.push(key.clone());
            }
        }
    }

    if write.strict && outcome.has_errors() {
        outcome.applied.clear();
        outcome.cleared.clear();
        return outcome;
    }

    outcome.changed = next != *stored;
    *stored = next;
    outcome
}
