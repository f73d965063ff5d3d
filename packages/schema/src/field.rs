//! Setting field declarations.
//!
//! A field is declared once per section/block/theme type and describes how
//! one key of a settings bag is edited and validated:
//!
//! ```json
//! { "key": "items_per_page", "type": "number", "label": "Posts per page",
//!   "default": 10, "min": 1, "max": 50 }
//! { "key": "category", "type": "select", "label": "Category",
//!   "options_source": "@categories" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Richtext,
    Url,
    Color,
    Image,
    Number,
    Range,
    Checkbox,
    Select,
    Radio,
}

impl FieldType {
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Textarea
                | FieldType::Richtext
                | FieldType::Url
                | FieldType::Color
                | FieldType::Image
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Range)
    }

    pub fn has_options(self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Richtext => "richtext",
            FieldType::Url => "url",
            FieldType::Color => "color",
            FieldType::Image => "image",
            FieldType::Number => "number",
            FieldType::Range => "range",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Declared limits a value must satisfy before it is stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression the whole value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One selectable option of a select/radio field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectOptionRepr")]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Options may be written as bare strings or as `{value, label}` objects
/// with string or numeric values (record ids from context data).
#[derive(Deserialize)]
#[serde(untagged)]
enum SelectOptionRepr {
    Plain(String),
    Full {
        value: Value,
        #[serde(default)]
        label: Option<String>,
    },
}

impl From<SelectOptionRepr> for SelectOption {
    fn from(repr: SelectOptionRepr) -> Self {
        match repr {
            SelectOptionRepr::Plain(value) => SelectOption {
                label: value.clone(),
                value,
            },
            SelectOptionRepr::Full { value, label } => {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                SelectOption {
                    label: label.unwrap_or_else(|| value.clone()),
                    value,
                }
            }
        }
    }
}

/// Symbolic reference to context data, written `@key`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OptionsSource {
    key: String,
}

impl OptionsSource {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.strip_prefix('@') {
            Some(key) if !key.is_empty() => Ok(Self {
                key: key.to_string(),
            }),
            _ => Err(format!(
                "options_source must look like '@key', got '{}'",
                raw
            )),
        }
    }

    /// Context data key, without the leading `@`
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl TryFrom<String> for OptionsSource {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        OptionsSource::parse(&raw)
    }
}

impl From<OptionsSource> for String {
    fn from(source: OptionsSource) -> Self {
        format!("@{}", source.key)
    }
}

impl fmt::Display for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.key)
    }
}

/// Declared setting field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingField {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub constraints: Constraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_source: Option<OptionsSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl SettingField {
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            label: String::new(),
            default: None,
            constraints: Constraints::default(),
            options: None,
            options_source: None,
            info: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn options_source(mut self, source: OptionsSource) -> Self {
        self.options_source = Some(source);
        self
    }

    /// Label shown in forms, falling back to the key
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_with_flattened_constraints() {
        let field: SettingField = serde_json::from_value(json!({
            "key": "items_per_page",
            "type": "number",
            "label": "Posts per page",
            "default": 10,
            "min": 1,
            "max": 50
        }))
        .unwrap();

        assert_eq!(field.field_type, FieldType::Number);
        assert_eq!(field.constraints.min, Some(1.0));
        assert_eq!(field.constraints.max, Some(50.0));
        assert!(!field.constraints.required);
        assert_eq!(field.default, Some(json!(10)));
    }

    #[test]
    fn test_options_source_requires_at_prefix() {
        let ok: Result<SettingField, _> = serde_json::from_value(json!({
            "key": "category", "type": "select", "options_source": "@categories"
        }));
        assert_eq!(ok.unwrap().options_source.unwrap().key(), "categories");

        let bad: Result<SettingField, _> = serde_json::from_value(json!({
            "key": "category", "type": "select", "options_source": "categories"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_select_option_shorthands() {
        let options: Vec<SelectOption> = serde_json::from_value(json!([
            "left",
            { "value": 7, "label": "News" },
            { "value": "right" }
        ]))
        .unwrap();

        assert_eq!(options[0], SelectOption::new("left", "left"));
        assert_eq!(options[1], SelectOption::new("7", "News"));
        assert_eq!(options[2], SelectOption::new("right", "right"));
    }

    #[test]
    fn test_display_label_falls_back_to_key() {
        let field = SettingField::new("heading", FieldType::Text);
        assert_eq!(field.display_label(), "heading");
        assert_eq!(field.label("Heading").display_label(), "Heading");
    }
}
