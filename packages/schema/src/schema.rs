//! # Schemas & Registry
//!
//! A schema declares the configurable fields of one section, block or theme
//! type. The registry holds every schema of an installed theme and is loaded
//! from a single JSON document:
//!
//! ```json
//! {
//!   "theme":    { "settings": [ ... ] },
//!   "sections": [ { "type": "faq", "label": "FAQ", "settings": [ ... ],
//!                   "blocks": ["faq_item"], "max_blocks": 12 } ],
//!   "blocks":   [ { "type": "faq_item", "settings": [ ... ] } ]
//! }
//! ```
//!
//! Loading validates the declarations themselves: duplicate keys, defaults
//! that fail their own field, malformed patterns and dangling block types are
//! all rejected up front so stored settings can always be checked later.

use crate::field::SettingField;
use crate::validate::validate_value;
use railspress_common::{Classify, ErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Theme,
    Section,
    Block,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaKind::Theme => "theme",
            SchemaKind::Section => "section",
            SchemaKind::Block => "block",
        };
        f.write_str(name)
    }
}

/// Declared fields of one section/block/theme type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub settings: Vec<SettingField>,
    /// Block types a section may contain (sections only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks: Option<usize>,
}

impl Schema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field: SettingField) -> Self {
        self.settings.push(field);
        self
    }

    pub fn with_blocks(mut self, block_types: &[&str], max_blocks: Option<usize>) -> Self {
        self.blocks = block_types.iter().map(|t| t.to_string()).collect();
        self.max_blocks = max_blocks;
        self
    }

    pub fn field(&self, key: &str) -> Option<&SettingField> {
        self.settings.iter().find(|f| f.key == key)
    }

    pub fn allows_block(&self, block_type: &str) -> bool {
        self.blocks.iter().any(|b| b == block_type)
    }

    pub fn display_name(&self) -> &str {
        if !self.label.is_empty() {
            &self.label
        } else if !self.type_name.is_empty() {
            &self.type_name
        } else {
            "theme"
        }
    }

    /// Check the declaration itself (not any stored values)
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut seen = BTreeSet::new();

        for field in &self.settings {
            if field.key.is_empty() {
                return Err(SchemaError::EmptyKey {
                    schema: self.display_name().to_string(),
                });
            }
            if !seen.insert(field.key.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.display_name().to_string(),
                    key: field.key.clone(),
                });
            }

            if let Some(pattern) = &field.constraints.pattern {
                Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                    schema: self.display_name().to_string(),
                    key: field.key.clone(),
                    reason: e.to_string(),
                })?;
            }

            if let Some(default) = &field.default {
                validate_value(field, default, None).map_err(|e| SchemaError::InvalidDefault {
                    schema: self.display_name().to_string(),
                    key: field.key.clone(),
                    reason: e.message,
                })?;
            }
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema {schema} declares a field with an empty key")]
    EmptyKey { schema: String },

    #[error("Schema {schema} declares '{key}' twice")]
    DuplicateField { schema: String, key: String },

    #[error("Duplicate {kind} type: {type_name}")]
    DuplicateType { kind: SchemaKind, type_name: String },

    #[error("Default for {schema}.{key} is invalid: {reason}")]
    InvalidDefault {
        schema: String,
        key: String,
        reason: String,
    },

    #[error("Pattern for {schema}.{key} is invalid: {reason}")]
    InvalidPattern {
        schema: String,
        key: String,
        reason: String,
    },

    #[error("Section type {section} allows undeclared block type {block_type}")]
    UnknownBlockType { section: String, block_type: String },

    #[error("{kind} schema has no type name")]
    MissingType { kind: SchemaKind },
}

impl Classify for SchemaError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[derive(Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    theme: Schema,
    #[serde(default)]
    sections: Vec<Schema>,
    #[serde(default)]
    blocks: Vec<Schema>,
}

/// Every schema of an installed theme, keyed by type
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    theme: Schema,
    sections: BTreeMap<String, Schema>,
    blocks: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let document: RegistryDocument = serde_json::from_value(value)?;
        Self::from_document(document)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn from_document(document: RegistryDocument) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.set_theme(document.theme)?;
        for block in document.blocks {
            registry.register_block(block)?;
        }
        for section in document.sections {
            registry.register_section(section)?;
        }
        registry.check_block_references()?;
        Ok(registry)
    }

    pub fn set_theme(&mut self, schema: Schema) -> Result<(), SchemaError> {
        schema.check()?;
        self.theme = schema;
        Ok(())
    }

    pub fn register_section(&mut self, schema: Schema) -> Result<(), SchemaError> {
        Self::register(&mut self.sections, SchemaKind::Section, schema)
    }

    pub fn register_block(&mut self, schema: Schema) -> Result<(), SchemaError> {
        Self::register(&mut self.blocks, SchemaKind::Block, schema)
    }

    fn register(
        target: &mut BTreeMap<String, Schema>,
        kind: SchemaKind,
        schema: Schema,
    ) -> Result<(), SchemaError> {
        if schema.type_name.is_empty() {
            return Err(SchemaError::MissingType { kind });
        }
        if target.contains_key(&schema.type_name) {
            return Err(SchemaError::DuplicateType {
                kind,
                type_name: schema.type_name,
            });
        }
        schema.check()?;
        target.insert(schema.type_name.clone(), schema);
        Ok(())
    }

    /// Every block type a section allows must itself be declared
    pub fn check_block_references(&self) -> Result<(), SchemaError> {
        for section in self.sections.values() {
            for block_type in &section.blocks {
                if !self.blocks.contains_key(block_type) {
                    return Err(SchemaError::UnknownBlockType {
                        section: section.type_name.clone(),
                        block_type: block_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn theme(&self) -> &Schema {
        &self.theme
    }

    pub fn section(&self, section_type: &str) -> Option<&Schema> {
        self.sections.get(section_type)
    }

    pub fn block(&self, block_type: &str) -> Option<&Schema> {
        self.blocks.get(block_type)
    }

    pub fn section_types(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}
