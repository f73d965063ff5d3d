//! # Composition Model
//!
//! The shape shared by draft graphs, live graphs and snapshots:
//!
//! ```text
//! Composition
//!   └── Section (typed, positioned)
//!         └── Block (typed, positioned within its section)
//! ```
//!
//! Sections and blocks are stored in position order. The explicit `position`
//! field mirrors the index and is renumbered whenever the sequence changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Flat key → value bag for one section, block or theme.
///
/// Ordered so that equal bags serialize identically.
pub type Settings = BTreeMap<String, Value>;

/// Which of the two parallel graphs of a template is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphState {
    Draft,
    Live,
}

impl GraphState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphState::Draft => "draft",
            GraphState::Live => "live",
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GraphState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(GraphState::Draft),
            "live" => Ok(GraphState::Live),
            other => Err(format!("unknown graph state: {}", other)),
        }
    }
}

/// Typed sub-item owned by exactly one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub position: usize,
    #[serde(default)]
    pub settings: Settings,
}

/// Typed component instance placed within a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: String,
    pub position: usize,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Section {
    pub fn new(id: impl Into<String>, section_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            section_type: section_type.into(),
            position: 0,
            settings: Settings::new(),
            blocks: Vec::new(),
        }
    }

    pub fn find_block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == block_id)
    }

    pub fn find_block_mut(&mut self, block_id: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == block_id)
    }
}

/// One ordered section sequence (the draft or the live graph of a template)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn find_section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn find_section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == section_id)
    }

    /// Section identifiers in position order
    pub fn section_ids(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    /// Whether any section or block in the graph already uses `id`
    pub fn contains_id(&self, id: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.id == id || s.blocks.iter().any(|b| b.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_serializes_type_key() {
        let mut section = Section::new("hero-1", "hero");
        section.settings.insert("heading".to_string(), json!("Welcome"));

        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["type"], "hero");
        assert_eq!(value["settings"]["heading"], "Welcome");
        assert_eq!(value["blocks"], json!([]));
    }

    #[test]
    fn test_graph_state_parse() {
        assert_eq!("draft".parse::<GraphState>().unwrap(), GraphState::Draft);
        assert_eq!("live".parse::<GraphState>().unwrap(), GraphState::Live);
        assert!("staging".parse::<GraphState>().is_err());
    }

    #[test]
    fn test_contains_id_sees_blocks() {
        let mut section = Section::new("faq", "accordion");
        section.blocks.push(Block {
            id: "faq-item".to_string(),
            block_type: "item".to_string(),
            position: 0,
            settings: Settings::new(),
        });
        let composition = Composition {
            sections: vec![section],
        };

        assert!(composition.contains_id("faq"));
        assert!(composition.contains_id("faq-item"));
        assert!(!composition.contains_id("missing"));
    }
}
