use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one settings-bearing entity.
///
/// Autosave keeps one single-flight slot per `EntityRef`, and settings
/// writes are routed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityRef {
    Theme {
        theme_id: String,
    },
    Section {
        template_id: String,
        section_id: String,
    },
    Block {
        template_id: String,
        section_id: String,
        block_id: String,
    },
}

impl EntityRef {
    pub fn theme(theme_id: impl Into<String>) -> Self {
        EntityRef::Theme {
            theme_id: theme_id.into(),
        }
    }

    pub fn section(template_id: impl Into<String>, section_id: impl Into<String>) -> Self {
        EntityRef::Section {
            template_id: template_id.into(),
            section_id: section_id.into(),
        }
    }

    pub fn block(
        template_id: impl Into<String>,
        section_id: impl Into<String>,
        block_id: impl Into<String>,
    ) -> Self {
        EntityRef::Block {
            template_id: template_id.into(),
            section_id: section_id.into(),
            block_id: block_id.into(),
        }
    }

    /// Template this entity lives in (`None` for theme settings)
    pub fn template_id(&self) -> Option<&str> {
        match self {
            EntityRef::Theme { .. } => None,
            EntityRef::Section { template_id, .. } | EntityRef::Block { template_id, .. } => {
                Some(template_id)
            }
        }
    }

    /// Stable string key, used to track per-entity save revisions
    pub fn key(&self) -> String {
        match self {
            EntityRef::Theme { theme_id } => format!("theme:{}", theme_id),
            EntityRef::Section { section_id, .. } => format!("section:{}", section_id),
            EntityRef::Block {
                section_id,
                block_id,
                ..
            } => format!("block:{}/{}", section_id, block_id),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.template_id() {
            Some(template_id) => write!(f, "{}@{}", self.key(), template_id),
            None => f.write_str(&self.key()),
        }
    }
}

/// Kind of thing an identifier failed to resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Theme,
    Template,
    Section,
    Block,
    Snapshot,
    SectionType,
    BlockType,
    LiveGraph,
    Operation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Theme => "Theme",
            EntityKind::Template => "Template",
            EntityKind::Section => "Section",
            EntityKind::Block => "Block",
            EntityKind::Snapshot => "Snapshot",
            EntityKind::SectionType => "Section type",
            EntityKind::BlockType => "Block type",
            EntityKind::LiveGraph => "Live graph",
            EntityKind::Operation => "Operation",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_tagged_serialization() {
        let entity = EntityRef::block("index", "faq", "faq-1");
        let json = serde_json::to_value(&entity).unwrap();

        assert_eq!(json["entity"], "block");
        assert_eq!(json["block_id"], "faq-1");

        let back: EntityRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_entity_keys_are_distinct() {
        let section = EntityRef::section("index", "hero");
        let theme = EntityRef::theme("hero");

        assert_ne!(section.key(), theme.key());
        assert_eq!(section.template_id(), Some("index"));
        assert_eq!(theme.template_id(), None);
    }
}
