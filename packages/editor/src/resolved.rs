//! Render-ready view of one graph: every settings bag resolved against its
//! schema (defaults overlaid with stored overrides).

use crate::preview::PreviewVersion;
use railspress_common::{Composition, GraphState, Settings};
use railspress_schema::{resolve_settings, SchemaRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub position: usize,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSection {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: String,
    pub position: usize,
    pub settings: Settings,
    pub blocks: Vec<ResolvedBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComposition {
    pub template_id: String,
    pub theme_id: String,
    pub state: GraphState,
    /// Draft revision or live version the view was built from
    pub revision: u64,
    #[serde(default)]
    pub theme_revision: u64,
    pub theme_settings: Settings,
    pub sections: Vec<ResolvedSection>,
}

impl ResolvedComposition {
    pub fn version(&self) -> PreviewVersion {
        PreviewVersion::new(self.revision, self.theme_revision)
    }

    pub fn section_ids(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Resolve every section and block of `composition`.
///
/// Entities whose type is no longer registered keep their stored settings
/// as-is so the graph is still inspectable.
pub fn resolve_sections(composition: &Composition, registry: &SchemaRegistry) -> Vec<ResolvedSection> {
    composition
        .sections
        .iter()
        .map(|section| {
            let settings = match registry.section(&section.section_type) {
                Some(schema) => resolve_settings(schema, &section.settings),
                None => {
                    tracing::warn!(
                        section = %section.id,
                        section_type = %section.section_type,
                        "Resolving section of unregistered type"
                    );
                    section.settings.clone()
                }
            };

            let blocks = section
                .blocks
                .iter()
                .map(|block| ResolvedBlock {
                    id: block.id.clone(),
                    block_type: block.block_type.clone(),
                    position: block.position,
                    settings: registry
                        .block(&block.block_type)
                        .map(|schema| resolve_settings(schema, &block.settings))
                        .unwrap_or_else(|| block.settings.clone()),
                })
                .collect();

            ResolvedSection {
                id: section.id.clone(),
                section_type: section.section_type.clone(),
                position: section.position,
                settings,
                blocks,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use railspress_common::{Block, Section};
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_overrides() {
        let registry = SchemaRegistry::from_value(json!({
            "sections": [ { "type": "faq", "blocks": ["faq_item"], "settings": [
                { "key": "title", "type": "text", "default": "FAQ" }
            ] } ],
            "blocks": [ { "type": "faq_item", "settings": [
                { "key": "open", "type": "checkbox", "default": true }
            ] } ]
        }))
        .unwrap();

        let mut faq = Section::new("faq", "faq");
        faq.blocks.push(Block {
            id: "q1".into(),
            block_type: "faq_item".into(),
            position: 0,
            settings: Settings::from([("open".to_string(), json!(false))]),
        });
        let mut legacy = Section::new("old", "marquee");
        legacy.position = 1;
        legacy.settings.insert("speed".into(), json!(3));

        let resolved = resolve_sections(
            &Composition {
                sections: vec![faq, legacy],
            },
            &registry,
        );

        assert_eq!(resolved[0].settings["title"], json!("FAQ"));
        assert_eq!(resolved[0].blocks[0].settings["open"], json!(false));
        assert_eq!(resolved[1].settings["speed"], json!(3));
    }
}
