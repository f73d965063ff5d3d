//! Themes: the theme-wide settings bag and installation from a manifest.
//!
//! A manifest names the theme, its initial settings and one preset per
//! template. Installing builds each template through ordinary draft patches
//! so presets obey exactly the same rules as interactive edits.

use crate::errors::EditorError;
use crate::mutations::DraftPatch;
use crate::template::TemplateRecord;
use railspress_common::Settings;
use railspress_schema::{apply_settings, ContextProvider, SchemaRegistry, SettingsOutcome, SettingsWrite};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPreset {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPreset {
    #[serde(rename = "type")]
    pub section_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub blocks: Vec<BlockPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePreset {
    pub id: String,
    #[serde(default)]
    pub sections: Vec<SectionPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeManifest {
    pub theme_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub templates: Vec<TemplatePreset>,
}

/// Theme-wide settings; a single bag per theme, not split into draft/live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeRecord {
    pub id: String,
    pub name: String,
    pub settings: Settings,
    #[serde(default)]
    last_client_revision: Option<u64>,
    /// Bumped whenever the stored settings change
    #[serde(default)]
    settings_revision: u64,
}

/// Result of a theme settings write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSettingsOutcome {
    pub stale: bool,
    pub settings: SettingsOutcome,
}

impl ThemeRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            settings: Settings::new(),
            last_client_revision: None,
            settings_revision: 0,
        }
    }

    pub fn settings_revision(&self) -> u64 {
        self.settings_revision
    }

    /// Highest client revision applied so far
    pub fn last_client_revision(&self) -> Option<u64> {
        self.last_client_revision
    }

    pub fn apply_settings(
        &mut self,
        write: &SettingsWrite,
        client_revision: Option<u64>,
        registry: &SchemaRegistry,
        context: Option<&dyn ContextProvider>,
    ) -> Result<ThemeSettingsOutcome, EditorError> {
        if let (Some(revision), Some(last)) = (client_revision, self.last_client_revision) {
            if revision < last {
                tracing::debug!(theme_id = %self.id, revision, last_applied = last, "Ignoring stale theme settings write");
                return Ok(ThemeSettingsOutcome {
                    stale: true,
                    settings: SettingsOutcome::default(),
                });
            }
        }

        let mut stored = self.settings.clone();
        let outcome = apply_settings(registry.theme(), &mut stored, write, context);
        if write.strict && outcome.has_errors() {
            return Err(EditorError::Validation(outcome.errors));
        }

        self.settings = stored;
        if outcome.changed {
            self.settings_revision += 1;
        }
        if client_revision.is_some() {
            self.last_client_revision = client_revision;
        }
        Ok(ThemeSettingsOutcome {
            stale: false,
            settings: outcome,
        })
    }
}

/// Build the theme record and every preset template of `manifest`.
///
/// Nothing is returned unless every preset is valid.
pub fn install(
    manifest: &ThemeManifest,
    registry: &SchemaRegistry,
) -> Result<(ThemeRecord, Vec<TemplateRecord>), EditorError> {
    let name = if manifest.name.is_empty() {
        manifest.theme_id.clone()
    } else {
        manifest.name.clone()
    };
    let mut theme = ThemeRecord::new(&manifest.theme_id, name);
    theme.apply_settings(
        &SettingsWrite::partial(manifest.settings.clone()).strict(),
        None,
        registry,
        None,
    )?;

    let mut templates = Vec::with_capacity(manifest.templates.len());
    for preset in &manifest.templates {
        templates.push(build_template(&manifest.theme_id, preset, registry)?);
    }

    tracing::info!(
        theme_id = %manifest.theme_id,
        templates = templates.len(),
        "Built theme from manifest"
    );
    Ok((theme, templates))
}

fn build_template(
    theme_id: &str,
    preset: &TemplatePreset,
    registry: &SchemaRegistry,
) -> Result<TemplateRecord, EditorError> {
    let mut record = TemplateRecord::new(&preset.id, theme_id);

    for section in &preset.sections {
        let added = record.mutate_draft(
            &DraftPatch::AddSection {
                section_type: section.section_type.clone(),
                index: None,
                settings: section.settings.clone(),
                section_id: section.id.clone(),
            },
            registry,
            None,
        )?;
        let Some(section_id) = added.created_id else {
            continue;
        };

        for block in &section.blocks {
            record.mutate_draft(
                &DraftPatch::AddBlock {
                    section_id: section_id.clone(),
                    block_type: block.block_type.clone(),
                    index: None,
                    settings: block.settings.clone(),
                    block_id: block.id.clone(),
                },
                registry,
                None,
            )?;
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use railspress_common::Classify;
    use railspress_common::ErrorKind;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_value(json!({
            "theme": { "settings": [ { "key": "accent", "type": "color", "default": "#000000" } ] },
            "sections": [
                { "type": "faq", "blocks": ["faq_item"], "settings": [ { "key": "title", "type": "text" } ] }
            ],
            "blocks": [ { "type": "faq_item", "settings": [ { "key": "question", "type": "text" } ] } ]
        }))
        .unwrap()
    }

    fn manifest() -> ThemeManifest {
        serde_json::from_value(json!({
            "theme_id": "dawn",
            "name": "Dawn",
            "settings": { "accent": "#ff0000" },
            "templates": [
                { "id": "index", "sections": [
                    { "type": "faq", "id": "faq", "settings": { "title": "Help" },
                      "blocks": [ { "type": "faq_item", "settings": { "question": "Why?" } },
                                  { "type": "faq_item" } ] }
                ] },
                { "id": "single-post" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_install_builds_presets() {
        let (theme, templates) = install(&manifest(), &registry()).unwrap();

        assert_eq!(theme.name, "Dawn");
        assert_eq!(theme.settings["accent"], json!("#ff0000"));
        assert_eq!(templates.len(), 2);

        let index = &templates[0];
        assert_eq!(index.theme_id, "dawn");
        let faq = index.draft().find_section("faq").unwrap();
        assert_eq!(faq.settings["title"], json!("Help"));
        assert_eq!(faq.blocks.len(), 2);
        assert_eq!(faq.blocks[1].position, 1);
        assert!(index.live().is_none());
        assert!(templates[1].draft().is_empty());
    }

    #[test]
    fn test_install_rejects_invalid_preset() {
        let mut manifest = manifest();
        manifest.templates[0].sections[0].section_type = "gallery".into();

        let err = install(&manifest, &registry()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_theme_settings_stale_write() {
        let registry = registry();
        let mut theme = ThemeRecord::new("dawn", "Dawn");
        let write = |accent: &str| SettingsWrite::replace(Settings::from([("accent".to_string(), json!(accent))]));

        theme.apply_settings(&write("#111111"), Some(4), &registry, None).unwrap();
        let stale = theme.apply_settings(&write("#222222"), Some(3), &registry, None).unwrap();

        assert!(stale.stale);
        assert_eq!(theme.settings["accent"], json!("#111111"));
        assert_eq!(theme.last_client_revision(), Some(4));
    }

    #[test]
    fn test_settings_revision_counts_changes() {
        let registry = registry();
        let mut theme = ThemeRecord::new("dawn", "Dawn");
        let write = |accent: &str| SettingsWrite::replace(Settings::from([("accent".to_string(), json!(accent))]));

        theme.apply_settings(&write("#111111"), None, &registry, None).unwrap();
        theme.apply_settings(&write("#111111"), None, &registry, None).unwrap();
        assert_eq!(theme.settings_revision(), 1);

        theme.apply_settings(&write("#222222"), None, &registry, None).unwrap();
        assert_eq!(theme.settings_revision(), 2);
    }
}
