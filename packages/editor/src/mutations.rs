//! # Draft Patches
//!
//! Structural and settings edits to a draft graph. Every patch is validated
//! against the current graph and the schema registry before it is applied,
//! and applying happens on the caller's working copy: a patch that fails
//! leaves no partial change behind once the caller discards that copy.
//!
//! ### Reorder
//! - Complete desired order, deduplicated first occurrence wins
//! - Fails closed on any identifier set mismatch
//!
//! ### SetSettings
//! - Partial or full replace, optionally strict (all-or-nothing)
//! - Carries an optional client revision; a write older than the last
//!   applied one for the same entity is ignored

use crate::errors::EditorError;
use crate::ordering::{insert_at, remove_by_id, reorder};
use railspress_common::{
    Block, Composition, EntityKind, EntityRef, IdGenerator, Section, Settings,
};
use railspress_schema::{
    apply_settings, ContextProvider, Schema, SchemaRegistry, SettingsOutcome, SettingsWrite,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity within one template whose settings are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SettingsTarget {
    Section { section_id: String },
    Block { section_id: String, block_id: String },
}

impl SettingsTarget {
    pub fn entity(&self, template_id: &str) -> EntityRef {
        match self {
            SettingsTarget::Section { section_id } => EntityRef::section(template_id, section_id),
            SettingsTarget::Block {
                section_id,
                block_id,
            } => EntityRef::block(template_id, section_id, block_id),
        }
    }

    pub(crate) fn key(&self) -> String {
        self.entity("").key()
    }
}

/// Draft edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DraftPatch {
    AddSection {
        section_type: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        settings: Settings,
        /// Explicit identifier; generated when absent
        #[serde(default)]
        section_id: Option<String>,
    },

    RemoveSection {
        section_id: String,
    },

    /// Copy a section and its blocks under fresh identifiers, right after it
    DuplicateSection {
        section_id: String,
    },

    ReorderSections {
        order: Vec<String>,
    },

    AddBlock {
        section_id: String,
        block_type: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        settings: Settings,
        #[serde(default)]
        block_id: Option<String>,
    },

    RemoveBlock {
        section_id: String,
        block_id: String,
    },

    ReorderBlocks {
        section_id: String,
        order: Vec<String>,
    },

    SetSettings {
        target: SettingsTarget,
        values: Settings,
        #[serde(default)]
        strict: bool,
        #[serde(default)]
        replace: bool,
        #[serde(default)]
        client_revision: Option<u64>,
    },
}

/// What applying a patch did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOutcome {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_duplicates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsOutcome>,
    /// The write carried an outdated client revision and was ignored
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

/// Everything a patch may consult or advance besides the graph itself
pub struct PatchContext<'a> {
    pub registry: &'a SchemaRegistry,
    pub context: Option<&'a dyn ContextProvider>,
    pub ids: &'a mut IdGenerator,
    /// Last applied client revision per settings entity key
    pub revisions: &'a mut BTreeMap<String, u64>,
}

impl DraftPatch {
    pub fn name(&self) -> &'static str {
        match self {
            DraftPatch::AddSection { .. } => "add_section",
            DraftPatch::RemoveSection { .. } => "remove_section",
            DraftPatch::DuplicateSection { .. } => "duplicate_section",
            DraftPatch::ReorderSections { .. } => "reorder_sections",
            DraftPatch::AddBlock { .. } => "add_block",
            DraftPatch::RemoveBlock { .. } => "remove_block",
            DraftPatch::ReorderBlocks { .. } => "reorder_blocks",
            DraftPatch::SetSettings { .. } => "set_settings",
        }
    }

    /// Apply to `draft` with validation
    pub fn apply(
        &self,
        draft: &mut Composition,
        cx: &mut PatchContext<'_>,
    ) -> Result<PatchOutcome, EditorError> {
        self.validate(draft, cx.registry)?;

        match self {
            DraftPatch::AddSection {
                section_type,
                index,
                settings,
                section_id,
            } => {
                let id = match section_id {
                    Some(id) => id.clone(),
                    None => fresh_id(draft, cx.ids, section_type),
                };
                let schema = section_schema(cx.registry, section_type)?;
                let mut section = Section::new(id.clone(), section_type.clone());
                section.settings = initial_settings(schema, settings, cx.context)?;
                insert_at(&mut draft.sections, *index, section);
                Ok(PatchOutcome::created(id))
            }

            DraftPatch::RemoveSection { section_id } => {
                remove_by_id(&mut draft.sections, section_id)
                    .ok_or_else(|| EditorError::not_found(EntityKind::Section, section_id))?;
                Ok(PatchOutcome::changed())
            }

            DraftPatch::DuplicateSection { section_id } => {
                let (at, original) = draft
                    .sections
                    .iter()
                    .enumerate()
                    .find(|(_, s)| &s.id == section_id)
                    .map(|(i, s)| (i, s.clone()))
                    .ok_or_else(|| EditorError::not_found(EntityKind::Section, section_id))?;

                let mut copy = original;
                copy.id = fresh_id(draft, cx.ids, &copy.section_type);
                for block in &mut copy.blocks {
                    block.id = fresh_id(draft, cx.ids, &block.block_type);
                }
                let id = copy.id.clone();
                insert_at(&mut draft.sections, Some(at + 1), copy);
                Ok(PatchOutcome::created(id))
            }

            DraftPatch::ReorderSections { order } => {
                let outcome = reorder("sections", &mut draft.sections, order)?;
                Ok(PatchOutcome {
                    changed: outcome.changed,
                    dropped_duplicates: outcome.dropped_duplicates,
                    ..PatchOutcome::default()
                })
            }

            DraftPatch::AddBlock {
                section_id,
                block_type,
                index,
                settings,
                block_id,
            } => {
                let schema = block_schema(cx.registry, block_type)?;
                let block_settings = initial_settings(schema, settings, cx.context)?;
                let id = match block_id {
                    Some(id) => id.clone(),
                    None => fresh_id(draft, cx.ids, block_type),
                };
                let section = find_section(draft, section_id)?;
                let block = Block {
                    id: id.clone(),
                    block_type: block_type.clone(),
                    position: 0,
                    settings: block_settings,
                };
                insert_at(&mut section.blocks, *index, block);
                Ok(PatchOutcome::created(id))
            }

            DraftPatch::RemoveBlock {
                section_id,
                block_id,
            } => {
                let section = find_section(draft, section_id)?;
                remove_by_id(&mut section.blocks, block_id)
                    .ok_or_else(|| EditorError::not_found(EntityKind::Block, block_id))?;
                Ok(PatchOutcome::changed())
            }

            DraftPatch::ReorderBlocks { section_id, order } => {
                let section = find_section(draft, section_id)?;
                let outcome = reorder(section_id, &mut section.blocks, order)?;
                Ok(PatchOutcome {
                    changed: outcome.changed,
                    dropped_duplicates: outcome.dropped_duplicates,
                    ..PatchOutcome::default()
                })
            }

            DraftPatch::SetSettings {
                target,
                values,
                strict,
                replace,
                client_revision,
            } => {
                let key = target.key();
                if let (Some(revision), Some(&last)) = (client_revision, cx.revisions.get(&key)) {
                    if *revision < last {
                        tracing::debug!(
                            entity = %key,
                            revision = *revision,
                            last_applied = last,
                            "Ignoring stale settings write"
                        );
                        return Ok(PatchOutcome {
                            stale: true,
                            ..PatchOutcome::default()
                        });
                    }
                }

                let write = SettingsWrite {
                    values: values.clone(),
                    strict: *strict,
                    replace: *replace,
                };
                let (schema, stored) = settings_slot(draft, cx.registry, target)?;
                let outcome = apply_settings(schema, stored, &write, cx.context);
                if write.strict && outcome.has_errors() {
                    return Err(EditorError::Validation(outcome.errors));
                }

                if let Some(revision) = client_revision {
                    cx.revisions.insert(key, *revision);
                }
                Ok(PatchOutcome {
                    changed: outcome.changed,
                    settings: Some(outcome),
                    ..PatchOutcome::default()
                })
            }
        }
    }

    /// Validate against the current graph (without applying)
    pub fn validate(&self, draft: &Composition, registry: &SchemaRegistry) -> Result<(), EditorError> {
        match self {
            DraftPatch::AddSection {
                section_type,
                section_id,
                ..
            } => {
                section_schema(registry, section_type)?;
                if let Some(id) = section_id {
                    check_new_id(draft, id)?;
                }
            }

            DraftPatch::RemoveSection { section_id }
            | DraftPatch::DuplicateSection { section_id }
            | DraftPatch::ReorderBlocks { section_id, .. } => {
                require_section(draft, section_id)?;
            }

            DraftPatch::ReorderSections { order } => {
                if order.iter().any(|id| id.is_empty()) {
                    return Err(EditorError::InvalidStructure(
                        "Reorder payload contains an empty identifier".to_string(),
                    ));
                }
            }

            DraftPatch::AddBlock {
                section_id,
                block_type,
                block_id,
                ..
            } => {
                let section = require_section(draft, section_id)?;
                let schema = section_schema(registry, &section.section_type)?;
                block_schema(registry, block_type)?;

                if !schema.allows_block(block_type) {
                    return Err(EditorError::InvalidStructure(format!(
                        "Section type {} does not allow block type {}",
                        section.section_type, block_type
                    )));
                }
                if let Some(max) = schema.max_blocks {
                    if section.blocks.len() >= max {
                        return Err(EditorError::InvalidStructure(format!(
                            "Section {} already holds the maximum of {} blocks",
                            section_id, max
                        )));
                    }
                }
                if let Some(id) = block_id {
                    check_new_id(draft, id)?;
                }
            }

            DraftPatch::RemoveBlock {
                section_id,
                block_id,
            } => {
                let section = require_section(draft, section_id)?;
                if section.find_block(block_id).is_none() {
                    return Err(EditorError::not_found(EntityKind::Block, block_id));
                }
            }

            DraftPatch::SetSettings { target, .. } => match target {
                SettingsTarget::Section { section_id } => {
                    let section = require_section(draft, section_id)?;
                    section_schema(registry, &section.section_type)?;
                }
                SettingsTarget::Block {
                    section_id,
                    block_id,
                } => {
                    let section = require_section(draft, section_id)?;
                    let block = section
                        .find_block(block_id)
                        .ok_or_else(|| EditorError::not_found(EntityKind::Block, block_id))?;
                    block_schema(registry, &block.block_type)?;
                }
            },
        }

        Ok(())
    }
}

impl PatchOutcome {
    fn changed() -> Self {
        Self {
            changed: true,
            ..Self::default()
        }
    }

    fn created(id: String) -> Self {
        Self {
            changed: true,
            created_id: Some(id),
            ..Self::default()
        }
    }
}

fn section_schema<'r>(registry: &'r SchemaRegistry, section_type: &str) -> Result<&'r Schema, EditorError> {
    registry
        .section(section_type)
        .ok_or_else(|| EditorError::not_found(EntityKind::SectionType, section_type))
}

fn block_schema<'r>(registry: &'r SchemaRegistry, block_type: &str) -> Result<&'r Schema, EditorError> {
    registry
        .block(block_type)
        .ok_or_else(|| EditorError::not_found(EntityKind::BlockType, block_type))
}

fn require_section<'c>(draft: &'c Composition, section_id: &str) -> Result<&'c Section, EditorError> {
    draft
        .find_section(section_id)
        .ok_or_else(|| EditorError::not_found(EntityKind::Section, section_id))
}

fn find_section<'c>(draft: &'c mut Composition, section_id: &str) -> Result<&'c mut Section, EditorError> {
    draft
        .find_section_mut(section_id)
        .ok_or_else(|| EditorError::not_found(EntityKind::Section, section_id))
}

fn check_new_id(draft: &Composition, id: &str) -> Result<(), EditorError> {
    if id.is_empty() {
        return Err(EditorError::InvalidStructure("Identifier must not be empty".to_string()));
    }
    if draft.contains_id(id) {
        return Err(EditorError::InvalidStructure(format!(
            "Identifier {} is already in use",
            id
        )));
    }
    Ok(())
}

/// Next generated id not already taken by an explicitly named entity
fn fresh_id(draft: &Composition, ids: &mut IdGenerator, prefix: &str) -> String {
    loop {
        let id = ids.new_id(prefix);
        if !draft.contains_id(&id) {
            return id;
        }
    }
}

/// Initial settings of a new section or block must be entirely valid
fn initial_settings(
    schema: &Schema,
    values: &Settings,
    context: Option<&dyn ContextProvider>,
) -> Result<Settings, EditorError> {
    let mut stored = Settings::new();
    if values.is_empty() {
        return Ok(stored);
    }
    let outcome = apply_settings(
        schema,
        &mut stored,
        &SettingsWrite::partial(values.clone()).strict(),
        context,
    );
    if outcome.has_errors() {
        return Err(EditorError::Validation(outcome.errors));
    }
    Ok(stored)
}

fn settings_slot<'c, 'r>(
    draft: &'c mut Composition,
    registry: &'r SchemaRegistry,
    target: &SettingsTarget,
) -> Result<(&'r Schema, &'c mut Settings), EditorError> {
    match target {
        SettingsTarget::Section { section_id } => {
            let section = find_section(draft, section_id)?;
            let schema = section_schema(registry, &section.section_type)?;
            Ok((schema, &mut section.settings))
        }
        SettingsTarget::Block {
            section_id,
            block_id,
        } => {
            let block = find_section(draft, section_id)?
                .find_block_mut(block_id)
                .ok_or_else(|| EditorError::not_found(EntityKind::Block, block_id))?;
            let schema = block_schema(registry, &block.block_type)?;
            Ok((schema, &mut block.settings))
        }
    }
}
