//! # Builder Service
//!
//! Async front of the editing engine. Every mutating operation follows the
//! same path:
//!
//! ```text
//! acquire template lock ─► load record ─► apply to a copy ─► save once ─► release
//!                                                                  │
//!                                            schedule preview ◄────┘
//! ```
//!
//! A failure anywhere before the save leaves the stored record as it was; a
//! failed save (`TransportFailure`) does too, since the copy is discarded.

use crate::error::{ServiceError, ServiceResult};
use crate::locks::TemplateLocks;
use crate::preview::PreviewSynchronizer;
use crate::store::CompositionStore;
use railspress_common::{EntityKind, EntityRef, GraphState};
use railspress_editor::{
    install, DraftPatch, EditorError, LiveVersion, PatchOutcome, PreviewDecision, PublishState,
    ResolvedComposition, RollbackReceipt, SettingsTarget, SnapshotSummary, TemplateRecord,
    ThemeManifest, ThemeRecord,
};
use railspress_schema::{
    resolve_form, ContextProvider, NoContext, ResolvedField, SchemaRegistry, SettingsOutcome,
    SettingsWrite,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of installing a theme manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReport {
    pub theme_id: String,
    pub created: Vec<String>,
    /// Templates that already existed and were left untouched
    pub skipped: Vec<String>,
}

/// Result of a settings write on any entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsReply {
    pub entity: EntityRef,
    pub stale: bool,
    pub outcome: SettingsOutcome,
    /// Draft revision after the write; absent for theme settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Highest client revision stored for the entity, this write included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_revision: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub theme_id: String,
    pub draft_revision: u64,
    pub publish_state: PublishState,
}

pub struct BuilderService {
    registry: Arc<SchemaRegistry>,
    context: Option<Arc<dyn ContextProvider>>,
    store: Arc<dyn CompositionStore>,
    locks: TemplateLocks,
    theme_locks: TemplateLocks,
    preview: Option<PreviewSynchronizer>,
}

impl BuilderService {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn CompositionStore>, lock_wait: Duration) -> Self {
        Self {
            registry,
            context: None,
            store,
            locks: TemplateLocks::new(lock_wait),
            theme_locks: TemplateLocks::new(lock_wait),
            preview: None,
        }
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_preview(mut self, preview: PreviewSynchronizer) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn preview(&self) -> Option<&PreviewSynchronizer> {
        self.preview.as_ref()
    }

    fn context(&self) -> Option<&dyn ContextProvider> {
        self.context.as_deref()
    }

    async fn load(&self, template_id: &str) -> ServiceResult<TemplateRecord> {
        self.store
            .load_template(template_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Template, template_id))
    }

    /// Run `f` against a copy of the template under its lock and persist the
    /// copy when it changed
    async fn modify<T, F>(&self, template_id: &str, f: F) -> ServiceResult<(T, TemplateRecord)>
    where
        F: FnOnce(&mut TemplateRecord, &SchemaRegistry, Option<&dyn ContextProvider>) -> Result<T, EditorError>,
    {
        let _guard = self.locks.acquire(template_id).await?;
        let stored = self.load(template_id).await?;

        let mut working = stored.clone();
        let value = f(&mut working, &self.registry, self.context())?;

        if working != stored {
            if let Err(e) = self.store.save_template(&working).await {
                tracing::warn!(template_id = %template_id, error = %e, "Failed to persist template");
                return Err(e.into());
            }
        }
        Ok((value, working))
    }

    /// Background preview for the graph a mutation touched
    async fn refresh_preview(&self, record: &TemplateRecord, state: GraphState) {
        if self.preview.is_none() || record.graph(state).is_none() {
            return;
        }
        match self.store.load_theme(&record.theme_id).await {
            Ok(theme) => self.render_preview(record, state, theme.as_ref()).await,
            Err(e) => tracing::warn!(template_id = %record.id, error = %e, "Skipping preview refresh"),
        }
    }

    /// Re-render every graph of every template using `theme`
    async fn refresh_theme_previews(&self, theme: &ThemeRecord) {
        if self.preview.is_none() {
            return;
        }
        let ids = match self.store.list_templates().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(theme_id = %theme.id, error = %e, "Skipping preview refresh");
                return;
            }
        };
        for id in ids {
            match self.store.load_template(&id).await {
                Ok(Some(record)) if record.theme_id == theme.id => {
                    for state in [GraphState::Draft, GraphState::Live] {
                        if record.graph(state).is_some() {
                            self.render_preview(&record, state, Some(theme)).await;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(template_id = %id, error = %e, "Skipping preview refresh"),
            }
        }
    }

    async fn render_preview(&self, record: &TemplateRecord, state: GraphState, theme: Option<&ThemeRecord>) {
        let Some(preview) = &self.preview else {
            return;
        };
        match record.current_state(state, &self.registry, theme) {
            Ok(page) => {
                preview.request(page).await;
            }
            Err(e) => tracing::warn!(template_id = %record.id, error = %e, "Skipping preview refresh"),
        }
    }

    /// Create the theme record and every preset template that does not exist yet
    pub async fn install_theme(&self, manifest: &ThemeManifest) -> ServiceResult<InstallReport> {
        let (theme, templates) = install(manifest, &self.registry)?;

        {
            let _guard = self.theme_locks.acquire(&theme.id).await?;
            if self.store.load_theme(&theme.id).await?.is_none() {
                self.store.save_theme(&theme).await?;
            }
        }

        let mut report = InstallReport {
            theme_id: theme.id.clone(),
            created: Vec::new(),
            skipped: Vec::new(),
        };
        for template in templates {
            let _guard = self.locks.acquire(&template.id).await?;
            if self.store.load_template(&template.id).await?.is_some() {
                report.skipped.push(template.id);
                continue;
            }
            self.store.save_template(&template).await?;
            report.created.push(template.id);
        }

        tracing::info!(
            theme_id = %report.theme_id,
            created = report.created.len(),
            skipped = report.skipped.len(),
            "Installed theme"
        );
        Ok(report)
    }

    pub async fn mutate_draft(&self, template_id: &str, patch: &DraftPatch) -> ServiceResult<PatchOutcome> {
        let (outcome, record) = self
            .modify(template_id, |record, registry, context| {
                record.mutate_draft(patch, registry, context)
            })
            .await?;
        if outcome.changed {
            self.refresh_preview(&record, GraphState::Draft).await;
        }
        Ok(outcome)
    }

    pub async fn reorder(&self, template_id: &str, state: GraphState, order: Vec<String>) -> ServiceResult<PatchOutcome> {
        let (outcome, record) = self
            .modify(template_id, |record, registry, _| record.reorder(state, order, registry))
            .await?;
        if outcome.changed {
            self.refresh_preview(&record, GraphState::Draft).await;
        }
        Ok(outcome)
    }

    pub async fn apply_settings(
        &self,
        entity: &EntityRef,
        write: SettingsWrite,
        client_revision: Option<u64>,
    ) -> ServiceResult<SettingsReply> {
        let (template_id, target) = match entity {
            EntityRef::Theme { theme_id } => {
                return self.apply_theme_settings(theme_id, write, client_revision).await;
            }
            EntityRef::Section {
                template_id,
                section_id,
            } => (
                template_id,
                SettingsTarget::Section {
                    section_id: section_id.clone(),
                },
            ),
            EntityRef::Block {
                template_id,
                section_id,
                block_id,
            } => (
                template_id,
                SettingsTarget::Block {
                    section_id: section_id.clone(),
                    block_id: block_id.clone(),
                },
            ),
        };

        let (outcome, record) = self
            .modify(template_id, |record, registry, context| {
                record.apply_settings(target.clone(), write, client_revision, registry, context)
            })
            .await?;
        if outcome.changed {
            self.refresh_preview(&record, GraphState::Draft).await;
        }

        Ok(SettingsReply {
            entity: entity.clone(),
            stale: outcome.stale,
            outcome: outcome.settings.unwrap_or_default(),
            revision: Some(record.draft_revision()),
            client_revision: record.settings_revision(&target),
        })
    }

    async fn apply_theme_settings(
        &self,
        theme_id: &str,
        write: SettingsWrite,
        client_revision: Option<u64>,
    ) -> ServiceResult<SettingsReply> {
        let (result, working) = {
            let _guard = self.theme_locks.acquire(theme_id).await?;
            let stored = self
                .store
                .load_theme(theme_id)
                .await?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Theme, theme_id))?;

            let mut working: ThemeRecord = stored.clone();
            let result = working.apply_settings(&write, client_revision, &self.registry, self.context())?;
            if working != stored {
                self.store.save_theme(&working).await?;
            }
            (result, working)
        };

        if result.settings.changed {
            self.refresh_theme_previews(&working).await;
        }

        Ok(SettingsReply {
            entity: EntityRef::theme(theme_id),
            stale: result.stale,
            outcome: result.settings,
            revision: None,
            client_revision: working.last_client_revision(),
        })
    }

    pub async fn publish(&self, template_id: &str, actor: &str) -> ServiceResult<LiveVersion> {
        let (marker, record) = self
            .modify(template_id, |record, registry, _| record.publish(actor, registry))
            .await?;
        self.refresh_preview(&record, GraphState::Live).await;
        Ok(marker)
    }

    pub async fn snapshot(
        &self,
        template_id: &str,
        state: GraphState,
        label: Option<String>,
        actor: &str,
    ) -> ServiceResult<SnapshotSummary> {
        let (id, record) = self
            .modify(template_id, |record, _, _| Ok(record.snapshot(state, label, actor)))
            .await?;
        record
            .snapshot_log()
            .get(&id)
            .map(SnapshotSummary::from)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Snapshot, id))
    }

    pub async fn list_snapshots(&self, template_id: &str) -> ServiceResult<Vec<SnapshotSummary>> {
        Ok(self.load(template_id).await?.list_snapshots())
    }

    pub async fn rollback(
        &self,
        template_id: &str,
        snapshot_id: &str,
        target: GraphState,
        actor: &str,
    ) -> ServiceResult<RollbackReceipt> {
        let (receipt, record) = self
            .modify(template_id, |record, _, _| record.rollback(snapshot_id, target, actor))
            .await?;
        self.refresh_preview(&record, target).await;
        Ok(receipt)
    }

    /// Form description for one entity's settings, options resolved from
    /// the current context data
    pub async fn resolve_form(&self, entity: &EntityRef) -> ServiceResult<Vec<ResolvedField>> {
        let context: &dyn ContextProvider = match &self.context {
            Some(context) => context.as_ref(),
            None => &NoContext,
        };

        match entity {
            EntityRef::Theme { theme_id } => {
                let theme = self
                    .store
                    .load_theme(theme_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Theme, theme_id))?;
                Ok(resolve_form(self.registry.theme(), &theme.settings, context))
            }
            EntityRef::Section {
                template_id,
                section_id,
            } => {
                let record = self.load(template_id).await?;
                let section = record
                    .draft()
                    .find_section(section_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Section, section_id))?;
                let schema = self
                    .registry
                    .section(&section.section_type)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::SectionType, &section.section_type))?;
                Ok(resolve_form(schema, &section.settings, context))
            }
            EntityRef::Block {
                template_id,
                section_id,
                block_id,
            } => {
                let record = self.load(template_id).await?;
                let block = record
                    .draft()
                    .find_section(section_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Section, section_id))?
                    .find_block(block_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Block, block_id))?;
                let schema = self
                    .registry
                    .block(&block.block_type)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::BlockType, &block.block_type))?;
                Ok(resolve_form(schema, &block.settings, context))
            }
        }
    }

    pub async fn current_state(&self, template_id: &str, state: GraphState) -> ServiceResult<ResolvedComposition> {
        let record = self.load(template_id).await?;
        let theme = self.store.load_theme(&record.theme_id).await?;
        Ok(record.current_state(state, &self.registry, theme.as_ref())?)
    }

    /// Fire-and-forget render of the current graph; returns the ledger's decision
    pub async fn request_preview(&self, template_id: &str, state: GraphState) -> ServiceResult<PreviewDecision> {
        let preview = self
            .preview
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidRequest("preview rendering is disabled".into()))?;
        let page = self.current_state(template_id, state).await?;
        Ok(preview.request(page).await)
    }

    pub async fn list_templates(&self) -> ServiceResult<Vec<TemplateSummary>> {
        let mut summaries = Vec::new();
        for id in self.store.list_templates().await? {
            if let Some(record) = self.store.load_template(&id).await? {
                summaries.push(TemplateSummary {
                    draft_revision: record.draft_revision(),
                    publish_state: record.publish_state(),
                    theme_id: record.theme_id,
                    id: record.id,
                });
            }
        }
        Ok(summaries)
    }
}
