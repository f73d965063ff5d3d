//! Named operations exposed to transports.
//!
//! Operations form a closed set. A transport hands over a name and a JSON
//! argument object; the name must appear in [`OPERATIONS`] and the arguments
//! must decode into that variant, otherwise nothing runs.

use crate::error::{ServiceError, ServiceResult};
use crate::service::BuilderService;
use railspress_common::{EntityKind, EntityRef, GraphState, Settings};
use railspress_editor::{DraftPatch, ThemeManifest};
use railspress_schema::SettingsWrite;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every operation name a transport may call
pub const OPERATIONS: &[&str] = &[
    "install_theme",
    "mutate_draft",
    "reorder",
    "apply_settings",
    "publish",
    "snapshot",
    "list_snapshots",
    "rollback",
    "resolve_form",
    "current_state",
    "request_preview",
    "list_templates",
];

fn default_actor() -> String {
    "operator".to_string()
}

fn draft() -> GraphState {
    GraphState::Draft
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Operation {
    InstallTheme {
        manifest: ThemeManifest,
    },
    MutateDraft {
        template_id: String,
        patch: DraftPatch,
    },
    Reorder {
        template_id: String,
        #[serde(default = "draft")]
        state: GraphState,
        order: Vec<String>,
    },
    ApplySettings {
        entity: EntityRef,
        values: Settings,
        #[serde(default)]
        strict: bool,
        #[serde(default)]
        replace: bool,
        #[serde(default)]
        client_revision: Option<u64>,
    },
    Publish {
        template_id: String,
        #[serde(default = "default_actor")]
        actor: String,
    },
    Snapshot {
        template_id: String,
        state: GraphState,
        #[serde(default)]
        label: Option<String>,
        #[serde(default = "default_actor")]
        actor: String,
    },
    ListSnapshots {
        template_id: String,
    },
    Rollback {
        template_id: String,
        snapshot_id: String,
        target: GraphState,
        #[serde(default = "default_actor")]
        actor: String,
    },
    ResolveForm {
        entity: EntityRef,
    },
    CurrentState {
        template_id: String,
        #[serde(default = "draft")]
        state: GraphState,
    },
    RequestPreview {
        template_id: String,
        #[serde(default = "draft")]
        state: GraphState,
    },
    ListTemplates {},
}

impl Operation {
    /// Decode a named call; unknown names are `NotFound`, bad arguments are
    /// rejected before anything runs
    pub fn from_parts(name: &str, args: Value) -> ServiceResult<Self> {
        if !OPERATIONS.iter().any(|known| *known == name) {
            return Err(ServiceError::not_found(EntityKind::Operation, name));
        }
        let args = match args {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({ "op": name, "args": args }))
            .map_err(|e| ServiceError::InvalidRequest(format!("{}: {}", name, e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::InstallTheme { .. } => "install_theme",
            Operation::MutateDraft { .. } => "mutate_draft",
            Operation::Reorder { .. } => "reorder",
            Operation::ApplySettings { .. } => "apply_settings",
            Operation::Publish { .. } => "publish",
            Operation::Snapshot { .. } => "snapshot",
            Operation::ListSnapshots { .. } => "list_snapshots",
            Operation::Rollback { .. } => "rollback",
            Operation::ResolveForm { .. } => "resolve_form",
            Operation::CurrentState { .. } => "current_state",
            Operation::RequestPreview { .. } => "request_preview",
            Operation::ListTemplates {} => "list_templates",
        }
    }
}

/// Run one operation against the service and encode its reply
pub async fn dispatch(service: &BuilderService, op: Operation) -> ServiceResult<Value> {
    let name = op.name();
    tracing::debug!(op = name, "Dispatching operation");

    let reply = match op {
        Operation::InstallTheme { manifest } => serde_json::to_value(service.install_theme(&manifest).await?)?,
        Operation::MutateDraft { template_id, patch } => {
            serde_json::to_value(service.mutate_draft(&template_id, &patch).await?)?
        }
        Operation::Reorder {
            template_id,
            state,
            order,
        } => serde_json::to_value(service.reorder(&template_id, state, order).await?)?,
        Operation::ApplySettings {
            entity,
            values,
            strict,
            replace,
            client_revision,
        } => {
            let write = SettingsWrite {
                values,
                strict,
                replace,
            };
            serde_json::to_value(service.apply_settings(&entity, write, client_revision).await?)?
        }
        Operation::Publish { template_id, actor } => {
            serde_json::to_value(service.publish(&template_id, &actor).await?)?
        }
        Operation::Snapshot {
            template_id,
            state,
            label,
            actor,
        } => serde_json::to_value(service.snapshot(&template_id, state, label, &actor).await?)?,
        Operation::ListSnapshots { template_id } => {
            serde_json::to_value(service.list_snapshots(&template_id).await?)?
        }
        Operation::Rollback {
            template_id,
            snapshot_id,
            target,
            actor,
        } => serde_json::to_value(
            service
                .rollback(&template_id, &snapshot_id, target, &actor)
                .await?,
        )?,
        Operation::ResolveForm { entity } => serde_json::to_value(service.resolve_form(&entity).await?)?,
        Operation::CurrentState { template_id, state } => {
            serde_json::to_value(service.current_state(&template_id, state).await?)?
        }
        Operation::RequestPreview { template_id, state } => {
            serde_json::to_value(service.request_preview(&template_id, state).await?)?
        }
        Operation::ListTemplates {} => serde_json::to_value(service.list_templates().await?)?,
    };
    Ok(reply)
}
