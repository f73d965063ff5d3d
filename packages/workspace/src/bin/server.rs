use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use futures::stream::Stream;
use railspress_common::{Classify, ErrorKind, GraphState};
use railspress_schema::{ContextData, SchemaRegistry};
use railspress_workspace::{
    dispatch, BuilderService, CompositionStore, Config, HashingRenderer, JsonFileStore,
    MemoryStore, Operation, PreviewSynchronizer, ServiceError,
};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

/// RailsPress theme builder server
#[derive(Parser, Debug)]
#[command(name = "railspress-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing railspress.config.json
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// HTTP port (overrides http.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON store root (overrides dataDir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Schema registry document (overrides schemaPath)
    #[arg(long)]
    schema: Option<PathBuf>,
}

struct AppState {
    service: BuilderService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config_dir)
        .with_context(|| format!("Failed to load config from {}", args.config_dir.display()))?;
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(schema) = args.schema {
        config.schema_path = Some(schema);
    }

    let registry = match &config.schema_path {
        Some(path) => {
            let path = Config::resolve_path(&args.config_dir, path);
            SchemaRegistry::load(&path)
                .with_context(|| format!("Failed to load schema registry {}", path.display()))?
        }
        None => {
            tracing::warn!("No schemaPath configured; every section type will be unknown");
            SchemaRegistry::new()
        }
    };

    let context = match &config.context_path {
        Some(path) => {
            let path = Config::resolve_path(&args.config_dir, path);
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read context data {}", path.display()))?;
            ContextData::from_json(&json)
                .with_context(|| format!("Invalid context data {}", path.display()))?
        }
        None => ContextData::new(),
    };

    let store: Arc<dyn CompositionStore> = match &config.data_dir {
        Some(dir) => {
            let dir = Config::resolve_path(&args.config_dir, dir);
            tracing::info!(data_dir = %dir.display(), "Using JSON file store");
            Arc::new(JsonFileStore::open(dir).await?)
        }
        None => {
            tracing::warn!("No dataDir configured; templates are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let mut service = BuilderService::new(Arc::new(registry), store, config.lock_wait())
        .with_context_provider(Arc::new(context));
    if config.preview.enabled {
        service = service.with_preview(PreviewSynchronizer::new(
            Arc::new(HashingRenderer),
            config.preview.channel_capacity,
        ));
    }

    let state = Arc::new(AppState { service });
    let app = Router::new()
        .route("/api/ops/:name", post(operation_handler))
        .route("/api/templates/:id/:state", get(template_handler))
        .route("/api/preview/events", get(preview_events_handler))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("127.0.0.1:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "RailsPress server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Error body: the classified report, status chosen by kind
struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::OrderMismatch | ErrorKind::PublishConflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::TransportFailure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConcurrencyConflict => StatusCode::LOCKED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.0.report();
        if report.kind.is_retryable() {
            tracing::warn!(kind = %report.kind, error = %report.message, "Request failed");
        } else {
            tracing::debug!(kind = %report.kind, error = %report.message, "Request rejected");
        }
        (status_for(report.kind), Json(report)).into_response()
    }
}

/// `POST /api/ops/{name}` with the operation's arguments as the JSON body
async fn operation_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let args = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::InvalidRequest(format!("request body is not JSON: {}", e)))?
    };

    let op = Operation::from_parts(&name, args)?;
    Ok(Json(dispatch(&state.service, op).await?))
}

async fn template_handler(
    State(state): State<Arc<AppState>>,
    Path((id, graph)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let graph: GraphState = graph.parse().map_err(ServiceError::InvalidRequest)?;
    let page = state.service.current_state(&id, graph).await?;
    Ok(Json(serde_json::to_value(page).map_err(ServiceError::from)?))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    template: Option<String>,
}

/// Server-sent preview events, optionally for one template only
async fn preview_events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let preview = state
        .service
        .preview()
        .ok_or_else(|| ServiceError::InvalidRequest("preview rendering is disabled".into()))?;

    let template = query.template;
    let events = BroadcastStream::new(preview.subscribe()).filter_map(move |item| match item {
        Ok(event) => {
            if template.as_deref().map_or(true, |t| t == event.template_id()) {
                Event::default().event("preview").json_data(&event).ok().map(Ok)
            } else {
                None
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Preview subscriber lagged");
            None
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")))
}
