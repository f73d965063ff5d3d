//! Background preview rendering.
//!
//! Requests never block the caller: the decision is taken under the ledger
//! lock and any render runs on a spawned task. A newer version aborts the
//! task rendering the older one; if the old task finishes anyway its result
//! is discarded by the ledger. Requests for an older version than the one
//! already rendering are ignored.

use async_trait::async_trait;
use railspress_common::GraphState;
use railspress_editor::{
    PreviewDecision, PreviewLedger, PreviewVersion, RenderToken, RenderedPreview, ResolvedComposition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Render service unavailable: {0}")]
    Unavailable(String),

    #[error("Render rejected: {0}")]
    Rejected(String),
}

/// External renderer producing a version token for a resolved graph
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, page: &ResolvedComposition) -> Result<RenderToken, RenderError>;
}

/// Renderer whose token is the checksum of the resolved graph
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingRenderer;

#[async_trait]
impl RenderService for HashingRenderer {
    async fn render(&self, page: &ResolvedComposition) -> Result<RenderToken, RenderError> {
        let bytes = serde_json::to_vec(page).map_err(|e| RenderError::Rejected(e.to_string()))?;
        Ok(RenderToken(format!("r-{:08x}", crc32fast::hash(&bytes))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PreviewEvent {
    Rendered {
        template_id: String,
        state: GraphState,
        version: PreviewVersion,
        token: RenderToken,
    },
    Failed {
        template_id: String,
        state: GraphState,
        version: PreviewVersion,
        message: String,
    },
}

impl PreviewEvent {
    pub fn template_id(&self) -> &str {
        match self {
            PreviewEvent::Rendered { template_id, .. } | PreviewEvent::Failed { template_id, .. } => {
                template_id
            }
        }
    }
}

type TaskKey = (String, GraphState);

#[derive(Clone)]
pub struct PreviewSynchronizer {
    renderer: Arc<dyn RenderService>,
    ledger: Arc<Mutex<PreviewLedger>>,
    tasks: Arc<Mutex<HashMap<TaskKey, JoinHandle<()>>>>,
    events: broadcast::Sender<PreviewEvent>,
}

impl PreviewSynchronizer {
    pub fn new(renderer: Arc<dyn RenderService>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            renderer,
            ledger: Arc::new(Mutex::new(PreviewLedger::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    pub async fn latest(&self, template_id: &str, state: GraphState) -> Option<RenderedPreview> {
        self.ledger.lock().await.latest(template_id, state).cloned()
    }

    /// Schedule a render of `page` unless its version is already covered
    pub async fn request(&self, page: ResolvedComposition) -> PreviewDecision {
        let key = (page.template_id.clone(), page.state);
        let version = page.version();
        let decision = self
            .ledger
            .lock()
            .await
            .request(&page.template_id, page.state, version);

        let PreviewDecision::Start { generation, .. } = decision else {
            return decision;
        };

        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.remove(&key) {
            previous.abort();
        }

        let renderer = self.renderer.clone();
        let ledger = self.ledger.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let result = renderer.render(&page).await;
            let mut ledger = ledger.lock().await;
            let event = match result {
                Ok(token) => {
                    if !ledger.complete(&page.template_id, page.state, generation, token.clone()) {
                        return;
                    }
                    tracing::debug!(
                        template_id = %page.template_id,
                        state = %page.state,
                        version = %version,
                        token = %token,
                        "Preview rendered"
                    );
                    PreviewEvent::Rendered {
                        template_id: page.template_id,
                        state: page.state,
                        version,
                        token,
                    }
                }
                Err(e) => {
                    if !ledger.fail(&page.template_id, page.state, generation) {
                        return;
                    }
                    tracing::warn!(
                        template_id = %page.template_id,
                        state = %page.state,
                        version = %version,
                        error = %e,
                        "Preview render failed"
                    );
                    PreviewEvent::Failed {
                        template_id: page.template_id,
                        state: page.state,
                        version,
                        message: e.to_string(),
                    }
                }
            };
            // No subscribers is fine
            let _ = events.send(event);
        });
        tasks.insert(key, handle);

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railspress_common::Settings;
    use std::time::Duration;

    fn page(revision: u64) -> ResolvedComposition {
        ResolvedComposition {
            template_id: "index".into(),
            theme_id: "dawn".into(),
            state: GraphState::Draft,
            revision,
            theme_revision: 0,
            theme_settings: Settings::new(),
            sections: Vec::new(),
        }
    }

    /// Takes longer for older revisions so completions arrive out of order
    struct SlowRenderer;

    #[async_trait]
    impl RenderService for SlowRenderer {
        async fn render(&self, page: &ResolvedComposition) -> Result<RenderToken, RenderError> {
            tokio::time::sleep(Duration::from_millis(100 / page.revision.max(1))).await;
            Ok(RenderToken(format!("rev-{}", page.revision)))
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl RenderService for BrokenRenderer {
        async fn render(&self, _page: &ResolvedComposition) -> Result<RenderToken, RenderError> {
            Err(RenderError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_hashing_renderer_is_deterministic() {
        let a = HashingRenderer.render(&page(1)).await.unwrap();
        let b = HashingRenderer.render(&page(1)).await.unwrap();
        let c = HashingRenderer.render(&page(2)).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.0.starts_with("r-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_request_supersedes_older_render() {
        let sync = PreviewSynchronizer::new(Arc::new(SlowRenderer), 8);
        let mut events = sync.subscribe();

        assert!(matches!(sync.request(page(1)).await, PreviewDecision::Start { superseded: None, .. }));
        assert!(matches!(sync.request(page(2)).await, PreviewDecision::Start { superseded: Some(_), .. }));

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            PreviewEvent::Rendered {
                template_id: "index".into(),
                state: GraphState::Draft,
                version: PreviewVersion::new(2, 0),
                token: RenderToken("rev-2".into()),
            }
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(sync.latest("index", GraphState::Draft).await.map(|p| p.version.revision), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_older_request_keeps_newer_render() {
        let sync = PreviewSynchronizer::new(Arc::new(SlowRenderer), 8);
        let mut events = sync.subscribe();

        let newer = sync.request(page(6)).await;
        let PreviewDecision::Start { generation, .. } = newer else {
            panic!("expected a render to start");
        };
        assert_eq!(
            sync.request(page(5)).await,
            PreviewDecision::AlreadyRendering { generation }
        );

        match events.recv().await.unwrap() {
            PreviewEvent::Rendered { version, .. } => assert_eq!(version.revision, 6),
            other => panic!("expected render event, got {:?}", other),
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_revision_is_noop() {
        let sync = PreviewSynchronizer::new(Arc::new(SlowRenderer), 8);
        let mut events = sync.subscribe();

        sync.request(page(3)).await;
        events.recv().await.unwrap();

        assert_eq!(
            sync.request(page(3)).await,
            PreviewDecision::UpToDate {
                token: RenderToken("rev-3".into())
            }
        );
    }

    #[tokio::test]
    async fn test_failed_render_is_broadcast() {
        let sync = PreviewSynchronizer::new(Arc::new(BrokenRenderer), 8);
        let mut events = sync.subscribe();

        sync.request(page(1)).await;
        match events.recv().await.unwrap() {
            PreviewEvent::Failed { message, .. } => assert!(message.contains("connection refused")),
            other => panic!("expected failure event, got {:?}", other),
        }
        assert!(sync.latest("index", GraphState::Draft).await.is_none());
    }
}
