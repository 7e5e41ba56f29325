//! Gateway HTTP server (Axum)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tutor_core::{Label, RunError, Router};
use tutor_history::{HistoryDb, Interaction};

use crate::protocol::{
    AskRequest, AskResponse, BranchInfo, ErrorBody, HistoryParams, ServiceInfo,
};

/// Default number of interactions returned by the history endpoint
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<Router>,
    pub history: Option<HistoryDb>,
    pub recent_limit: usize,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(router: Arc<Router>, history: Option<HistoryDb>) -> Self {
        Self {
            router,
            history,
            recent_limit: DEFAULT_RECENT_LIMIT,
            start_time: Instant::now(),
        }
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run_until(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

pub fn build_router(state: GatewayState) -> axum::Router {
    axum::Router::new()
        .route("/", get(info_handler))
        .route("/api/v1/ask", post(ask_handler))
        .route("/api/v1/history", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error returned by a handler, rendered as JSON
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: message.into(),
                retryable: false,
                label: None,
            },
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: message.into(),
                retryable: false,
                label: None,
            },
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        // 503 invites a retry, 502 says the upstream rejected the request
        let status = if err.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        };
        Self {
            status,
            body: ErrorBody {
                error: err.to_string(),
                retryable: err.is_retryable(),
                label: err.label(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ── HTTP Handlers ──

async fn info_handler(State(state): State<GatewayState>) -> Json<ServiceInfo> {
    let branches = Label::ALL
        .iter()
        .map(|label| {
            let handler = state.router.handler(*label);
            BranchInfo {
                label: *label,
                backend: handler.backend_name().to_string(),
                model: handler.model().to_string(),
            }
        })
        .collect();

    Json(ServiceInfo {
        message: "Tutor router is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        classifier: state.router.classifier_name().to_string(),
        fallback: state.router.fallback(),
        branches,
        history_enabled: state.history.is_some(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn ask_handler(
    State(state): State<GatewayState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Missing or empty 'query'"));
    }

    let outcome = state.router.run(query).await?;

    if let Some(history) = &state.history {
        if let Err(e) = history
            .record(
                outcome.label.as_str(),
                &outcome.query,
                &outcome.response,
                &outcome.model,
            )
            .await
        {
            warn!("Failed to record interaction: {:#}", e);
        }
    }

    Ok(Json(AskResponse::from(outcome)))
}

async fn history_handler(
    State(state): State<GatewayState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Interaction>>, ApiError> {
    let Some(history) = &state.history else {
        return Ok(Json(Vec::new()));
    };

    let limit = params.limit.unwrap_or(state.recent_limit);
    history
        .recent(limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(format!("Failed to load history: {:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tutor_core::{Backend, BackendError, Completion, Handler, KeywordClassifier};

    struct MockBackend {
        name: &'static str,
        status: Option<u16>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(name: &'static str, status: Option<u16>) -> Arc<Self> {
            Arc::new(Self {
                name,
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            self.name
        }
        fn model(&self) -> &str {
            "mock-model"
        }
        async fn complete(&self, _prompt: &str) -> Result<Completion, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(status) => Err(BackendError::Status {
                    backend: self.name.to_string(),
                    status,
                    body: "upstream says no".to_string(),
                }),
                None => Ok(Completion {
                    text: format!("answer from {}", self.name),
                    model: "mock-model".to_string(),
                }),
            }
        }
    }

    fn state(academic: Arc<MockBackend>, coding: Arc<MockBackend>) -> GatewayState {
        let router = Router::new(
            Arc::new(KeywordClassifier::default()),
            Handler::new(Label::Academic, academic),
            Handler::new(Label::Coding, coding),
        )
        .unwrap();
        GatewayState::new(Arc::new(router), Some(HistoryDb::in_memory().unwrap()))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ask(query: &str) -> Json<AskRequest> {
        Json(AskRequest {
            query: query.to_string(),
        })
    }

    #[tokio::test]
    async fn test_ask_routes_and_records() {
        let academic = MockBackend::new("groq", None);
        let coding = MockBackend::new("openrouter", None);
        let st = state(academic.clone(), coding.clone());

        let resp = ask_handler(State(st.clone()), ask("Write a function to reverse a linked list"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["label"], "coding");
        assert_eq!(json["response"], "answer from openrouter");
        assert_eq!(json["agent"], "tutor");
        assert_eq!(coding.calls.load(Ordering::SeqCst), 1);
        assert_eq!(academic.calls.load(Ordering::SeqCst), 0);

        let history = st.history.as_ref().unwrap().recent(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].label, "coding");
        assert_eq!(history[0].query, "Write a function to reverse a linked list");
    }

    #[tokio::test]
    async fn test_ask_empty_query_is_bad_request() {
        let academic = MockBackend::new("groq", None);
        let coding = MockBackend::new("openrouter", None);
        let st = state(academic.clone(), coding.clone());

        let resp = ask_handler(State(st), ask("   ")).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(academic.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coding.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ask_transient_failure_is_503() {
        let st = state(MockBackend::new("groq", Some(503)), MockBackend::new("openrouter", None));

        let resp = ask_handler(State(st.clone()), ask("Explain the second law of thermodynamics"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert_eq!(json["retryable"], true);
        assert_eq!(json["label"], "academic");

        // Failed runs are not recorded
        assert_eq!(st.history.as_ref().unwrap().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ask_permanent_failure_is_502() {
        let st = state(MockBackend::new("groq", None), MockBackend::new("openrouter", Some(401)));

        let resp = ask_handler(State(st), ask("debug my python script"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert_eq!(json["retryable"], false);
        assert!(json["error"].as_str().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_history_endpoint_limit() {
        let st = state(MockBackend::new("groq", None), MockBackend::new("openrouter", None));
        for q in ["What is gravity?", "Explain osmosis", "Write a python script"] {
            let Json(resp) = ask_handler(State(st.clone()), ask(q)).await.unwrap();
            assert!(resp.response.starts_with("answer from"));
        }

        let Json(items) = history_handler(State(st.clone()), Query(HistoryParams { limit: Some(2) }))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].query, "Write a python script");

        let Json(items) = history_handler(State(st), Query(HistoryParams { limit: None }))
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_history_disabled_returns_empty() {
        let mut st = state(MockBackend::new("groq", None), MockBackend::new("openrouter", None));
        st.history = None;
        let Json(items) = history_handler(State(st), Query(HistoryParams { limit: None }))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_info_lists_branches() {
        let st = state(MockBackend::new("groq", None), MockBackend::new("openrouter", None));
        let Json(info) = info_handler(State(st)).await;
        assert_eq!(info.classifier, "keyword");
        assert_eq!(info.fallback, Label::Academic);
        assert_eq!(info.branches.len(), 2);
        assert_eq!(info.branches[0].backend, "groq");
        assert_eq!(info.branches[1].backend, "openrouter");
        assert!(info.history_enabled);
    }

    #[tokio::test]
    async fn test_server_shuts_down_on_cancel() {
        let st = state(MockBackend::new("groq", None), MockBackend::new("openrouter", None));
        let server = GatewayServer::new("127.0.0.1:0".parse().unwrap(), st);
        let token = CancellationToken::new();
        let handle = tokio::spawn(server.run_until(token.clone()));
        token.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
