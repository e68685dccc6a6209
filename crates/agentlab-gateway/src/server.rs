//! HTTP server: shared state, router, and lifecycle

use crate::auth::{bearer_token, Authenticator};
use crate::error::ApiError;
use crate::{accounts, agents, experiments};
use agentlab_core::{Framework, Settings, UserId};
use agentlab_engine::ExperimentManager;
use agentlab_frameworks::{create_default_dispatcher, Dispatcher};
use agentlab_store::{MemoryStore, Store};
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub auth: Authenticator,
    pub experiments: ExperimentManager,
    pub frameworks: Vec<Framework>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the components together. Needs a tokio runtime (the experiment
    /// scheduler is spawned here).
    pub fn new(settings: Settings, store: Arc<dyn Store>, dispatcher: Dispatcher) -> Self {
        let frameworks = dispatcher.frameworks();
        let experiments =
            ExperimentManager::new(store.clone(), Arc::new(dispatcher), &settings.execution);
        let auth = Authenticator::new(&settings.auth, store.clone());
        Self { settings, store, auth, experiments, frameworks, started_at: Instant::now() }
    }

    /// State backed by the configured store and the built-in adapters.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &settings.store.snapshot_path {
            Some(path) => Arc::new(MemoryStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let dispatcher = create_default_dispatcher(&settings);
        Ok(Self::new(settings, store, dispatcher))
    }
}

/// The caller's verified identity.
pub struct CurrentUser(pub UserId);

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user = state.auth.verify(bearer_token(&parts.headers)).await?;
        Ok(CurrentUser(user))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/logout", post(accounts::logout))
        .route("/auth/me", get(accounts::me))
        .route("/agents", get(agents::list).post(agents::create))
        .route(
            "/agents/:id",
            get(agents::get).put(agents::update).delete(agents::delete),
        )
        .route("/experiments", get(experiments::list).post(experiments::create))
        .route("/experiments/:id", get(experiments::get))
        .route("/experiments/:id/status", get(experiments::status))
        .route("/experiments/:id/results", get(experiments::results))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves, then drain running
/// experiments. Recovery runs before the first request is accepted.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let report = state.experiments.recover().await?;
    if report.failed > 0 || report.rescheduled > 0 {
        info!(
            "Recovered experiments: {} failed, {} rescheduled",
            report.failed, report.rescheduled
        );
    }

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped, waiting for running experiments");
    state.experiments.shutdown().await;
    Ok(())
}

pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", settings.server.bind.to_addr(), settings.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {}", e))?;
    let state = Arc::new(AppState::from_settings(settings)?);

    info!("Agentlab v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Auth mode: {:?}", state.settings.auth.mode);
    info!("  Frameworks: {:?}", state.frameworks);
    match &state.settings.store.snapshot_path {
        Some(path) => info!("  Snapshot: {}", path.display()),
        None => info!("  Snapshot: disabled (in-memory only)"),
    }
    if state.settings.providers.openai_api_key.is_none() {
        info!("  OPENAI_API_KEY not set; experiments will fail until it is configured");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn index_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Agentlab API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "frameworks": state.frameworks,
        "in_flight": state.experiments.in_flight(),
    }))
}
