//! `PulseServer`: Axum router, shared state and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_core::{
    BridgeStatus, BroadcastEngine, ChangeSource, CloseReason, ExternalChangeBridge, Hub, InMemoryChangeBus,
    LivenessSupervisor, SharedStats, SlaFeed, TopicContext,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::{pull, push};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub plus the data sources the topic handlers read.
    pub ctx: TopicContext,
    /// Fan-out over the hub.
    pub engine: BroadcastEngine,
    /// Where `POST /api/changes` publishes.
    pub changes: Arc<dyn ChangeSource>,
    /// Dashboard snapshot.
    pub stats: Arc<SharedStats>,
    /// Pending SLA records.
    pub sla: Arc<SlaFeed>,
    /// Running change bridge, if started.
    pub bridge: Option<ExternalChangeBridge>,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The pulse HTTP server.
pub struct PulseServer {
    config: ServerConfig,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl PulseServer {
    /// Server over `hub` with an in-process change bus.
    pub fn new(config: ServerConfig, hub: Arc<Hub>) -> Self {
        Self::with_change_source(config, hub, Arc::new(InMemoryChangeBus::new()))
    }

    /// Server over `hub` publishing and bridging through `changes`.
    pub fn with_change_source(config: ServerConfig, hub: Arc<Hub>, changes: Arc<dyn ChangeSource>) -> Self {
        let stats = Arc::new(SharedStats::new());
        let sla = Arc::new(SlaFeed::default());
        let state = AppState {
            ctx: TopicContext::new(hub.clone(), stats.clone(), sla.clone()),
            engine: BroadcastEngine::new(hub),
            changes,
            stats,
            sla,
            bridge: None,
            metrics: None,
            start_time: Instant::now(),
        };
        Self {
            config,
            state,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn set_metrics(&mut self, handle: PrometheusHandle) {
        self.state.metrics = Some(handle);
    }

    /// Subscribe the change bridge and start its pump.
    ///
    /// A failed subscription leaves the server running in degraded mode.
    pub async fn start_bridge(&mut self) -> BridgeStatus {
        let (bridge, task) = ExternalChangeBridge::start(
            self.state.changes.clone(),
            self.state.engine.clone(),
            self.shutdown.token(),
        )
        .await;
        self.shutdown.track(task);
        let status = bridge.status();
        self.state.bridge = Some(bridge);
        status
    }

    /// Spawn the liveness supervisor.
    pub fn start_supervisor(&self) {
        let supervisor = LivenessSupervisor::new(self.hub().clone());
        self.shutdown
            .track(tokio::spawn(supervisor.run(self.shutdown.token())));
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/tickets/{correlation_id}/stream", get(push::ticket_stream))
            .route("/api/events/{topic}", get(pull::topic_stream))
            .route("/api/broadcast", post(api::broadcast))
            .route("/api/changes", post(api::publish_change))
            .route("/api/sla", post(api::enqueue_sla))
            .route("/api/stats", put(api::replace_stats).get(api::current_stats))
            .route("/api/connections", get(api::connections))
            .route("/api/connections/{id}", delete(api::close_connection))
            .route("/api/history/{kind}", get(api::history))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until shutdown.
    ///
    /// On shutdown every subscriber connection is closed so open streams end
    /// and the graceful drain can finish.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();
        let hub = self.hub().clone();

        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let closed = hub.close_all(CloseReason::Shutdown);
                info!(closed, "closed subscriber connections");
            };
            if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                error!(error = %err, "server error");
            }
        });
        info!(%addr, "pulse server listening");
        Ok((addr, handle))
    }

    /// Topic context for in-process subscriptions.
    pub fn context(&self) -> TopicContext {
        self.state.ctx.clone()
    }

    /// The hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.ctx.hub
    }

    /// The broadcast engine.
    pub fn engine(&self) -> &BroadcastEngine {
        &self.state.engine
    }

    /// Dashboard snapshot store.
    pub fn stats(&self) -> &Arc<SharedStats> {
        &self.state.stats
    }

    /// SLA record queue.
    pub fn sla_feed(&self) -> &Arc<SlaFeed> {
        &self.state.sla
    }

    /// Change bridge, once started.
    pub fn bridge(&self) -> Option<&ExternalChangeBridge> {
        self.state.bridge.as_ref()
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let bridge = state.bridge.as_ref().map(ExternalChangeBridge::status);
    Json(health::health_check(state.start_time, state.ctx.hub.registry().len(), bridge))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .as_ref()
        .map(metrics::render)
        .ok_or(ApiError::MetricsUnavailable)
}
