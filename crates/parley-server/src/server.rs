//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::relay::{RelayCore, RelayHandle, hub};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// `host:port` that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Front door to the relay hub.
    pub relay: RelayHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// WebSocket sessions currently holding a slot.
    pub active_sessions: Arc<AtomicUsize>,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
    hub_task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    /// Create a server and start its relay hub. Must be called inside a Tokio
    /// runtime.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (relay, hub_task) = hub::spawn(
            RelayCore::new(),
            config.send_queue_capacity,
            shutdown.token(),
        );
        Self {
            state: AppState {
                relay,
                config: Arc::new(config),
                shutdown,
                start_time: Instant::now(),
                metrics,
                active_sessions: Arc::new(AtomicUsize::new(0)),
            },
            hub_task: Mutex::new(Some(hub_task)),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let body_limit = self.state.config.max_message_size;
        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route(
                "/minecraft-data",
                post(minecraft_data_handler).layer(DefaultBodyLimit::max(body_limit)),
            )
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));

        if let Some(dir) = &self.state.config.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router.with_state(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "http server error");
            }
        });

        info!(addr = %local_addr, "relay server listening");
        Ok((local_addr, handle))
    }

    /// Cancel everything and wait for the server task and the hub to finish.
    pub async fn drain(&self, server_task: JoinHandle<()>) {
        let mut tasks = vec![server_task];
        if let Some(hub_task) = self.hub_task.lock().take() {
            tasks.push(hub_task);
        }
        self.state.shutdown.graceful_shutdown(tasks, None).await;
    }

    /// Front door to the relay hub.
    pub fn relay(&self) -> &RelayHandle {
        &self.state.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// Holds one of the `max_connections` session slots until dropped.
struct SessionSlot(Arc<AtomicUsize>);

impl SessionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(active)))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = SessionSlot::acquire(&state.active_sessions, state.config.max_connections)
    else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let conn_id = state.relay.next_connection_id();
    let cancel = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, conn_id, state.relay, state.config, cancel).await;
            drop(slot);
        })
}

/// POST /minecraft-data
///
/// Acknowledged whatever the body is; anything that does not parse as JSON is
/// stored as an empty object.
async fn minecraft_data_handler(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let blob = parse_blob(&body);
    if state.relay.update(blob).await.is_err() {
        warn!("relay hub stopped, snapshot discarded");
    }
    Json(json!({ "success": true }))
}

fn parse_blob(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        if !body.is_empty() {
            warn!(error = %e, len = body.len(), "snapshot body is not JSON, storing empty object");
        }
        json!({})
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.relay.stats().await.ok();
    Json(health::health_check(state.start_time, stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
