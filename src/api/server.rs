//! HTTP server implementation using axum
//!
//! Provides the control-plane server with CORS support, graceful shutdown,
//! and tracing middleware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::routes::create_router;
use crate::api::websocket::WebSocketHandler;
use crate::context::ContextLifecycleManager;
use crate::fingerprint::{ConsistencyValidator, FingerprintGenerator};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle manager owning every account context
    pub manager: ContextLifecycleManager,
    /// Stateless generator for ad-hoc profiles
    pub generator: FingerprintGenerator,
    pub validator: ConsistencyValidator,
    /// WebSocket handler for broadcasting lifecycle events
    pub ws_handler: Arc<WebSocketHandler>,
    /// Flag indicating if the API is enabled
    pub api_enabled: Arc<RwLock<bool>>,
}

impl AppState {
    pub fn new(manager: ContextLifecycleManager) -> Self {
        Self {
            manager,
            generator: FingerprintGenerator::new(),
            validator: ConsistencyValidator::new(),
            ws_handler: Arc::new(WebSocketHandler::new()),
            api_enabled: Arc::new(RwLock::new(true)),
        }
    }

    /// Check if the API is currently enabled
    pub async fn is_enabled(&self) -> bool {
        *self.api_enabled.read().await
    }

    /// Set the API enabled state
    pub async fn set_enabled(&self, enabled: bool) {
        let mut state = self.api_enabled.write().await;
        *state = enabled;
    }
}

/// HTTP API server
pub struct ApiServer {
    port: u16,
    enabled: bool,
    state: AppState,
    shutdown_tx: Option<watch::Sender<bool>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
    forwarder_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ApiServer {
    /// Create a new API server over a lifecycle manager
    pub fn new(port: u16, manager: ContextLifecycleManager) -> Self {
        Self::with_state(port, AppState::new(manager))
    }

    /// Create a new API server with existing state
    pub fn with_state(port: u16, state: AppState) -> Self {
        Self {
            port,
            enabled: false,
            state,
            shutdown_tx: None,
            server_handle: None,
            forwarder_handle: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get a clone of the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Configure CORS for localhost tooling
    fn configure_cors() -> CorsLayer {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
            ])
            .max_age(Duration::from_secs(3600))
    }

    /// Build the router with all middleware
    pub fn build_router(&self) -> Router {
        create_router(self.state.clone())
            .layer(Self::configure_cors())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server and the lifecycle event forwarder
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.enabled {
            warn!("API server is already running");
            return Ok(());
        }

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let router = self.build_router();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let listener = TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);

        self.enabled = true;

        self.forwarder_handle = Some(
            self.state
                .ws_handler
                .clone()
                .spawn_forwarder(self.state.manager.subscribe()),
        );

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    while !*shutdown_rx.borrow() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    info!("API server shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    error!("API server error: {}", e);
                });
        });

        self.server_handle = Some(handle);

        Ok(())
    }

    /// Stop the HTTP server gracefully
    pub async fn stop(&mut self) {
        if !self.enabled {
            warn!("API server is not running");
            return;
        }

        info!("Stopping API server...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = handle => {
                    info!("API server stopped successfully");
                }
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    warn!("API server shutdown timed out");
                }
            }
        }

        if let Some(forwarder) = self.forwarder_handle.take() {
            forwarder.abort();
        }

        self.enabled = false;
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(forwarder) = self.forwarder_handle.take() {
            forwarder.abort();
        }
    }
}
