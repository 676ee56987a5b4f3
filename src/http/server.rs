//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: every request goes to the fallback dispatcher
//! - Wire up middleware (tracing, timeout, body limit, request ID, auth)
//! - Buffer the request body and hand a `RequestContext` to the route table
//! - Apply config reloads to config-origin mounts
//! - Serve the admin API on its own listener
//! - Graceful shutdown: cancel in-flight dispatch, drain, persist storage

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{policy_middleware, token_resolver_middleware, AuthState, TokenStore};
use crate::backends::{BackendFactory, ServerState};
use crate::config::MockServerConfig;
use crate::handler::context::{CancellationSignal, RequestContext};
use crate::handler::result::error_object;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::mount::{MountError, MountManager};
use crate::observability::metrics;
use crate::routing::table::{RouteTable, RouteTableOptions, RoutingError};
use crate::storage::{InMemoryStorage, StorageError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("mount error: {0}")]
    Mount(#[from] MountError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<MockServerConfig>>,
    pub table: Arc<RouteTable>,
    pub mounts: Arc<MountManager>,
    pub backends: BackendFactory,
    pub auth: Arc<AuthState>,
    pub cancel: watch::Receiver<bool>,
    pub started_at: Instant,
}

impl AppState {
    /// Swap in a reloaded config and reconcile config-origin mounts.
    ///
    /// Listener, auth and routing options only take effect on restart.
    pub fn apply_config(&self, config: MockServerConfig) {
        let desired = config.effective_mounts();
        self.config.store(Arc::new(config));

        match self.mounts.reconcile(&desired, |m| self.backends.build(m)) {
            Ok(()) => tracing::info!(mounts = desired.len(), "Configuration reloaded"),
            Err(e) => tracing::error!(error = %e, "Configuration reloaded with mount errors"),
        }
    }
}

/// HTTP server for the mock.
pub struct HttpServer {
    state: AppState,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl HttpServer {
    /// Build every subsystem and apply the configured mounts.
    pub fn new(config: MockServerConfig) -> Result<Self, ServerError> {
        let storage = InMemoryStorage::from_config(&config.storage)?;
        let tokens = Arc::new(TokenStore::from_config(&config.auth.tokens));
        let backends = BackendFactory::new(
            storage,
            Arc::new(ServerState::from_config(&config.server)),
            tokens.clone(),
            config.server.clone(),
        );

        let table = Arc::new(RouteTable::new(RouteTableOptions::from(&config.routing)));
        let mounts = Arc::new(MountManager::new(table.clone()));
        mounts.reconcile(&config.effective_mounts(), |m| backends.build(m))?;

        let auth = Arc::new(AuthState::from_config(&config.auth, tokens));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let state = AppState {
            config: Arc::new(ArcSwap::from_pointee(config)),
            table,
            mounts,
            backends,
            auth,
            cancel: cancel_rx,
            started_at: Instant::now(),
        };

        Ok(Self {
            state,
            cancel_tx: Arc::new(cancel_tx),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn mounts(&self) -> &Arc<MountManager> {
        &self.state.mounts
    }

    /// Cancel every in-flight and future dispatch; they answer 503.
    pub fn cancel_in_flight(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Build the data-plane router with all middleware layers.
    #[allow(deprecated)]
    pub fn app(&self) -> Router {
        let config = self.state.config.load();
        let auth = self.state.auth.clone();

        Router::new()
            .fallback(dispatch_handler)
            .with_state(self.state.clone())
            .layer(middleware::from_fn_with_state(auth.clone(), policy_middleware))
            .layer(middleware::from_fn_with_state(auth, token_resolver_middleware))
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    pub fn admin_app(&self) -> Router {
        crate::admin::setup_admin_router(self.state.clone())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<MockServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, mounts = self.state.mounts.mounts().len(), "HTTP server starting");

        let config = self.state.config.load_full();
        let admin = if config.admin.enabled {
            let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
            tracing::info!(address = %config.admin.bind_address, "Admin API listening");

            let app = self.admin_app();
            let mut admin_shutdown = shutdown.resubscribe();
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await
            }))
        } else {
            None
        };

        let reload_state = self.state.clone();
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_state.apply_config(new_config);
            }
        });

        let cancel_tx = self.cancel_tx.clone();
        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, cancelling in-flight requests");
                let _ = cancel_tx.send(true);
            })
            .await?;

        reload.abort();
        if let Some(handle) = admin {
            match handle.await {
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API stopped with error"),
                Err(e) => tracing::error!(error = %e, "Admin API task failed"),
                Ok(Ok(())) => {}
            }
        }

        if let Err(e) = self.state.backends.storage().save_to_file() {
            tracing::error!(error = %e, "Failed to persist storage");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a snapshot of the current config.
    pub fn config(&self) -> Arc<MockServerConfig> {
        self.state.config.load_full()
    }
}

/// Fallback handler: buffer the body and dispatch through the route table.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let limit = state.config.load().limits.max_body_size;

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to buffer request body");
            metrics::record_request(method.as_str(), 413, start);
            return error_object(StatusCode::PAYLOAD_TOO_LARGE, ["request body too large"]).into_response();
        }
    };

    let mut ctx = RequestContext::from_parts(parts, body)
        .with_cancellation(CancellationSignal::new(state.cancel.clone()));

    let response = match state.table.dispatch(&mut ctx).await {
        Ok(_) if ctx.is_cancelled() => shutting_down(),
        Ok(result) => result.into_response(),
        Err(RoutingError::Cancelled) => shutting_down(),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch failed");
            error_object(StatusCode::INTERNAL_SERVER_ERROR, [e.to_string()]).into_response()
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %ctx.path(),
        status = response.status().as_u16(),
        "Dispatched request"
    );
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn shutting_down() -> Response {
    error_object(StatusCode::SERVICE_UNAVAILABLE, ["server is shutting down"]).into_response()
}
