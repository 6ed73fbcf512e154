//! HTTP API Server
//!
//! `/query`, `/health` and `/follower`, all POST and all behind the
//! shared-secret check.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    routing::post,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{require_secret, SharedSecret};
use super::dispatcher::{Dispatcher, QueryResponse};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::replication::FollowerEndpoint;

/// Shared application state
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            state: Arc::new(AppState { dispatcher }),
        }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let secret = SharedSecret::new(&self.config.secret);

        let router = Router::new()
            .route("/query", post(handle_query))
            .route("/health", post(handle_health))
            .route("/follower", post(handle_follower))
            .layer(middleware::from_fn_with_state(secret, require_secret))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))
    }
}

// ============ Handlers ============

async fn handle_query(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<QueryResponse> {
    Json(state.dispatcher.handle_query(&body).await)
}

async fn handle_health() -> &'static str {
    "OK"
}

async fn handle_follower(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> StatusCode {
    match serde_json::from_slice::<FollowerEndpoint>(&body) {
        Ok(endpoint) => {
            state.dispatcher.register_follower(&endpoint).await;
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!("Bad follower registration: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
