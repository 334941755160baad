//! Edge Proxy Coordinator
//!
//! HTTP front end of the relay broker: agents attach over WebSocket at
//! `/edge/ws/{agent_id}` and callers submit requests to `POST /proxy`, which
//! are relayed through one of the attached agents.

pub mod config;
pub mod handlers;
pub mod models;
pub mod server;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use edgeproxy_control::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub use config::{CoordinatorConfig, SelectionKind};
pub use server::Coordinator;

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

/// Build the coordinator router around a dispatcher
pub fn build_router(dispatcher: Dispatcher, config: &CoordinatorConfig) -> Router {
    let state = Arc::new(AppState {
        dispatcher,
        ping_interval: config.ping_interval,
        idle_timeout: config.idle_timeout,
    });

    Router::new()
        .route("/proxy", post(handlers::proxy_request))
        .route("/health", get(handlers::health_check))
        .route("/edge/ws/{agent_id}", get(websocket::agent_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
