//! HTTP and websocket surface.
//!
//! | Route                                           | Purpose                          |
//! |-------------------------------------------------|----------------------------------|
//! | `GET  /sessions`                                | session logs under the root      |
//! | `GET  /sessions/{id}/messages`                  | every record of a session        |
//! | `GET  /sessions/{id}/messages/{role}/{which}`   | first or latest record of a role |
//! | `POST /sessions/new`                            | start a worker                   |
//! | `POST /sessions/{id}/send`                      | resume a session in a new worker |
//! | `POST /sessions/{id}/cancel`                    | interrupt a managed worker       |
//! | `GET  /managed`, `GET /managed/{id}`            | live managed workers             |
//! | `GET  /ws`                                      | live record push                 |

pub mod handlers;
pub mod sessions;
pub mod ws;

pub use sessions::{Pick, SessionStore, SessionSummary};

use crate::config::SendConfig;
use crate::events::EventBus;
use crate::process::{CancellationController, ProcessRegistry};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state behind every handler.
pub struct ApiState {
    pub sessions: SessionStore,
    pub registry: Arc<ProcessRegistry>,
    pub canceller: Arc<CancellationController>,
    pub bus: EventBus,
    pub send: SendConfig,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/new", post(handlers::new_session))
        .route("/sessions/{id}/messages", get(handlers::session_messages))
        .route(
            "/sessions/{id}/messages/{role}/{which}",
            get(handlers::session_message),
        )
        .route("/sessions/{id}/send", post(handlers::send_to_session))
        .route("/sessions/{id}/cancel", post(handlers::cancel_session))
        .route("/managed", get(handlers::list_managed))
        .route("/managed/{id}", get(handlers::get_managed))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
