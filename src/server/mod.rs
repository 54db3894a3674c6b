//! HTTP surface binding the Task Bus (C3) agent protocol (spec §6.1) and
//! the crawl-session REST surface (spec §6.2) to Axum routes. Grounded in
//! `examples/elisplash-paw/pawz-code/server`'s `Router::new().route(...)`
//! layout.

mod dto;
mod errors;
mod handlers;
mod provider;
mod state;

pub use errors::AppError;
pub use provider::ReqwestAiProvider;
pub use state::{AppState, AppStateInner};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

/// Builds the full router: agent-facing endpoints under `/api/agent/*`
/// and `/api/form-pages/ai/*`, operator-facing crawl-session REST under
/// `/networks/*` and `/sessions/*` (spec §6.1, §6.2).
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/agent/register", post(handlers::register))
        .route("/api/agent/refresh-token", post(handlers::refresh_token))
        .route("/api/agent/heartbeat", post(handlers::heartbeat))
        .route("/api/agent/poll-task", get(handlers::poll_task))
        .route("/api/agent/report-task-status", post(handlers::report_task_status))
        .route(
            "/api/agent/report-form-mapper-result",
            post(handlers::report_form_mapper_result),
        )
        .route("/api/form-pages/ai/:op", post(handlers::form_pages_ai_callback))
        .route("/networks/:id/locate", post(handlers::locate))
        .route("/sessions/:id/status", get(handlers::session_status))
        .route("/sessions/:id/cancel", post(handlers::session_cancel))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
