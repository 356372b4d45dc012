//! Router assembly, shared between the binary and integration tests.

use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{routes, ws};

/// Build the full application router for `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/ws", get(ws::ws_upgrade))
        .fallback_service(ServeDir::new(&state.config.server.web_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
