//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::room::RoomRegistry;

/// Shared application state for the cloud-variable server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Process-wide room registry, shared by every connection's task.
    pub room_registry: Arc<RoomRegistry>,
}
