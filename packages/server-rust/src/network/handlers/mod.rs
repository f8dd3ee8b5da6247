//! HTTP handlers and the state they share.

pub mod call;
pub mod health;

pub use call::call_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::Dispatcher;

/// State carried through axum's `State` extractor. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Serves decoded call envelopes.
    pub dispatcher: Dispatcher,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Worker identifier reported by `/health`.
    pub node_id: Arc<str>,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}
