//! Outpost API - REST trigger and tracking endpoints
//!
//! This crate exposes the endpoints consumed by external collaborators:
//! background triggers for the dispatch and reply engines, the
//! open-tracking pixel, and health probes. Entity CRUD lives elsewhere.

use std::sync::Arc;

use outpost_core::{DispatchEngine, ReplyEngine};
use outpost_storage::Store;
use tokio_util::sync::CancellationToken;

pub mod handlers;
pub mod routes;

pub use routes::create_router;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatch: Arc<DispatchEngine>,
    pub reply: Arc<ReplyEngine>,
    /// Cancels in-flight engine passes on shutdown
    pub cancel: CancellationToken,
}
