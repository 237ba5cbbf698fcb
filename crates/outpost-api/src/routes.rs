//! API routes

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{email_events, emails, health};
use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/emails/send-campaign", post(emails::send_campaign))
        .route("/emails/check-replies", post(emails::check_replies))
        .route("/email-events/track-open", get(email_events::track_open))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
