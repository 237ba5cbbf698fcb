//! Email operation triggers
//!
//! Both endpoints acknowledge immediately and run the engine pass in the
//! background; results surface in the event log and engine reports, not in
//! the HTTP response.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use outpost_common::types::CampaignId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendCampaignQuery {
    pub campaign_id: Option<CampaignId>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<CampaignId>,
}

/// Trigger a dispatch pass, optionally narrowed to one campaign
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SendCampaignQuery>,
) -> Json<AckResponse> {
    let dispatch = Arc::clone(&state.dispatch);
    let cancel = state.cancel.clone();
    let campaign_id = query.campaign_id;

    tokio::spawn(async move {
        let report = dispatch.dispatch(campaign_id, &cancel).await;
        debug!(report = %json!(report), "Background dispatch pass report");
    });

    Json(AckResponse {
        message: "Campaign email sending started".to_string(),
        campaign_id: query.campaign_id,
    })
}

/// Trigger a reply-checking pass
pub async fn check_replies(State(state): State<Arc<AppState>>) -> Json<AckResponse> {
    let reply = Arc::clone(&state.reply);
    let cancel = state.cancel.clone();

    tokio::spawn(async move {
        let report = reply.check_replies(&cancel).await;
        debug!(report = %json!(report), "Background reply pass report");
    });

    Json(AckResponse {
        message: "Reply checking started".to_string(),
        campaign_id: None,
    })
}
