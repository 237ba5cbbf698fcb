//! Open-tracking pixel handler
//!
//! Always answers with the fixed 1x1 transparent GIF: a broken tracking
//! hit must never surface an error into a recipient's mail client.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use outpost_common::types::{EmailEventId, EventType, LeadStatus};
use outpost_storage::{
    CampaignCounter, CampaignRepository, EmailEventRepository, LeadRepository, NewEmailEvent,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::AppState;

/// 1x1 transparent GIF
const TRANSPARENT_GIF: [u8; 35] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct TrackOpenQuery {
    /// Sent-event id the pixel was keyed by; kept as a string so malformed
    /// values still get the pixel back
    pub id: String,
}

/// Record an email open and return the pixel
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrackOpenQuery>,
) -> impl IntoResponse {
    if let Err(e) = record_open(&state, &query.id).await {
        warn!(event_id = %query.id, "Error tracking open: {}", e);
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRANSPARENT_GIF.to_vec(),
    )
}

async fn record_open(state: &AppState, id: &str) -> anyhow::Result<()> {
    let id: EmailEventId = id.parse()?;

    let events = EmailEventRepository::new(Arc::clone(&state.store));
    let Some(sent_event) = events.get(id).await? else {
        debug!(event_id = %id, "Tracking hit for unknown event");
        return Ok(());
    };

    events
        .record(NewEmailEvent {
            campaign_id: sent_event.campaign_id,
            lead_id: sent_event.lead_id,
            sequence_id: sent_event.sequence_id,
            step_number: sent_event.step_number,
            sending_account_id: sent_event.sending_account_id,
            event_type: EventType::Opened,
            ..Default::default()
        })
        .await?;

    if let Some(lead_id) = sent_event.lead_id {
        // Central transition table: sent -> opened, never a downgrade
        LeadRepository::new(Arc::clone(&state.store))
            .transition(lead_id, LeadStatus::Opened)
            .await?;
    }
    if let Some(campaign_id) = sent_event.campaign_id {
        CampaignRepository::new(Arc::clone(&state.store))
            .bump_counter(campaign_id, CampaignCounter::Opened)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_common::config::SmtpDefaults;
    use outpost_core::{
        dispatch::DispatchConfig, DispatchEngine, ImapFetcher, ReplyEngine, SmtpTransport,
    };
    use outpost_storage::{MemoryStore, NewLead, Store};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn state_with_store(store: Arc<MemoryStore>) -> Arc<AppState> {
        let store: Arc<dyn Store> = store;
        Arc::new(AppState {
            store: Arc::clone(&store),
            dispatch: Arc::new(DispatchEngine::new(
                Arc::clone(&store),
                Arc::new(SmtpTransport::new()),
                DispatchConfig {
                    tracking_base_url: "http://localhost:8000".to_string(),
                    smtp_defaults: SmtpDefaults::default(),
                },
            )),
            reply: Arc::new(ReplyEngine::new(
                Arc::clone(&store),
                Arc::new(ImapFetcher::new()),
            )),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_track_open_records_event_and_transitions_lead() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with_store(Arc::clone(&store));

        let leads = LeadRepository::new(state.store.clone());
        let lead = leads
            .create(NewLead::on_list(Uuid::new_v4(), Uuid::new_v4(), "a@x.com"))
            .await
            .unwrap();
        leads.mark_sent(lead.id, 1).await.unwrap();

        let events = EmailEventRepository::new(state.store.clone());
        let sent = events
            .record(NewEmailEvent {
                lead_id: Some(lead.id),
                step_number: Some(1),
                event_type: EventType::Sent,
                ..Default::default()
            })
            .await
            .unwrap();

        record_open(&state, &sent.id.to_string()).await.unwrap();

        let all = events.list_for_lead(lead.id).await.unwrap();
        assert!(all.iter().any(|e| e.event_type == EventType::Opened));

        let lead = leads.get(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Opened);
        assert!(lead.opened_at.is_some());
    }

    #[tokio::test]
    async fn test_track_open_swallows_unknown_and_malformed_ids() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with_store(store);

        // Unknown id: fine, nothing recorded
        record_open(&state, &Uuid::new_v4().to_string())
            .await
            .unwrap();

        // Malformed id: the error is returned to the handler, which logs
        // it and still serves the pixel
        assert!(record_open(&state, "not-a-uuid").await.is_err());
    }
}
