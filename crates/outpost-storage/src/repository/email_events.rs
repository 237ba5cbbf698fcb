//! Email event repository
//!
//! Events are the source of truth; lead and campaign fields are denormalized
//! caches of this log. Events are never updated except to attach the
//! provider message id or a transport error to a just-created `sent` event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outpost_common::types::{
    CampaignId, EmailEventId, EventType, LeadId, SendingAccountId, SequenceStepId,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{to_record, EmailEvent};
use crate::store::{kind, Record, Store, StoreError};

/// Input for recording an email event
#[derive(Debug, Clone, Serialize)]
pub struct NewEmailEvent {
    pub campaign_id: Option<CampaignId>,
    pub lead_id: Option<LeadId>,
    pub sequence_id: Option<SequenceStepId>,
    pub step_number: Option<i64>,
    pub sending_account_id: Option<SendingAccountId>,
    pub event_type: EventType,
    pub message_id: Option<String>,
    pub recipient_email: Option<String>,
    pub subject: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl Default for NewEmailEvent {
    fn default() -> Self {
        Self {
            campaign_id: None,
            lead_id: None,
            sequence_id: None,
            step_number: None,
            sending_account_id: None,
            event_type: EventType::Sent,
            message_id: None,
            recipient_email: None,
            subject: None,
            error_message: None,
            metadata: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Email event repository
#[derive(Clone)]
pub struct EmailEventRepository {
    store: Arc<dyn Store>,
}

impl EmailEventRepository {
    /// Create a new email event repository
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append an event and index it by lead and campaign
    pub async fn record(&self, input: NewEmailEvent) -> Result<EmailEvent, StoreError> {
        let data = to_record(&input)?;
        let record = self.store.create(kind::EMAIL_EVENTS, data, None).await?;
        let event = EmailEvent::from_record(record)?;

        if let Some(lead_id) = event.lead_id {
            self.store
                .index_by_field(kind::EMAIL_EVENTS, event.id, "lead_id", &lead_id.to_string())
                .await?;
        }
        if let Some(campaign_id) = event.campaign_id {
            self.store
                .index_by_field(
                    kind::EMAIL_EVENTS,
                    event.id,
                    "campaign_id",
                    &campaign_id.to_string(),
                )
                .await?;
        }

        Ok(event)
    }

    /// Get an event by id
    pub async fn get(&self, id: EmailEventId) -> Result<Option<EmailEvent>, StoreError> {
        let record = self.store.get(kind::EMAIL_EVENTS, id).await?;
        record.map(EmailEvent::from_record).transpose()
    }

    /// List a lead's events, oldest-first
    pub async fn list_for_lead(&self, lead_id: LeadId) -> Result<Vec<EmailEvent>, StoreError> {
        let records = self
            .store
            .list_by_field(kind::EMAIL_EVENTS, "lead_id", &lead_id.to_string())
            .await?;
        records.into_iter().map(EmailEvent::from_record).collect()
    }

    /// Count a campaign's events of one type
    pub async fn count_for_campaign(
        &self,
        campaign_id: CampaignId,
        event_type: EventType,
    ) -> Result<usize, StoreError> {
        let records = self
            .store
            .list_by_field(kind::EMAIL_EVENTS, "campaign_id", &campaign_id.to_string())
            .await?;

        let mut count = 0;
        for record in records {
            if EmailEvent::from_record(record)?.event_type == event_type {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether a `sent` event already exists for this campaign/lead/step.
    /// This is the at-most-once-per-step guard: a linear scan over the
    /// lead's event history, acceptable at this entity's cardinality.
    pub async fn has_sent(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
        step_number: i64,
    ) -> Result<bool, StoreError> {
        let events = self.list_for_lead(lead_id).await?;
        Ok(events.iter().any(|e| {
            e.event_type == EventType::Sent
                && e.campaign_id == Some(campaign_id)
                && e.step_number == Some(step_number)
        }))
    }

    /// Find the `sent` event carrying a provider message id. Scans the full
    /// log; inbound messages that match nothing are simply unrelated.
    pub async fn find_sent_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<EmailEvent>, StoreError> {
        let records = self.store.list_all(kind::EMAIL_EVENTS).await?;
        for record in records {
            let event = EmailEvent::from_record(record)?;
            if event.event_type == EventType::Sent
                && event.message_id.as_deref() == Some(message_id)
            {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Attach the provider message id after a successful send
    pub async fn set_message_id(
        &self,
        id: EmailEventId,
        message_id: &str,
    ) -> Result<Option<EmailEvent>, StoreError> {
        let mut patch = Record::new();
        patch.insert("message_id".to_string(), json!(message_id));

        let record = self.store.update(kind::EMAIL_EVENTS, id, patch).await?;
        record.map(EmailEvent::from_record).transpose()
    }

    /// Attach a transport error to the event
    pub async fn set_error(
        &self,
        id: EmailEventId,
        error: &str,
    ) -> Result<Option<EmailEvent>, StoreError> {
        let mut patch = Record::new();
        patch.insert("error_message".to_string(), json!(error));

        let record = self.store.update(kind::EMAIL_EVENTS, id, patch).await?;
        record.map(EmailEvent::from_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use uuid::Uuid;

    fn repo() -> EmailEventRepository {
        EmailEventRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_has_sent_matches_campaign_and_step() {
        let repo = repo();
        let campaign_id = Uuid::new_v4();
        let lead_id = Uuid::new_v4();

        repo.record(NewEmailEvent {
            campaign_id: Some(campaign_id),
            lead_id: Some(lead_id),
            step_number: Some(1),
            event_type: EventType::Sent,
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(repo.has_sent(campaign_id, lead_id, 1).await.unwrap());
        assert!(!repo.has_sent(campaign_id, lead_id, 2).await.unwrap());
        assert!(!repo.has_sent(Uuid::new_v4(), lead_id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_sent_by_message_id_ignores_other_event_types() {
        let repo = repo();
        let lead_id = Uuid::new_v4();

        repo.record(NewEmailEvent {
            lead_id: Some(lead_id),
            event_type: EventType::Replied,
            message_id: Some("abc@x".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(repo.find_sent_by_message_id("abc@x").await.unwrap().is_none());

        let sent = repo
            .record(NewEmailEvent {
                lead_id: Some(lead_id),
                event_type: EventType::Sent,
                message_id: Some("abc@x".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = repo
            .find_sent_by_message_id("abc@x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, sent.id);
    }

    #[tokio::test]
    async fn test_set_message_id_and_error() {
        let repo = repo();
        let event = repo
            .record(NewEmailEvent {
                event_type: EventType::Sent,
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = repo
            .set_message_id(event.id, "m1@x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.message_id.as_deref(), Some("m1@x"));

        let updated = repo.set_error(event.id, "boom").await.unwrap().unwrap();
        assert_eq!(updated.error_message.as_deref(), Some("boom"));
    }
}
