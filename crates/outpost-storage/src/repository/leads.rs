//! Lead repository
//!
//! All status writes funnel through [`LeadRepository::mark_sent`] and
//! [`LeadRepository::transition`], which consult the central transition
//! table instead of overwriting blindly.

use std::sync::Arc;

use chrono::Utc;
use outpost_common::types::{CampaignId, LeadId, LeadListId, LeadStatus, UserId};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::{to_record, Lead};
use crate::store::{kind, Record, Store, StoreError};

/// Input for creating a lead
#[derive(Debug, Clone, Serialize)]
pub struct NewLead {
    #[serde(skip)]
    pub user_id: UserId,
    pub lead_list_id: Option<LeadListId>,
    pub campaign_id: Option<CampaignId>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Map<String, Value>,
    pub status: LeadStatus,
}

impl NewLead {
    /// A bare active lead on a list
    pub fn on_list(user_id: UserId, lead_list_id: LeadListId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            lead_list_id: Some(lead_list_id),
            campaign_id: None,
            email: email.into(),
            first_name: None,
            last_name: None,
            company: None,
            custom_fields: serde_json::Map::new(),
            status: LeadStatus::Active,
        }
    }
}

/// Lead repository
#[derive(Clone)]
pub struct LeadRepository {
    store: Arc<dyn Store>,
}

impl LeadRepository {
    /// Create a new lead repository
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a lead and index it by list and campaign
    pub async fn create(&self, input: NewLead) -> Result<Lead, StoreError> {
        let data = to_record(&input)?;
        let record = self
            .store
            .create(kind::LEADS, data, Some(input.user_id))
            .await?;
        let lead = Lead::from_record(record)?;

        if let Some(list_id) = lead.lead_list_id {
            self.store
                .index_by_field(kind::LEADS, lead.id, "lead_list_id", &list_id.to_string())
                .await?;
        }
        if let Some(campaign_id) = lead.campaign_id {
            self.store
                .index_by_field(kind::LEADS, lead.id, "campaign_id", &campaign_id.to_string())
                .await?;
        }

        Ok(lead)
    }

    /// Get a lead by id
    pub async fn get(&self, id: LeadId) -> Result<Option<Lead>, StoreError> {
        let record = self.store.get(kind::LEADS, id).await?;
        record.map(Lead::from_record).transpose()
    }

    /// List leads on a lead list, oldest-first
    pub async fn list_by_list(&self, list_id: LeadListId) -> Result<Vec<Lead>, StoreError> {
        let records = self
            .store
            .list_by_field(kind::LEADS, "lead_list_id", &list_id.to_string())
            .await?;
        records.into_iter().map(Lead::from_record).collect()
    }

    /// Record a successful entry-step send: status, step pointer and
    /// send timestamps in one update.
    pub async fn mark_sent(
        &self,
        id: LeadId,
        step_number: i64,
    ) -> Result<Option<Lead>, StoreError> {
        let Some(lead) = self.get(id).await? else {
            return Ok(None);
        };

        if !lead.status.can_transition_to(LeadStatus::Sent) {
            debug!(lead_id = %id, from = %lead.status, "Rejected lead transition to sent");
            return Ok(Some(lead));
        }

        let now = Utc::now();
        let mut patch = Record::new();
        patch.insert("status".to_string(), json!(LeadStatus::Sent));
        patch.insert("current_step".to_string(), json!(step_number));
        patch.insert("last_sent_at".to_string(), json!(now));
        if lead.first_sent_at.is_none() {
            patch.insert("first_sent_at".to_string(), json!(now));
        }

        let record = self.store.update(kind::LEADS, id, patch).await?;
        record.map(Lead::from_record).transpose()
    }

    /// Apply a status transition, stamping the matching timestamp field.
    /// Disallowed transitions leave the lead untouched.
    pub async fn transition(
        &self,
        id: LeadId,
        next: LeadStatus,
    ) -> Result<Option<Lead>, StoreError> {
        let Some(lead) = self.get(id).await? else {
            return Ok(None);
        };

        if !lead.status.can_transition_to(next) {
            debug!(
                lead_id = %id,
                from = %lead.status,
                to = %next,
                "Rejected lead transition"
            );
            return Ok(Some(lead));
        }

        let mut patch = Record::new();
        patch.insert("status".to_string(), json!(next));
        if let Some(field) = timestamp_field(next) {
            patch.insert(field.to_string(), json!(Utc::now()));
        }

        let record = self.store.update(kind::LEADS, id, patch).await?;
        record.map(Lead::from_record).transpose()
    }
}

fn timestamp_field(status: LeadStatus) -> Option<&'static str> {
    match status {
        LeadStatus::Opened => Some("opened_at"),
        LeadStatus::Replied => Some("replied_at"),
        LeadStatus::Bounced => Some("bounced_at"),
        LeadStatus::Unsubscribed => Some("unsubscribed_at"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use uuid::Uuid;

    fn repo() -> LeadRepository {
        LeadRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_mark_sent_sets_step_and_timestamps() {
        let repo = repo();
        let lead = repo
            .create(NewLead::on_list(Uuid::new_v4(), Uuid::new_v4(), "a@x.com"))
            .await
            .unwrap();

        let updated = repo.mark_sent(lead.id, 1).await.unwrap().unwrap();
        assert_eq!(updated.status, LeadStatus::Sent);
        assert_eq!(updated.current_step, Some(1));
        assert!(updated.first_sent_at.is_some());
        assert!(updated.last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_replied_lead_is_never_reset_to_sent() {
        let repo = repo();
        let lead = repo
            .create(NewLead::on_list(Uuid::new_v4(), Uuid::new_v4(), "a@x.com"))
            .await
            .unwrap();

        repo.mark_sent(lead.id, 1).await.unwrap();
        repo.transition(lead.id, LeadStatus::Replied).await.unwrap();

        let after = repo.mark_sent(lead.id, 1).await.unwrap().unwrap();
        assert_eq!(after.status, LeadStatus::Replied);
        assert!(after.replied_at.is_some());
    }

    #[tokio::test]
    async fn test_open_does_not_downgrade_replied() {
        let repo = repo();
        let lead = repo
            .create(NewLead::on_list(Uuid::new_v4(), Uuid::new_v4(), "a@x.com"))
            .await
            .unwrap();

        repo.mark_sent(lead.id, 1).await.unwrap();
        repo.transition(lead.id, LeadStatus::Replied).await.unwrap();

        let after = repo
            .transition(lead.id, LeadStatus::Opened)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, LeadStatus::Replied);
        assert!(after.opened_at.is_none());
    }

    #[tokio::test]
    async fn test_list_by_list_is_scoped() {
        let repo = repo();
        let user = Uuid::new_v4();
        let list_a = Uuid::new_v4();
        let list_b = Uuid::new_v4();

        repo.create(NewLead::on_list(user, list_a, "a@x.com"))
            .await
            .unwrap();
        repo.create(NewLead::on_list(user, list_a, "b@x.com"))
            .await
            .unwrap();
        repo.create(NewLead::on_list(user, list_b, "c@x.com"))
            .await
            .unwrap();

        let listed = repo.list_by_list(list_a).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
