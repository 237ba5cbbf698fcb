//! Campaign repository

use std::sync::Arc;

use chrono::Utc;
use outpost_common::types::{
    CampaignId, CampaignStatus, LeadListId, SendingAccountId, UserId,
};
use serde::Serialize;
use serde_json::json;

use crate::models::{to_record, Campaign};
use crate::store::{kind, Record, Store, StoreError};

/// Denormalized campaign counters, kept in sync with the event log
#[derive(Debug, Clone, Copy)]
pub enum CampaignCounter {
    Sent,
    Opened,
    Replied,
}

impl CampaignCounter {
    fn field(self) -> &'static str {
        match self {
            CampaignCounter::Sent => "sent_count",
            CampaignCounter::Opened => "opened_count",
            CampaignCounter::Replied => "replied_count",
        }
    }
}

/// Input for creating a campaign
#[derive(Debug, Clone, Serialize)]
pub struct NewCampaign {
    #[serde(skip)]
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub status: CampaignStatus,
    pub sending_account_id: Option<SendingAccountId>,
    pub lead_list_id: Option<LeadListId>,
    pub daily_send_limit: i64,
    pub stop_on_reply: bool,
}

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    store: Arc<dyn Store>,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a campaign
    pub async fn create(&self, input: NewCampaign) -> Result<Campaign, StoreError> {
        let data = to_record(&input)?;
        let record = self
            .store
            .create(kind::CAMPAIGNS, data, Some(input.user_id))
            .await?;
        Campaign::from_record(record)
    }

    /// Get a campaign by id
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let record = self.store.get(kind::CAMPAIGNS, id).await?;
        record.map(Campaign::from_record).transpose()
    }

    /// List campaigns with `status = active`
    pub async fn list_active(&self) -> Result<Vec<Campaign>, StoreError> {
        let records = self.store.list_all(kind::CAMPAIGNS).await?;
        let mut campaigns = Vec::with_capacity(records.len());
        for record in records {
            let campaign = Campaign::from_record(record)?;
            if campaign.status == CampaignStatus::Active {
                campaigns.push(campaign);
            }
        }
        Ok(campaigns)
    }

    /// Atomically bump a counter by one
    pub async fn bump_counter(
        &self,
        id: CampaignId,
        counter: CampaignCounter,
    ) -> Result<Option<i64>, StoreError> {
        self.store
            .increment(kind::CAMPAIGNS, id, counter.field(), 1)
            .await
    }

    /// Mark a campaign completed
    pub async fn mark_completed(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let mut patch = Record::new();
        patch.insert("status".to_string(), json!(CampaignStatus::Completed));
        patch.insert("completed_at".to_string(), json!(Utc::now()));

        let record = self.store.update(kind::CAMPAIGNS, id, patch).await?;
        record.map(Campaign::from_record).transpose()
    }
}
