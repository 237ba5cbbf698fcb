//! Sequence step repository

use std::sync::Arc;

use outpost_common::types::CampaignId;
use serde::Serialize;

use crate::models::{to_record, SequenceStep};
use crate::store::{kind, Store, StoreError};

/// Input for creating a sequence step
#[derive(Debug, Clone, Serialize)]
pub struct NewSequenceStep {
    pub campaign_id: CampaignId,
    pub step_number: i64,
    pub subject: String,
    pub body: String,
    pub delay_days: i64,
    pub delay_hours: i64,
    pub delay_minutes: i64,
    pub is_reply: bool,
}

impl NewSequenceStep {
    /// A step with no delay configuration
    pub fn immediate(
        campaign_id: CampaignId,
        step_number: i64,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            step_number,
            subject: subject.into(),
            body: body.into(),
            delay_days: 0,
            delay_hours: 0,
            delay_minutes: 0,
            is_reply: false,
        }
    }
}

/// Sequence step repository
#[derive(Clone)]
pub struct SequenceRepository {
    store: Arc<dyn Store>,
}

impl SequenceRepository {
    /// Create a new sequence repository
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a step and index it by campaign
    pub async fn create(&self, input: NewSequenceStep) -> Result<SequenceStep, StoreError> {
        let data = to_record(&input)?;
        let record = self.store.create(kind::EMAIL_SEQUENCES, data, None).await?;
        let step = SequenceStep::from_record(record)?;

        self.store
            .index_by_field(
                kind::EMAIL_SEQUENCES,
                step.id,
                "campaign_id",
                &step.campaign_id.to_string(),
            )
            .await?;

        Ok(step)
    }

    /// List a campaign's steps sorted by step number ascending
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<SequenceStep>, StoreError> {
        let records = self
            .store
            .list_by_field(
                kind::EMAIL_SEQUENCES,
                "campaign_id",
                &campaign_id.to_string(),
            )
            .await?;

        let mut steps = records
            .into_iter()
            .map(SequenceStep::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }
}
