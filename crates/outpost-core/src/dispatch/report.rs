//! Dispatch pass reporting
//!
//! Per-item results are aggregated into a report instead of thrown, so the
//! failure of one lead or one campaign is structurally incapable of
//! aborting the rest of the batch.

use outpost_common::types::{CampaignId, LeadId};
use serde::Serialize;

/// Report for one dispatch pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// One entry per lead attempted this invocation
    pub outcomes: Vec<LeadOutcome>,
    /// Campaigns skipped over misconfiguration
    pub warnings: Vec<CampaignWarning>,
    /// Whether the pass was cancelled before finishing
    pub cancelled: bool,
    /// Set only when the pass as a whole failed unexpectedly
    pub error: Option<String>,
}

impl DispatchReport {
    /// Number of emails successfully sent this pass
    pub fn sent_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Sent))
            .count()
    }

    /// Number of leads whose send failed this pass
    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Error { .. }))
            .count()
    }
}

/// Outcome for one attempted lead
#[derive(Debug, Clone, Serialize)]
pub struct LeadOutcome {
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub recipient: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Whether the lead's email went out
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Sent,
    Error { error: String },
}

/// A campaign excluded from the pass, with the reason
#[derive(Debug, Clone, Serialize)]
pub struct CampaignWarning {
    pub campaign_id: CampaignId,
    pub campaign_name: String,
    pub reason: SkipReason,
}

/// Why a campaign was skipped. Misconfiguration is non-fatal: the campaign
/// is excluded from this run and everything else proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoLeadList,
    NoSendingAccount,
    AccountNotFound,
    NoSequenceSteps,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoLeadList => write!(f, "no lead list configured"),
            SkipReason::NoSendingAccount => write!(f, "no sending account configured"),
            SkipReason::AccountNotFound => write!(f, "sending account not found"),
            SkipReason::NoSequenceSteps => write!(f, "no sequence steps"),
        }
    }
}
