//! Typed entity models
//!
//! Records come out of the store as untyped JSON; these structs validate
//! them at the boundary. Fields the rest of the application may legitimately
//! leave unset are optional or defaulted.

use chrono::{DateTime, Utc};
use outpost_common::types::{
    AccountStatus, CampaignId, CampaignStatus, EmailEventId, EventType, LeadId, LeadListId,
    LeadStatus, SendingAccountId, SequenceStepId, UserId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Record, StoreError};

/// Campaign model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: CampaignStatus,
    #[serde(default)]
    pub sending_account_id: Option<SendingAccountId>,
    #[serde(default)]
    pub lead_list_id: Option<LeadListId>,
    #[serde(default = "default_daily_send_limit")]
    pub daily_send_limit: i64,
    #[serde(default = "default_true")]
    pub stop_on_reply: bool,
    #[serde(default)]
    pub sent_count: i64,
    #[serde(default)]
    pub opened_count: i64,
    #[serde(default)]
    pub replied_count: i64,
    #[serde(default)]
    pub bounced_count: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        from_record(crate::kind::CAMPAIGNS, record)
    }
}

/// Sequence step model
///
/// Delay fields are stored for future multi-step scheduling; the dispatch
/// pass currently sends the entry step only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: SequenceStepId,
    pub campaign_id: CampaignId,
    pub step_number: i64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub delay_days: i64,
    #[serde(default)]
    pub delay_hours: i64,
    #[serde(default)]
    pub delay_minutes: i64,
    #[serde(default)]
    pub is_reply: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SequenceStep {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        from_record(crate::kind::EMAIL_SEQUENCES, record)
    }
}

/// Lead model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub user_id: UserId,
    #[serde(default)]
    pub lead_list_id: Option<LeadListId>,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub custom_fields: serde_json::Map<String, Value>,
    pub status: LeadStatus,
    #[serde(default)]
    pub current_step: Option<i64>,
    #[serde(default)]
    pub first_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bounced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        from_record(crate::kind::LEADS, record)
    }
}

/// Sending account model
///
/// Carries credentials for both mail submission (SMTP) and retrieval (IMAP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingAccount {
    pub id: SendingAccountId,
    pub user_id: UserId,
    pub email_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: AccountStatus,
    #[serde(default = "default_daily_send_limit")]
    pub daily_send_limit: i64,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub imap_host: Option<String>,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default)]
    pub imap_username: Option<String>,
    #[serde(default)]
    pub imap_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SendingAccount {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        from_record(crate::kind::SENDING_ACCOUNTS, record)
    }

    /// SMTP login, falling back to the mailbox address
    pub fn smtp_login(&self) -> &str {
        self.smtp_username.as_deref().unwrap_or(&self.email_address)
    }

    /// IMAP login, falling back to the mailbox address
    pub fn imap_login(&self) -> &str {
        self.imap_username.as_deref().unwrap_or(&self.email_address)
    }
}

/// Email event model (append-only log entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: EmailEventId,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    #[serde(default)]
    pub sequence_id: Option<SequenceStepId>,
    #[serde(default)]
    pub step_number: Option<i64>,
    #[serde(default)]
    pub sending_account_id: Option<SendingAccountId>,
    pub event_type: EventType,
    /// Provider message identifier, stored without angle brackets
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailEvent {
    pub fn from_record(record: Record) -> Result<Self, StoreError> {
        from_record(crate::kind::EMAIL_EVENTS, record)
    }
}

fn default_daily_send_limit() -> i64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_imap_port() -> u16 {
    993
}

/// Validate a raw record into a typed model
pub(crate) fn from_record<T: DeserializeOwned>(kind: &str, record: Record) -> Result<T, StoreError> {
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<missing id>")
        .to_string();

    serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::Corrupt {
        kind: kind.to_string(),
        id,
        reason: e.to_string(),
    })
}

/// Serialize a typed value into a record
pub(crate) fn to_record<T: Serialize>(value: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Backend(
            "Expected a JSON object when encoding record".to_string(),
        )),
        Err(e) => Err(StoreError::Backend(format!(
            "Failed to encode record: {}",
            e
        ))),
    }
}
