//! Common types for Outpost

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for lead lists
pub type LeadListId = Uuid;

/// Unique identifier for leads
pub type LeadId = Uuid;

/// Unique identifier for sequence steps
pub type SequenceStepId = Uuid;

/// Unique identifier for sending accounts
pub type SendingAccountId = Uuid;

/// Unique identifier for email events
pub type EmailEventId = Uuid;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Lead status
///
/// The status reflects the most advanced event observed for the lead.
/// Transitions are enforced centrally by [`LeadStatus::can_transition_to`]
/// rather than by ad hoc writes at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Active,
    Sent,
    Opened,
    Replied,
    Bounced,
    Unsubscribed,
    Completed,
}

impl LeadStatus {
    /// Transition table for lead status updates.
    ///
    /// Allowed: active -> sent, sent -> opened, * -> replied, * -> bounced,
    /// * -> unsubscribed. Everything else is rejected, so a lead that has
    /// already replied can never be reset to `sent` or downgraded to
    /// `opened` by a late tracking hit.
    ///
    /// Note that `* -> replied` includes `bounced` and `unsubscribed`: a
    /// reply overwrites those states. That matches the historical reply
    /// handler and is kept on purpose (see DESIGN.md).
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, next),
            (Active, Sent) | (Sent, Opened) | (_, Replied) | (_, Bounced) | (_, Unsubscribed)
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::Active => write!(f, "active"),
            LeadStatus::Sent => write!(f, "sent"),
            LeadStatus::Opened => write!(f, "opened"),
            LeadStatus::Replied => write!(f, "replied"),
            LeadStatus::Bounced => write!(f, "bounced"),
            LeadStatus::Unsubscribed => write!(f, "unsubscribed"),
            LeadStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Sending account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Paused,
    Error,
    Warming,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Paused => write!(f, "paused"),
            AccountStatus::Error => write!(f, "error"),
            AccountStatus::Warming => write!(f, "warming"),
        }
    }
}

/// Email event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sent,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Unsubscribed,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Sent => write!(f, "sent"),
            EventType::Opened => write!(f, "opened"),
            EventType::Clicked => write!(f, "clicked"),
            EventType::Replied => write!(f, "replied"),
            EventType::Bounced => write!(f, "bounced"),
            EventType::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_status_forward_transitions() {
        assert!(LeadStatus::Active.can_transition_to(LeadStatus::Sent));
        assert!(LeadStatus::Sent.can_transition_to(LeadStatus::Opened));
        assert!(LeadStatus::Opened.can_transition_to(LeadStatus::Replied));
        assert!(LeadStatus::Active.can_transition_to(LeadStatus::Unsubscribed));
    }

    #[test]
    fn test_lead_status_never_downgrades() {
        assert!(!LeadStatus::Replied.can_transition_to(LeadStatus::Sent));
        assert!(!LeadStatus::Replied.can_transition_to(LeadStatus::Opened));
        assert!(!LeadStatus::Opened.can_transition_to(LeadStatus::Sent));
        assert!(!LeadStatus::Sent.can_transition_to(LeadStatus::Sent));
    }

    #[test]
    fn test_reply_overwrites_terminal_states() {
        // Kept behavior: a detected reply wins over bounced/unsubscribed.
        assert!(LeadStatus::Bounced.can_transition_to(LeadStatus::Replied));
        assert!(LeadStatus::Unsubscribed.can_transition_to(LeadStatus::Replied));
    }

    #[test]
    fn test_status_serde_round_trip() {
        let json = serde_json::to_string(&LeadStatus::Unsubscribed).unwrap();
        assert_eq!(json, "\"unsubscribed\"");
        let back: LeadStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LeadStatus::Unsubscribed);

        assert_eq!(
            serde_json::to_string(&CampaignStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(serde_json::to_string(&EventType::Sent).unwrap(), "\"sent\"");
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(EventType::Replied.to_string(), "replied");
        assert_eq!(AccountStatus::Warming.to_string(), "warming");
        assert_eq!(CampaignStatus::Draft.to_string(), "draft");
    }
}
