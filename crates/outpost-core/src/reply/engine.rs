//! Reply Engine - polls mailboxes and correlates inbound replies to sent
//! messages
//!
//! For every active account with a retrieval endpoint, the engine fetches
//! unseen messages, reads each message's `In-Reply-To` reference, and looks
//! for the `sent` event carrying that provider message id. A match appends
//! a `replied` event, moves the lead to `replied`, and bumps the campaign's
//! reply counter. One account's failure never blocks the others.

use std::sync::Arc;

use mail_parser::{HeaderValue, MessageParser};
use outpost_common::types::{CampaignId, EventType, LeadId, LeadStatus};
use outpost_storage::{
    CampaignCounter, CampaignRepository, EmailEventRepository, LeadRepository, NewEmailEvent,
    SendingAccount, SendingAccountRepository, Store, StoreError,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::imap::{FetchError, ImapParams, MailFetcher, RawMessage};

/// Reply pass errors. Mailbox failures stay per-account; only storage
/// failures are unexpected enough to end the pass.
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Report for one reply-checking pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplyReport {
    pub outcomes: Vec<ReplyOutcome>,
    /// Whether the pass was cancelled before finishing
    pub cancelled: bool,
    /// Set only when the pass as a whole failed unexpectedly
    pub error: Option<String>,
}

impl ReplyReport {
    /// Number of replies detected this pass
    pub fn reply_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ReplyOutcome::ReplyDetected { .. }))
            .count()
    }
}

/// Per-account outcome: a detected reply, or the account's error as data
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    ReplyDetected {
        account: String,
        lead_id: Option<LeadId>,
        campaign_id: Option<CampaignId>,
    },
    AccountError {
        account: String,
        error: String,
    },
}

/// Reply Engine
pub struct ReplyEngine {
    accounts: SendingAccountRepository,
    leads: LeadRepository,
    campaigns: CampaignRepository,
    events: EmailEventRepository,
    fetcher: Arc<dyn MailFetcher>,
}

impl ReplyEngine {
    /// Create a new reply engine
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn MailFetcher>) -> Self {
        Self {
            accounts: SendingAccountRepository::new(Arc::clone(&store)),
            leads: LeadRepository::new(Arc::clone(&store)),
            campaigns: CampaignRepository::new(Arc::clone(&store)),
            events: EmailEventRepository::new(store),
            fetcher,
        }
    }

    /// Run one reply-checking pass over every active account with a
    /// retrieval endpoint. Never fails: unexpected errors end the pass and
    /// are reported in the returned report's `error` field.
    pub async fn check_replies(&self, cancel: &CancellationToken) -> ReplyReport {
        let mut report = ReplyReport::default();

        info!("Starting reply check pass");

        if let Err(e) = self.run(cancel, &mut report).await {
            error!("Reply check pass failed: {}", e);
            report.error = Some(e.to_string());
        }

        info!(
            replies = report.reply_count(),
            cancelled = report.cancelled,
            "Reply check pass finished"
        );

        report
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        report: &mut ReplyReport,
    ) -> Result<(), ReplyError> {
        let accounts = self.accounts.list_imap_enabled().await?;
        info!("Checking {} account(s) for replies", accounts.len());

        for account in &accounts {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.check_account(account).await {
                Ok(outcomes) => report.outcomes.extend(outcomes),
                // Mailbox trouble is this account's problem only
                Err(ReplyError::Fetch(e)) => {
                    warn!(
                        account = %account.email_address,
                        "Reply check failed: {}",
                        e
                    );
                    report.outcomes.push(ReplyOutcome::AccountError {
                        account: account.email_address.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn check_account(
        &self,
        account: &SendingAccount,
    ) -> Result<Vec<ReplyOutcome>, ReplyError> {
        let Some(host) = account.imap_host.clone() else {
            return Ok(Vec::new());
        };

        let params = ImapParams {
            host,
            port: account.imap_port,
            username: account.imap_login().to_string(),
            password: account.imap_password.clone().unwrap_or_default(),
        };

        let messages = self.fetcher.fetch_unseen(&params).await?;
        debug!(
            account = %account.email_address,
            "Fetched {} unseen message(s)",
            messages.len()
        );

        let mut outcomes = Vec::new();
        for message in &messages {
            if let Some(outcome) = self.process_message(account, message).await? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Correlate one inbound message; `None` means it is not a reply to
    /// anything this system sent.
    async fn process_message(
        &self,
        account: &SendingAccount,
        message: &RawMessage,
    ) -> Result<Option<ReplyOutcome>, ReplyError> {
        let Some(parsed) = MessageParser::default().parse(&message.bytes) else {
            debug!("Skipping unparseable message");
            return Ok(None);
        };

        let reference = match parsed.in_reply_to() {
            HeaderValue::Text(text) => Some(text.to_string()),
            HeaderValue::TextList(list) => list.first().map(|text| text.to_string()),
            _ => None,
        };
        // Not every inbound message is a reply to a tracked send
        let Some(reference) = reference else {
            return Ok(None);
        };

        let reply_to_id = reference
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string();

        let Some(original) = self.events.find_sent_by_message_id(&reply_to_id).await? else {
            return Ok(None);
        };

        // Never mutate a lead owned by a different user than the account
        // being polled
        if let Some(lead_id) = original.lead_id {
            if let Some(lead) = self.leads.get(lead_id).await? {
                if lead.user_id != account.user_id {
                    warn!(
                        lead_id = %lead_id,
                        account = %account.email_address,
                        "Correlated lead owner differs from account owner, skipping"
                    );
                    return Ok(None);
                }
            }
        }

        self.events
            .record(NewEmailEvent {
                campaign_id: original.campaign_id,
                lead_id: original.lead_id,
                sequence_id: original.sequence_id,
                step_number: original.step_number,
                sending_account_id: Some(account.id),
                event_type: EventType::Replied,
                metadata: Some(json!({
                    "reply_to_message_id": reply_to_id,
                    "subject": parsed.subject().unwrap_or_default(),
                })),
                ..Default::default()
            })
            .await?;

        if let Some(lead_id) = original.lead_id {
            self.leads.transition(lead_id, LeadStatus::Replied).await?;
        }
        if let Some(campaign_id) = original.campaign_id {
            self.campaigns
                .bump_counter(campaign_id, CampaignCounter::Replied)
                .await?;
        }

        info!(
            account = %account.email_address,
            lead_id = ?original.lead_id,
            "Reply detected"
        );

        Ok(Some(ReplyOutcome::ReplyDetected {
            account: account.email_address.clone(),
            lead_id: original.lead_id,
            campaign_id: original.campaign_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_common::types::UserId;
    use outpost_storage::{
        MemoryStore, NewLead, NewSendingAccount,
    };
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Fetcher double keyed by host
    struct FakeFetcher {
        inboxes: HashMap<String, Vec<RawMessage>>,
        failing_hosts: Vec<String>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                inboxes: HashMap::new(),
                failing_hosts: Vec::new(),
            }
        }

        fn with_message(mut self, host: &str, raw: String) -> Self {
            self.inboxes
                .entry(host.to_string())
                .or_default()
                .push(RawMessage {
                    bytes: raw.into_bytes(),
                });
            self
        }

        fn failing(mut self, host: &str) -> Self {
            self.failing_hosts.push(host.to_string());
            self
        }
    }

    #[async_trait::async_trait]
    impl MailFetcher for FakeFetcher {
        async fn fetch_unseen(&self, params: &ImapParams) -> Result<Vec<RawMessage>, FetchError> {
            if self.failing_hosts.contains(&params.host) {
                return Err(FetchError::Auth("LOGIN failed".to_string()));
            }
            Ok(self.inboxes.get(&params.host).cloned().unwrap_or_default())
        }
    }

    fn reply_message(in_reply_to: Option<&str>, subject: &str) -> String {
        let mut raw = String::new();
        raw.push_str("From: prospect@external.com\r\n");
        raw.push_str("To: out@example.com\r\n");
        raw.push_str(&format!("Subject: {}\r\n", subject));
        if let Some(reference) = in_reply_to {
            raw.push_str(&format!("In-Reply-To: <{}>\r\n", reference));
        }
        raw.push_str("Message-ID: <r1@external.com>\r\n");
        raw.push_str("\r\nSounds interesting, tell me more.\r\n");
        raw
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        user_id: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                user_id: Uuid::new_v4(),
            }
        }

        fn engine(&self, fetcher: FakeFetcher) -> ReplyEngine {
            ReplyEngine::new(self.store.clone() as Arc<dyn Store>, Arc::new(fetcher))
        }

        fn leads(&self) -> LeadRepository {
            LeadRepository::new(self.store.clone() as Arc<dyn Store>)
        }

        fn events(&self) -> EmailEventRepository {
            EmailEventRepository::new(self.store.clone() as Arc<dyn Store>)
        }

        fn campaigns(&self) -> CampaignRepository {
            CampaignRepository::new(self.store.clone() as Arc<dyn Store>)
        }

        async fn seed_account(&self, user_id: UserId, host: &str) -> SendingAccount {
            let accounts = SendingAccountRepository::new(self.store.clone() as Arc<dyn Store>);
            let mut input = NewSendingAccount::active(user_id, "out@example.com");
            input.imap_host = Some(host.to_string());
            accounts.create(input).await.unwrap()
        }

        /// A lead with a delivered entry-step send carrying `message_id`
        async fn seed_sent(&self, user_id: UserId, message_id: &str) -> (Uuid, Uuid) {
            let campaign_id = Uuid::new_v4();
            let lead = self
                .leads()
                .create(NewLead::on_list(user_id, Uuid::new_v4(), "prospect@external.com"))
                .await
                .unwrap();
            self.leads().mark_sent(lead.id, 1).await.unwrap();

            self.events()
                .record(NewEmailEvent {
                    campaign_id: Some(campaign_id),
                    lead_id: Some(lead.id),
                    sequence_id: Some(Uuid::new_v4()),
                    step_number: Some(1),
                    event_type: EventType::Sent,
                    message_id: Some(message_id.to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();

            (campaign_id, lead.id)
        }
    }

    #[tokio::test]
    async fn test_reply_correlation() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;
        let (campaign_id, lead_id) = fx.seed_sent(fx.user_id, "abc@x").await;

        let fetcher = FakeFetcher::new()
            .with_message("imap.example.com", reply_message(Some("abc@x"), "Re: Hello"));
        let report = fx
            .engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        assert!(report.error.is_none());
        assert_eq!(report.reply_count(), 1);

        let events = fx.events().list_for_lead(lead_id).await.unwrap();
        let replied: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::Replied)
            .collect();
        assert_eq!(replied.len(), 1);
        assert_eq!(replied[0].campaign_id, Some(campaign_id));
        assert_eq!(replied[0].step_number, Some(1));

        let lead = fx.leads().get(lead_id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Replied);
        assert!(lead.replied_at.is_some());
    }

    #[tokio::test]
    async fn test_reply_bumps_campaign_counter() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;

        // Campaign record must exist for the counter to move
        let campaign = fx
            .campaigns()
            .create(outpost_storage::NewCampaign {
                user_id: fx.user_id,
                name: "Launch".to_string(),
                description: None,
                status: outpost_common::types::CampaignStatus::Active,
                sending_account_id: None,
                lead_list_id: None,
                daily_send_limit: 50,
                stop_on_reply: true,
            })
            .await
            .unwrap();

        let lead = fx
            .leads()
            .create(NewLead::on_list(fx.user_id, Uuid::new_v4(), "prospect@external.com"))
            .await
            .unwrap();
        fx.events()
            .record(NewEmailEvent {
                campaign_id: Some(campaign.id),
                lead_id: Some(lead.id),
                step_number: Some(1),
                event_type: EventType::Sent,
                message_id: Some("abc@x".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let fetcher = FakeFetcher::new()
            .with_message("imap.example.com", reply_message(Some("abc@x"), "Re: Hello"));
        fx.engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        let campaign = fx.campaigns().get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.replied_count, 1);
    }

    #[tokio::test]
    async fn test_message_without_reference_is_skipped() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;
        let (_, lead_id) = fx.seed_sent(fx.user_id, "abc@x").await;

        let fetcher = FakeFetcher::new()
            .with_message("imap.example.com", reply_message(None, "Newsletter"));
        let report = fx
            .engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        assert_eq!(report.reply_count(), 0);
        let events = fx.events().list_for_lead(lead_id).await.unwrap();
        assert!(events.iter().all(|e| e.event_type == EventType::Sent));
    }

    #[tokio::test]
    async fn test_unmatched_reference_is_skipped() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;
        fx.seed_sent(fx.user_id, "abc@x").await;

        let fetcher = FakeFetcher::new().with_message(
            "imap.example.com",
            reply_message(Some("unrelated@elsewhere"), "Re: Other thread"),
        );
        let report = fx
            .engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        assert_eq!(report.reply_count(), 0);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_account_failure_does_not_block_others() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "bad.example.com").await;
        fx.seed_account(fx.user_id, "imap.example.com").await;
        fx.seed_sent(fx.user_id, "abc@x").await;

        let fetcher = FakeFetcher::new()
            .failing("bad.example.com")
            .with_message("imap.example.com", reply_message(Some("abc@x"), "Re: Hello"));
        let report = fx
            .engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        assert!(report.error.is_none());
        assert_eq!(report.reply_count(), 1);
        assert!(report
            .outcomes
            .iter()
            .any(|o| matches!(o, ReplyOutcome::AccountError { .. })));
    }

    #[tokio::test]
    async fn test_cross_user_lead_is_never_touched() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;

        // Sent event belongs to a different user's lead
        let other_user = Uuid::new_v4();
        let (_, lead_id) = fx.seed_sent(other_user, "abc@x").await;

        let fetcher = FakeFetcher::new()
            .with_message("imap.example.com", reply_message(Some("abc@x"), "Re: Hello"));
        let report = fx
            .engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        assert_eq!(report.reply_count(), 0);
        let lead = fx.leads().get(lead_id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Sent);
    }

    #[tokio::test]
    async fn test_reply_overwrites_bounced_status() {
        // Kept policy: a detected reply wins over terminal states
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;
        let (_, lead_id) = fx.seed_sent(fx.user_id, "abc@x").await;
        fx.leads()
            .transition(lead_id, LeadStatus::Bounced)
            .await
            .unwrap();

        let fetcher = FakeFetcher::new()
            .with_message("imap.example.com", reply_message(Some("abc@x"), "Re: Hello"));
        fx.engine(fetcher)
            .check_replies(&CancellationToken::new())
            .await;

        let lead = fx.leads().get(lead_id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Replied);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_accounts() {
        let fx = Fixture::new();
        fx.seed_account(fx.user_id, "imap.example.com").await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fx.engine(FakeFetcher::new()).check_replies(&cancel).await;

        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
    }
}
