//! Dispatch Engine - decides which leads receive the next sequence email,
//! performs idempotent delivery, and keeps derived state consistent
//!
//! One pass selects active campaigns, walks each campaign's eligible leads
//! up to its daily send limit, and records every attempt in the event log.
//! A `sent` event is created before transport is attempted, so there is an
//! auditable record even when submission fails; the lead transition and
//! campaign counter only move on success.

use std::collections::HashMap;
use std::sync::Arc;

use outpost_common::config::SmtpDefaults;
use outpost_common::types::{CampaignId, EmailEventId, EventType, LeadStatus};
use outpost_storage::{
    Campaign, CampaignCounter, CampaignRepository, EmailEventRepository, LeadRepository,
    NewEmailEvent, SendingAccount, SendingAccountRepository, SequenceRepository, Store, StoreError,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::report::{CampaignWarning, DispatchReport, LeadOutcome, OutcomeStatus, SkipReason};
use super::sequence::SequenceResolver;
use crate::template::TemplateRenderer;
use crate::transport::{MessageTransport, OutboundEmail, SendOutcome, SmtpParams};

/// Dispatch pass errors. Anything surfacing here is unexpected; per-lead
/// and per-campaign problems are report entries, not errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Dispatch engine configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base URL the tracking pixel points back at
    pub tracking_base_url: String,
    /// Fallback SMTP settings for accounts without their own host
    pub smtp_defaults: SmtpDefaults,
}

/// Dispatch Engine
pub struct DispatchEngine {
    campaigns: CampaignRepository,
    leads: LeadRepository,
    sequences: SequenceRepository,
    accounts: SendingAccountRepository,
    events: EmailEventRepository,
    transport: Arc<dyn MessageTransport>,
    renderer: TemplateRenderer,
    config: DispatchConfig,
    /// Per-campaign locks: overlapping passes in this process serialize on
    /// a campaign, so the already-sent check and the send stay paired
    locks: Mutex<HashMap<CampaignId, Arc<Mutex<()>>>>,
}

impl DispatchEngine {
    /// Create a new dispatch engine
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn MessageTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            campaigns: CampaignRepository::new(Arc::clone(&store)),
            leads: LeadRepository::new(Arc::clone(&store)),
            sequences: SequenceRepository::new(Arc::clone(&store)),
            accounts: SendingAccountRepository::new(Arc::clone(&store)),
            events: EmailEventRepository::new(store),
            transport,
            renderer: TemplateRenderer::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one dispatch pass over active campaigns, optionally narrowed to
    /// a single campaign. Never fails: unexpected errors end the pass and
    /// are reported in the returned report's `error` field.
    pub async fn dispatch(
        &self,
        campaign_filter: Option<CampaignId>,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        info!(campaign_id = ?campaign_filter, "Starting dispatch pass");

        if let Err(e) = self.run(campaign_filter, cancel, &mut report).await {
            error!("Dispatch pass failed: {}", e);
            report.error = Some(e.to_string());
        }

        info!(
            sent = report.sent_count(),
            failed = report.error_count(),
            warnings = report.warnings.len(),
            cancelled = report.cancelled,
            "Dispatch pass finished"
        );

        report
    }

    async fn run(
        &self,
        campaign_filter: Option<CampaignId>,
        cancel: &CancellationToken,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        let mut campaigns = self.campaigns.list_active().await?;
        if let Some(id) = campaign_filter {
            campaigns.retain(|c| c.id == id);
        }

        info!("Found {} active campaign(s) to process", campaigns.len());

        for campaign in &campaigns {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.process_campaign(campaign, cancel, report).await?;
        }

        Ok(())
    }

    async fn process_campaign(
        &self,
        campaign: &Campaign,
        cancel: &CancellationToken,
        report: &mut DispatchReport,
    ) -> Result<(), DispatchError> {
        let _guard = self.lock_campaign(campaign.id).await;

        info!(campaign = %campaign.name, "Processing campaign");

        let Some(list_id) = campaign.lead_list_id else {
            self.skip(campaign, SkipReason::NoLeadList, report);
            return Ok(());
        };

        let leads = self.leads.list_by_list(list_id).await?;
        let eligible: Vec<_> = leads
            .into_iter()
            .filter(|l| l.status == LeadStatus::Active)
            .collect();
        info!("Found {} active lead(s)", eligible.len());

        let Some(account_id) = campaign.sending_account_id else {
            self.skip(campaign, SkipReason::NoSendingAccount, report);
            return Ok(());
        };
        let Some(account) = self.accounts.get(account_id).await? else {
            self.skip(campaign, SkipReason::AccountNotFound, report);
            return Ok(());
        };
        info!(account = %account.email_address, "Using sending account");

        let steps = self.sequences.list_by_campaign(campaign.id).await?;
        if steps.is_empty() {
            self.skip(campaign, SkipReason::NoSequenceSteps, report);
            return Ok(());
        }

        let mut sent_this_run: i64 = 0;

        for lead in &eligible {
            if cancel.is_cancelled() {
                info!(campaign = %campaign.name, "Dispatch cancelled mid-campaign");
                report.cancelled = true;
                break;
            }

            // The limit counts successful sends for this invocation only
            if sent_this_run >= campaign.daily_send_limit {
                info!("Daily limit of {} reached", campaign.daily_send_limit);
                break;
            }

            // Never touch a lead owned by a different user than the campaign
            if lead.user_id != campaign.user_id {
                warn!(
                    lead_id = %lead.id,
                    campaign = %campaign.name,
                    "Lead owner differs from campaign owner, skipping"
                );
                continue;
            }

            let Some(step) = SequenceResolver::next_step(&steps, lead) else {
                continue;
            };

            // At-most-once per (campaign, lead, step), checked under the
            // campaign lock right before the event is written
            if self
                .events
                .has_sent(campaign.id, lead.id, step.step_number)
                .await?
            {
                continue;
            }

            let subject = self.renderer.render(&step.subject, lead);
            let body = self.renderer.render(&step.body, lead);

            // Written before transport so a failed send still leaves an
            // auditable record
            let event = self
                .events
                .record(NewEmailEvent {
                    campaign_id: Some(campaign.id),
                    lead_id: Some(lead.id),
                    sequence_id: Some(step.id),
                    step_number: Some(step.step_number),
                    sending_account_id: Some(account.id),
                    event_type: EventType::Sent,
                    recipient_email: Some(lead.email.clone()),
                    subject: Some(subject.clone()),
                    ..Default::default()
                })
                .await?;

            let mail = OutboundEmail {
                from_name: Some(
                    account
                        .display_name
                        .clone()
                        .unwrap_or_else(|| account.email_address.clone()),
                ),
                from_address: account.email_address.clone(),
                to_address: lead.email.clone(),
                subject,
                html_body: self.body_with_tracking_pixel(&body, event.id),
            };
            let params = self.smtp_params(&account);

            match self.transport.send(&params, &mail).await {
                SendOutcome::Delivered { message_id } => {
                    self.events.set_message_id(event.id, &message_id).await?;
                    self.leads.mark_sent(lead.id, step.step_number).await?;
                    self.campaigns
                        .bump_counter(campaign.id, CampaignCounter::Sent)
                        .await?;

                    sent_this_run += 1;
                    report.outcomes.push(LeadOutcome {
                        campaign_id: campaign.id,
                        lead_id: lead.id,
                        recipient: lead.email.clone(),
                        status: OutcomeStatus::Sent,
                    });
                    info!(recipient = %lead.email, "Email sent");
                }
                SendOutcome::Failed { error } => {
                    // Event keeps the failure; lead and campaign stay as
                    // they were so the next pass can retry
                    self.events.set_error(event.id, &error).await?;

                    report.outcomes.push(LeadOutcome {
                        campaign_id: campaign.id,
                        lead_id: lead.id,
                        recipient: lead.email.clone(),
                        status: OutcomeStatus::Error {
                            error: error.clone(),
                        },
                    });
                    error!(recipient = %lead.email, error = %error, "Failed to send email");
                }
            }
        }

        info!(campaign = %campaign.name, sent = sent_this_run, "Campaign pass complete");

        if !report.cancelled && sent_this_run > 0 {
            self.maybe_complete(campaign).await?;
        }

        Ok(())
    }

    /// Mark the campaign completed once no active leads remain on its list
    async fn maybe_complete(&self, campaign: &Campaign) -> Result<(), DispatchError> {
        let Some(list_id) = campaign.lead_list_id else {
            return Ok(());
        };

        let leads = self.leads.list_by_list(list_id).await?;
        let remaining = leads
            .iter()
            .filter(|l| l.status == LeadStatus::Active && l.user_id == campaign.user_id)
            .count();

        if remaining == 0 {
            self.campaigns.mark_completed(campaign.id).await?;
            info!(campaign = %campaign.name, "Campaign completed");
        }

        Ok(())
    }

    fn skip(&self, campaign: &Campaign, reason: SkipReason, report: &mut DispatchReport) {
        warn!(campaign = %campaign.name, "Skipping campaign: {}", reason);
        report.warnings.push(CampaignWarning {
            campaign_id: campaign.id,
            campaign_name: campaign.name.clone(),
            reason,
        });
    }

    async fn lock_campaign(&self, id: CampaignId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    fn smtp_params(&self, account: &SendingAccount) -> SmtpParams {
        let (host, port) = match &account.smtp_host {
            Some(host) => (host.clone(), account.smtp_port),
            None => (
                self.config.smtp_defaults.host.clone(),
                self.config.smtp_defaults.port,
            ),
        };

        SmtpParams {
            host,
            port,
            username: account.smtp_login().to_string(),
            password: account.smtp_password.clone().unwrap_or_default(),
        }
    }

    /// Wrap the rendered body and append the open-tracking pixel keyed by
    /// the sent event's id
    fn body_with_tracking_pixel(&self, body: &str, event_id: EmailEventId) -> String {
        let pixel = format!(
            r#"<img src="{}/email-events/track-open?id={}" width="1" height="1" style="display:none;" />"#,
            self.config.tracking_base_url.trim_end_matches('/'),
            event_id
        );
        format!("<div>{}</div>{}", body, pixel)
    }
}
