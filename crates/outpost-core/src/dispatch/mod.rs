//! Dispatch engine - campaign email delivery

pub mod engine;
pub mod report;
pub mod sequence;

pub use engine::{DispatchConfig, DispatchEngine};
pub use report::{CampaignWarning, DispatchReport, LeadOutcome, OutcomeStatus, SkipReason};
pub use sequence::SequenceResolver;
