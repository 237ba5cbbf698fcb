//! Repository layer for data access

pub mod campaigns;
pub mod email_events;
pub mod leads;
pub mod sending_accounts;
pub mod sequences;

pub use campaigns::{CampaignCounter, CampaignRepository, NewCampaign};
pub use email_events::{EmailEventRepository, NewEmailEvent};
pub use leads::{LeadRepository, NewLead};
pub use sending_accounts::{NewSendingAccount, SendingAccountRepository};
pub use sequences::{NewSequenceStep, SequenceRepository};
