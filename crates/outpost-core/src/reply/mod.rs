//! Reply engine - inbound reply detection

pub mod engine;
pub mod imap;

pub use engine::{ReplyEngine, ReplyOutcome, ReplyReport};
pub use imap::{FetchError, ImapFetcher, ImapParams, MailFetcher, RawMessage};
