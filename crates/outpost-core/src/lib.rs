//! Outpost Core - campaign dispatch and reply detection
//!
//! This crate provides the two batch engines at the heart of Outpost: the
//! dispatch engine, which decides which leads receive the next email in
//! their sequence and delivers it with tracking instrumentation, and the
//! reply engine, which polls mailboxes and correlates inbound replies to
//! previously sent messages.

pub mod dispatch;
pub mod reply;
pub mod template;
pub mod transport;

pub use dispatch::{DispatchConfig, DispatchEngine, DispatchReport};
pub use reply::{ImapFetcher, MailFetcher, ReplyEngine, ReplyReport};
pub use template::TemplateRenderer;
pub use transport::{MessageTransport, SmtpTransport};
