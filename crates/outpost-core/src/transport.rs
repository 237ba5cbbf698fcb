//! Message Transport - sends one formatted email over authenticated SMTP
//!
//! Failures are returned as data, never raised: callers batch over many
//! leads and a single refused recipient must not abort the run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;
use uuid::Uuid;

const SEND_TIMEOUT_SECS: u64 = 30;

/// SMTP submission parameters for one send
#[derive(Debug, Clone)]
pub struct SmtpParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// One outbound email, fully rendered
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from_name: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub html_body: String,
}

/// Result of a send attempt
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Delivered to the submission server; `message_id` is the bare
    /// provider identifier (no angle brackets)
    Delivered { message_id: String },
    /// Submission failed; the error is data for the caller's report
    Failed { error: String },
}

/// Message transport seam
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, params: &SmtpParams, mail: &OutboundEmail) -> SendOutcome;
}

/// STARTTLS SMTP transport
pub struct SmtpTransport;

impl SmtpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageTransport for SmtpTransport {
    async fn send(&self, params: &SmtpParams, mail: &OutboundEmail) -> SendOutcome {
        let from_header = match &mail.from_name {
            Some(name) => format!("{} <{}>", name, mail.from_address),
            None => mail.from_address.clone(),
        };
        let from: Mailbox = match from_header.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Invalid from address: {}", e),
                };
            }
        };

        let to: Mailbox = match mail.to_address.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Invalid to address: {}", e),
                };
            }
        };

        let message_id = generate_message_id(&mail.from_address);

        let email = match Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .message_id(Some(format!("<{}>", message_id)))
            .multipart(
                MultiPart::alternative().singlepart(SinglePart::html(mail.html_body.clone())),
            ) {
            Ok(e) => e,
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Failed to build email: {}", e),
                };
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&params.host) {
            Ok(t) => t.port(params.port),
            Err(e) => {
                return SendOutcome::Failed {
                    error: format!("Failed to create SMTP transport: {}", e),
                };
            }
        };

        let mailer = transport
            .credentials(Credentials::new(
                params.username.clone(),
                params.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(SEND_TIMEOUT_SECS)))
            .build();

        debug!(
            to = %mail.to_address,
            host = %params.host,
            port = params.port,
            "Submitting email"
        );

        match mailer.send(email).await {
            Ok(_) => SendOutcome::Delivered { message_id },
            Err(e) => SendOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Self-assigned Message-ID so replies can be correlated later; returned
/// bare, set on the wire in angle-bracket form.
fn generate_message_id(from_address: &str) -> String {
    let domain = from_address.rsplit('@').next().unwrap_or("outpost");
    format!("{}.{}@{}", Uuid::new_v4(), Utc::now().timestamp(), domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_uses_sender_domain() {
        let id = generate_message_id("out@example.com");
        assert!(id.ends_with("@example.com"));
        assert!(!id.contains('<'));
        assert!(!id.contains('>'));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = generate_message_id("out@example.com");
        let b = generate_message_id("out@example.com");
        assert_ne!(a, b);
    }
}
