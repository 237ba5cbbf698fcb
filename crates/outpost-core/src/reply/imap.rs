//! Mailbox retrieval over IMAP
//!
//! The reply engine talks to mailboxes through the [`MailFetcher`] seam;
//! this module provides the real IMAP-over-TLS implementation. Fetching
//! with `RFC822` marks messages seen, so a message is only ever handed to
//! the engine once.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

const FETCH_TIMEOUT_SECS: u64 = 60;

/// IMAP connection parameters for one account
#[derive(Debug, Clone)]
pub struct ImapParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// One fetched message, raw RFC822 bytes
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub bytes: Vec<u8>,
}

/// Mailbox retrieval errors. All of these are per-account conditions the
/// reply engine records and moves past.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Mailbox operation timed out")]
    Timeout,
}

/// Mailbox retrieval seam
#[async_trait]
pub trait MailFetcher: Send + Sync {
    /// Fetch unseen inbox messages, marking them seen
    async fn fetch_unseen(&self, params: &ImapParams) -> Result<Vec<RawMessage>, FetchError>;
}

/// IMAP-over-TLS fetcher
pub struct ImapFetcher {
    timeout: Duration,
}

impl ImapFetcher {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
        }
    }
}

impl Default for ImapFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailFetcher for ImapFetcher {
    async fn fetch_unseen(&self, params: &ImapParams) -> Result<Vec<RawMessage>, FetchError> {
        tokio::time::timeout(self.timeout, fetch_inner(params))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

async fn fetch_inner(params: &ImapParams) -> Result<Vec<RawMessage>, FetchError> {
    let tcp = TcpStream::connect((params.host.as_str(), params.port))
        .await
        .map_err(|e| FetchError::Connect(e.to_string()))?;

    let tls = async_native_tls::TlsConnector::new();
    let stream = tls
        .connect(&params.host, tcp)
        .await
        .map_err(|e| FetchError::Connect(e.to_string()))?;

    let client = async_imap::Client::new(stream);
    let mut session = client
        .login(&params.username, &params.password)
        .await
        .map_err(|(e, _)| FetchError::Auth(e.to_string()))?;

    // Run the mailbox operations, then log out unconditionally so the
    // session is never leaked when the fetch loop fails
    let result = async {
        session
            .select("INBOX")
            .await
            .map_err(|e| FetchError::Protocol(e.to_string()))?;

        let unseen = session
            .search("UNSEEN")
            .await
            .map_err(|e| FetchError::Protocol(e.to_string()))?;
        if unseen.is_empty() {
            return Ok(Vec::new());
        }

        let sequence_set = unseen
            .iter()
            .map(|seq| seq.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut messages = Vec::new();
        {
            let mut fetches = session
                .fetch(&sequence_set, "RFC822")
                .await
                .map_err(|e| FetchError::Protocol(e.to_string()))?;

            while let Some(fetch) = fetches
                .try_next()
                .await
                .map_err(|e| FetchError::Protocol(e.to_string()))?
            {
                if let Some(body) = fetch.body() {
                    messages.push(RawMessage {
                        bytes: body.to_vec(),
                    });
                }
            }
        }

        Ok(messages)
    }
    .await;

    if let Err(e) = session.logout().await {
        debug!(host = %params.host, "IMAP logout failed: {}", e);
    }

    result
}
