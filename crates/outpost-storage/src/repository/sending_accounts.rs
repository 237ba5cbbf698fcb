//! Sending account repository

use std::sync::Arc;

use outpost_common::types::{AccountStatus, SendingAccountId, UserId};
use serde::Serialize;

use crate::models::{to_record, SendingAccount};
use crate::store::{kind, Store, StoreError};

/// Input for creating a sending account
#[derive(Debug, Clone, Serialize)]
pub struct NewSendingAccount {
    #[serde(skip)]
    pub user_id: UserId,
    pub email_address: String,
    pub display_name: Option<String>,
    pub status: AccountStatus,
    pub daily_send_limit: i64,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub imap_host: Option<String>,
    pub imap_port: u16,
    pub imap_username: Option<String>,
    pub imap_password: Option<String>,
}

impl NewSendingAccount {
    /// An active account with protocol defaults and no explicit credentials
    pub fn active(user_id: UserId, email_address: impl Into<String>) -> Self {
        Self {
            user_id,
            email_address: email_address.into(),
            display_name: None,
            status: AccountStatus::Active,
            daily_send_limit: 50,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            imap_host: None,
            imap_port: 993,
            imap_username: None,
            imap_password: None,
        }
    }
}

/// Sending account repository
#[derive(Clone)]
pub struct SendingAccountRepository {
    store: Arc<dyn Store>,
}

impl SendingAccountRepository {
    /// Create a new sending account repository
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a sending account
    pub async fn create(&self, input: NewSendingAccount) -> Result<SendingAccount, StoreError> {
        let data = to_record(&input)?;
        let record = self
            .store
            .create(kind::SENDING_ACCOUNTS, data, Some(input.user_id))
            .await?;
        SendingAccount::from_record(record)
    }

    /// Get a sending account by id
    pub async fn get(&self, id: SendingAccountId) -> Result<Option<SendingAccount>, StoreError> {
        let record = self.store.get(kind::SENDING_ACCOUNTS, id).await?;
        record.map(SendingAccount::from_record).transpose()
    }

    /// List active accounts that have a retrieval endpoint configured
    pub async fn list_imap_enabled(&self) -> Result<Vec<SendingAccount>, StoreError> {
        let records = self.store.list_all(kind::SENDING_ACCOUNTS).await?;
        let mut accounts = Vec::new();
        for record in records {
            let account = SendingAccount::from_record(record)?;
            if account.status == AccountStatus::Active && account.imap_host.is_some() {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }
}
