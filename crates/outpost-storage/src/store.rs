//! Entity store contract
//!
//! Outpost persists every entity through a generic key-value store of JSON
//! records. The store assigns identifiers and `created_at`/`updated_at`
//! timestamps on create, refreshes `updated_at` on update, and maintains
//! membership sets so records can be listed globally, per owner, or by an
//! indexed field value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// A stored entity: a flat JSON object
pub type Record = serde_json::Map<String, Value>;

/// Entity kind names used as key prefixes
pub mod kind {
    pub const CAMPAIGNS: &str = "campaigns";
    pub const LEADS: &str = "leads";
    pub const EMAIL_SEQUENCES: &str = "email_sequences";
    pub const SENDING_ACCOUNTS: &str = "sending_accounts";
    pub const EMAIL_EVENTS: &str = "email_events";
}

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Corrupt {kind} record {id}: {reason}")]
    Corrupt {
        kind: String,
        id: String,
        reason: String,
    },
}

/// Generic entity store
///
/// Listing order: [`Store::list_all`] and [`Store::list_by_owner`] return
/// records newest-first; [`Store::list_by_field`] returns them oldest-first,
/// which is the iteration order batch passes rely on for determinism.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a record. The store assigns `id`, `created_at` and
    /// `updated_at`, and stamps `user_id` when an owner is given.
    async fn create(
        &self,
        kind: &str,
        data: Record,
        owner: Option<Uuid>,
    ) -> Result<Record, StoreError>;

    /// Fetch a record by id
    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<Record>, StoreError>;

    /// Merge `patch` into an existing record, refreshing `updated_at`.
    /// Returns the updated record, or `None` when the id is unknown.
    async fn update(&self, kind: &str, id: Uuid, patch: Record)
        -> Result<Option<Record>, StoreError>;

    /// Delete a record. Returns whether anything was removed.
    async fn delete(&self, kind: &str, id: Uuid) -> Result<bool, StoreError>;

    /// List every record of a kind, newest-first
    async fn list_all(&self, kind: &str) -> Result<Vec<Record>, StoreError>;

    /// List records owned by a user, newest-first
    async fn list_by_owner(&self, kind: &str, owner: Uuid) -> Result<Vec<Record>, StoreError>;

    /// List records previously indexed under `field = value`, oldest-first
    async fn list_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError>;

    /// Add a record to the `field = value` index
    async fn index_by_field(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Remove a record from the `field = value` index
    async fn remove_from_index(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Atomically add `delta` to an integer field, treating a missing field
    /// as zero. Returns the new value, or `None` when the id is unknown.
    ///
    /// Counter updates must go through this rather than read-then-update,
    /// so overlapping batch passes cannot lose increments.
    async fn increment(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        delta: i64,
    ) -> Result<Option<i64>, StoreError>;

    /// Backend liveness check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Stamp a new record with id, timestamps and owner
pub(crate) fn stamp_new(data: Record, owner: Option<Uuid>) -> (Uuid, Record) {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut record = Record::new();
    record.insert("id".to_string(), Value::String(id.to_string()));
    record.insert("created_at".to_string(), Value::String(now.to_rfc3339()));
    record.insert("updated_at".to_string(), Value::String(now.to_rfc3339()));
    for (key, value) in data {
        record.insert(key, value);
    }
    if let Some(owner) = owner {
        record.insert("user_id".to_string(), Value::String(owner.to_string()));
    }

    (id, record)
}

/// Merge a patch into a record, refreshing `updated_at`
pub(crate) fn apply_patch(mut record: Record, patch: Record) -> Record {
    for (key, value) in patch {
        record.insert(key, value);
    }
    record.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    record
}

/// Parse a record's `created_at` for sorting; unparseable values sort first
pub(crate) fn created_at(record: &Record) -> DateTime<Utc> {
    record
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn sort_newest_first(records: &mut [Record]) {
    records.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
}

pub(crate) fn sort_oldest_first(records: &mut [Record]) {
    records.sort_by_key(created_at);
}

/// Serialize a JSON record for storage
pub(crate) fn encode(record: &Record) -> Result<String, StoreError> {
    serde_json::to_string(&Value::Object(record.clone()))
        .map_err(|e| StoreError::Backend(format!("Failed to encode record: {}", e)))
}

/// Deserialize a stored JSON record
pub(crate) fn decode(kind: &str, id: &str, raw: &str) -> Result<Record, StoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Corrupt {
            kind: kind.to_string(),
            id: id.to_string(),
            reason: "not a JSON object".to_string(),
        }),
        Err(e) => Err(StoreError::Corrupt {
            kind: kind.to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        }),
    }
}
