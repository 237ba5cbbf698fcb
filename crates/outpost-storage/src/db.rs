//! Redis-backed entity store
//!
//! Key layout:
//! - `{kind}:{id}` -> JSON record
//! - `{kind}:all` -> set of all ids of that kind
//! - `{kind}:by_user:{user_id}` -> set of ids owned by a user
//! - `{kind}:by_{field}:{value}` -> set of ids indexed under a field value

use async_trait::async_trait;
use chrono::Utc;
use outpost_common::config::StoreConfig;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;
use uuid::Uuid;

use crate::store::{
    apply_patch, decode, encode, sort_newest_first, sort_oldest_first, stamp_new, Record, Store,
    StoreError,
};

/// Atomic integer-field increment inside a stored JSON record
const INCREMENT_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return nil
end
local obj = cjson.decode(raw)
local new = (tonumber(obj[ARGV[1]]) or 0) + tonumber(ARGV[2])
obj[ARGV[1]] = new
obj['updated_at'] = ARGV[3]
redis.call('SET', KEYS[1], cjson.encode(obj))
return new
"#;

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    increment: redis::Script,
}

impl RedisStore {
    /// Connect to Redis from configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::Backend(format!("Invalid Redis URL: {}", e)))?;

        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        info!("Entity store connection established");

        Ok(Self {
            conn,
            increment: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    fn data_key(kind: &str, id: &str) -> String {
        format!("{}:{}", kind, id)
    }

    fn all_key(kind: &str) -> String {
        format!("{}:all", kind)
    }

    fn owner_key(kind: &str, owner: Uuid) -> String {
        format!("{}:by_user:{}", kind, owner)
    }

    fn field_key(kind: &str, field: &str, value: &str) -> String {
        format!("{}:by_{}:{}", kind, field, value)
    }

    async fn get_raw(&self, kind: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::data_key(kind, id))
            .await
            .map_err(backend)?;

        raw.map(|raw| decode(kind, id, &raw)).transpose()
    }

    async fn collect_members(&self, kind: &str, set_key: &str) -> Result<Vec<Record>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(set_key).await.map_err(backend)?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_raw(kind, &id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn create(
        &self,
        kind: &str,
        data: Record,
        owner: Option<Uuid>,
    ) -> Result<Record, StoreError> {
        let (id, record) = stamp_new(data, owner);
        let mut conn = self.conn.clone();

        let _: () = conn
            .set(Self::data_key(kind, &id.to_string()), encode(&record)?)
            .await
            .map_err(backend)?;
        let _: () = conn
            .sadd(Self::all_key(kind), id.to_string())
            .await
            .map_err(backend)?;
        if let Some(owner) = owner {
            let _: () = conn
                .sadd(Self::owner_key(kind, owner), id.to_string())
                .await
                .map_err(backend)?;
        }

        Ok(record)
    }

    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        self.get_raw(kind, &id.to_string()).await
    }

    async fn update(
        &self,
        kind: &str,
        id: Uuid,
        patch: Record,
    ) -> Result<Option<Record>, StoreError> {
        let Some(existing) = self.get_raw(kind, &id.to_string()).await? else {
            return Ok(None);
        };

        let updated = apply_patch(existing, patch);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(Self::data_key(kind, &id.to_string()), encode(&updated)?)
            .await
            .map_err(backend)?;

        Ok(Some(updated))
    }

    async fn delete(&self, kind: &str, id: Uuid) -> Result<bool, StoreError> {
        let Some(existing) = self.get_raw(kind, &id.to_string()).await? else {
            return Ok(false);
        };

        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::data_key(kind, &id.to_string()))
            .await
            .map_err(backend)?;
        let _: () = conn
            .srem(Self::all_key(kind), id.to_string())
            .await
            .map_err(backend)?;

        if let Some(owner) = existing.get("user_id").and_then(|v| v.as_str()) {
            if let Ok(owner) = owner.parse::<Uuid>() {
                let _: () = conn
                    .srem(Self::owner_key(kind, owner), id.to_string())
                    .await
                    .map_err(backend)?;
            }
        }

        Ok(true)
    }

    async fn list_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
        let mut records = self.collect_members(kind, &Self::all_key(kind)).await?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_owner(&self, kind: &str, owner: Uuid) -> Result<Vec<Record>, StoreError> {
        let mut records = self
            .collect_members(kind, &Self::owner_key(kind, owner))
            .await?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let mut records = self
            .collect_members(kind, &Self::field_key(kind, field, value))
            .await?;
        sort_oldest_first(&mut records);
        Ok(records)
    }

    async fn index_by_field(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(Self::field_key(kind, field, value), id.to_string())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn remove_from_index(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .srem(Self::field_key(kind, field, value), id.to_string())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn increment(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        delta: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let new_value: Option<i64> = self
            .increment
            .key(Self::data_key(kind, &id.to_string()))
            .arg(field)
            .arg(delta)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(new_value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
