//! In-memory entity store
//!
//! Mirrors the Redis key layout with in-process maps. Backs unit tests and
//! local experimentation; every operation takes the single inner lock, so
//! increments are trivially atomic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{
    apply_patch, sort_newest_first, sort_oldest_first, stamp_new, Record, Store, StoreError,
};

#[derive(Default)]
struct Inner {
    records: HashMap<String, Record>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
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

    fn collect(inner: &Inner, kind: &str, set_key: &str) -> Vec<Record> {
        inner
            .sets
            .get(set_key)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.records.get(&Self::data_key(kind, id)).cloned())
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(
        &self,
        kind: &str,
        data: Record,
        owner: Option<Uuid>,
    ) -> Result<Record, StoreError> {
        let (id, record) = stamp_new(data, owner);
        let mut inner = self.inner.lock().await;

        inner
            .records
            .insert(Self::data_key(kind, &id.to_string()), record.clone());
        inner
            .sets
            .entry(Self::all_key(kind))
            .or_default()
            .insert(id.to_string());
        if let Some(owner) = owner {
            inner
                .sets
                .entry(Self::owner_key(kind, owner))
                .or_default()
                .insert(id.to_string());
        }

        Ok(record)
    }

    async fn get(&self, kind: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .get(&Self::data_key(kind, &id.to_string()))
            .cloned())
    }

    async fn update(
        &self,
        kind: &str,
        id: Uuid,
        patch: Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = Self::data_key(kind, &id.to_string());

        let Some(existing) = inner.records.get(&key).cloned() else {
            return Ok(None);
        };

        let updated = apply_patch(existing, patch);
        inner.records.insert(key, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, kind: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = Self::data_key(kind, &id.to_string());

        let Some(existing) = inner.records.remove(&key) else {
            return Ok(false);
        };

        if let Some(all) = inner.sets.get_mut(&Self::all_key(kind)) {
            all.remove(&id.to_string());
        }
        if let Some(owner) = existing.get("user_id").and_then(Value::as_str) {
            if let Ok(owner) = owner.parse::<Uuid>() {
                if let Some(set) = inner.sets.get_mut(&Self::owner_key(kind, owner)) {
                    set.remove(&id.to_string());
                }
            }
        }

        Ok(true)
    }

    async fn list_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records = Self::collect(&inner, kind, &Self::all_key(kind));
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_owner(&self, kind: &str, owner: Uuid) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records = Self::collect(&inner, kind, &Self::owner_key(kind, owner));
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.lock().await;
        let mut records = Self::collect(&inner, kind, &Self::field_key(kind, field, value));
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
        let mut inner = self.inner.lock().await;
        inner
            .sets
            .entry(Self::field_key(kind, field, value))
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    async fn remove_from_index(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(set) = inner.sets.get_mut(&Self::field_key(kind, field, value)) {
            set.remove(&id.to_string());
        }
        Ok(())
    }

    async fn increment(
        &self,
        kind: &str,
        id: Uuid,
        field: &str,
        delta: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = Self::data_key(kind, &id.to_string());

        let Some(record) = inner.records.get_mut(&key) else {
            return Ok(None);
        };

        let current = record.get(field).and_then(Value::as_i64).unwrap_or(0);
        let new_value = current + delta;
        record.insert(field.to_string(), Value::from(new_value));
        record.insert(
            "updated_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );

        Ok(Some(new_value))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kind;
    use serde_json::json;
    use std::sync::Arc;

    fn data(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn record_id(record: &Record) -> Uuid {
        record
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_stamps_identity_and_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let record = store
            .create(kind::CAMPAIGNS, data(&[("name", json!("Launch"))]), Some(owner))
            .await
            .unwrap();

        assert!(record.contains_key("id"));
        assert!(record.contains_key("created_at"));
        assert!(record.contains_key("updated_at"));
        assert_eq!(record["user_id"], json!(owner.to_string()));

        let by_owner = store.list_by_owner(kind::CAMPAIGNS, owner).await.unwrap();
        assert_eq!(by_owner.len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_other_fields() {
        let store = MemoryStore::new();
        let record = store
            .create(
                kind::LEADS,
                data(&[("email", json!("a@x.com")), ("status", json!("active"))]),
                None,
            )
            .await
            .unwrap();
        let id = record_id(&record);

        let updated = store
            .update(kind::LEADS, id, data(&[("status", json!("sent"))]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated["status"], json!("sent"));
        assert_eq!(updated["email"], json!("a@x.com"));

        let missing = store
            .update(kind::LEADS, Uuid::new_v4(), data(&[("status", json!("sent"))]))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_field_index_round_trip() {
        let store = MemoryStore::new();
        let list_id = Uuid::new_v4().to_string();

        let record = store
            .create(kind::LEADS, data(&[("email", json!("a@x.com"))]), None)
            .await
            .unwrap();
        let id = record_id(&record);

        store
            .index_by_field(kind::LEADS, id, "lead_list_id", &list_id)
            .await
            .unwrap();
        let listed = store
            .list_by_field(kind::LEADS, "lead_list_id", &list_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        store
            .remove_from_index(kind::LEADS, id, "lead_list_id", &list_id)
            .await
            .unwrap();
        let listed = store
            .list_by_field(kind::LEADS, "lead_list_id", &list_id)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_increment_is_atomic_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let record = store
            .create(kind::CAMPAIGNS, data(&[("sent_count", json!(0))]), None)
            .await
            .unwrap();
        let id = record_id(&record);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .increment(kind::CAMPAIGNS, id, "sent_count", 1)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get(kind::CAMPAIGNS, id).await.unwrap().unwrap();
        assert_eq!(record["sent_count"], json!(50));
    }

    #[tokio::test]
    async fn test_increment_missing_record() {
        let store = MemoryStore::new();
        let result = store
            .increment(kind::CAMPAIGNS, Uuid::new_v4(), "sent_count", 1)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_membership() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let record = store
            .create(kind::CAMPAIGNS, data(&[("name", json!("X"))]), Some(owner))
            .await
            .unwrap();
        let id = record_id(&record);

        assert!(store.delete(kind::CAMPAIGNS, id).await.unwrap());
        assert!(!store.delete(kind::CAMPAIGNS, id).await.unwrap());
        assert!(store.list_all(kind::CAMPAIGNS).await.unwrap().is_empty());
        assert!(store
            .list_by_owner(kind::CAMPAIGNS, owner)
            .await
            .unwrap()
            .is_empty());
    }
}
