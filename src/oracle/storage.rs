//! Storage abstraction for the known-entity registry.
//!
//! Defines the persistence contract so the registry service can run against
//! an in-memory map (tests, fallback) or a durable SQLite store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::oracle::types::KnownEntityRecord;

/// Formal contract for persistent known-entity storage.
#[async_trait]
pub trait KnownEntityStorage: Send + Sync {
    /// Looks up an identity and, when present, increments its detection
    /// counter. Returns the record as it is after the increment.
    async fn lookup_and_count(&self, identity: &str) -> Result<Option<KnownEntityRecord>>;

    /// Inserts the record unless the identity is already present.
    /// Returns `true` if the record was inserted.
    async fn insert_if_absent(&self, record: &KnownEntityRecord) -> Result<bool>;

    /// Reads a record without touching its counter.
    async fn get(&self, identity: &str) -> Result<Option<KnownEntityRecord>>;

    /// Number of flagged identities.
    async fn count(&self) -> Result<i64>;

    /// Health check for the storage backend.
    async fn health_check(&self) -> Result<bool>;
}

/// In-memory storage backed by a mutex-protected map.
#[derive(Default)]
pub struct MemoryEntityStorage {
    records: Mutex<HashMap<String, KnownEntityRecord>>,
}

impl MemoryEntityStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnownEntityStorage for MemoryEntityStorage {
    async fn lookup_and_count(&self, identity: &str) -> Result<Option<KnownEntityRecord>> {
        let mut records = self.records.lock().await;
        Ok(records.get_mut(identity).map(|record| {
            record.detection_count += 1;
            record.clone()
        }))
    }

    async fn insert_if_absent(&self, record: &KnownEntityRecord) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.identity) {
            return Ok(false);
        }
        records.insert(record.identity.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, identity: &str) -> Result<Option<KnownEntityRecord>> {
        Ok(self.records.lock().await.get(identity).cloned())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.records.lock().await.len() as i64)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;
    use chrono::Utc;

    fn record(identity: &str) -> KnownEntityRecord {
        KnownEntityRecord {
            identity: identity.to_string(),
            first_token: "FirstToken111".to_string(),
            verdict: Verdict::Danger,
            reason: "rug".to_string(),
            flagged_at: Utc::now(),
            detection_count: 1,
        }
    }

    #[tokio::test]
    async fn test_lookup_counts_only_hits() {
        let storage = MemoryEntityStorage::new();
        assert!(storage.lookup_and_count("nobody").await.unwrap().is_none());

        storage.insert_if_absent(&record("dev")).await.unwrap();
        let hit = storage.lookup_and_count("dev").await.unwrap().unwrap();
        assert_eq!(hit.detection_count, 2);
        assert_eq!(storage.get("dev").await.unwrap().unwrap().detection_count, 2);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let storage = MemoryEntityStorage::new();
        assert!(storage.insert_if_absent(&record("dev")).await.unwrap());

        let mut changed = record("dev");
        changed.reason = "different".to_string();
        assert!(!storage.insert_if_absent(&changed).await.unwrap());

        assert_eq!(storage.get("dev").await.unwrap().unwrap().reason, "rug");
        assert_eq!(storage.count().await.unwrap(), 1);
    }
}
