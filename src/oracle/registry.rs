//! Known-entity registry: the fast-path lookup of previously flagged creators.
//!
//! Storage failures never fail an investigation. A registry whose backing
//! store is unavailable behaves as if it were empty and logs every miss it
//! could not verify.

use crate::oracle::sqlite_registry::SqliteEntityStorage;
use crate::oracle::storage::{KnownEntityStorage, MemoryEntityStorage};
use crate::oracle::types::KnownEntityRecord;
use crate::types::Verdict;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct KnownEntityRegistry {
    storage: Option<Arc<dyn KnownEntityStorage>>,
}

impl KnownEntityRegistry {
    pub fn new(storage: Arc<dyn KnownEntityStorage>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEntityStorage::new()))
    }

    /// A registry with no backing store; the fast path never fires.
    pub fn disabled() -> Self {
        Self { storage: None }
    }

    /// Open the configured store. A connection failure degrades to a
    /// disabled registry instead of failing start-up.
    pub async fn open(database_url: Option<&str>) -> Self {
        match database_url {
            None => Self::in_memory(),
            Some(url) => match SqliteEntityStorage::connect(url).await {
                Ok(storage) => Self::new(Arc::new(storage)),
                Err(e) => {
                    warn!("Known-entity registry unavailable, fast path disabled: {:#}", e);
                    Self::disabled()
                }
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    /// Look up a creator identity, incrementing its detection counter on a hit.
    #[instrument(skip(self))]
    pub async fn lookup(&self, identity: &str) -> Option<KnownEntityRecord> {
        let storage = self.storage.as_ref()?;
        match storage.lookup_and_count(identity).await {
            Ok(Some(record)) => {
                info!(
                    "Known offender {} matched (flagged {}, {} detections)",
                    identity,
                    record.flagged_at.format("%Y-%m-%d"),
                    record.detection_count
                );
                Some(record)
            }
            Ok(None) => {
                debug!("No registry record for {}", identity);
                None
            }
            Err(e) => {
                warn!("Registry lookup failed for {}: {:#}", identity, e);
                None
            }
        }
    }

    /// Flag an identity unless it is already present.
    ///
    /// Returns `true` when the identity is flagged after the call, whether or
    /// not this call inserted it. Existing records are never modified.
    #[instrument(skip(self, reason))]
    pub async fn flag_if_absent(
        &self,
        identity: &str,
        token: &str,
        verdict: Verdict,
        reason: &str,
    ) -> Result<bool> {
        let Some(storage) = self.storage.as_ref() else {
            debug!("Registry disabled, not flagging {}", identity);
            return Ok(false);
        };

        let record = KnownEntityRecord {
            identity: identity.to_string(),
            first_token: token.to_string(),
            verdict,
            reason: reason.to_string(),
            flagged_at: Utc::now(),
            detection_count: 1,
        };

        if storage.insert_if_absent(&record).await? {
            info!("Flagged creator {} via token {}", identity, token);
        } else {
            debug!("Creator {} already flagged", identity);
        }
        Ok(true)
    }

    /// Read a record without counting a detection.
    pub async fn peek(&self, identity: &str) -> Option<KnownEntityRecord> {
        let storage = self.storage.as_ref()?;
        storage.get(identity).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct BrokenStorage;

    #[async_trait]
    impl KnownEntityStorage for BrokenStorage {
        async fn lookup_and_count(&self, _identity: &str) -> Result<Option<KnownEntityRecord>> {
            Err(anyhow!("database is locked"))
        }
        async fn insert_if_absent(&self, _record: &KnownEntityRecord) -> Result<bool> {
            Err(anyhow!("database is locked"))
        }
        async fn get(&self, _identity: &str) -> Result<Option<KnownEntityRecord>> {
            Err(anyhow!("database is locked"))
        }
        async fn count(&self) -> Result<i64> {
            Err(anyhow!("database is locked"))
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_flag_then_lookup() {
        let registry = KnownEntityRegistry::in_memory();
        assert!(registry.lookup("dev").await.is_none());

        assert!(registry
            .flag_if_absent("dev", "TokenA", Verdict::Danger, "honeypot")
            .await
            .unwrap());
        // Second flag keeps the original record
        assert!(registry
            .flag_if_absent("dev", "TokenB", Verdict::Danger, "other")
            .await
            .unwrap());

        let record = registry.lookup("dev").await.unwrap();
        assert_eq!(record.first_token, "TokenA");
        assert_eq!(record.reason, "honeypot");
        assert_eq!(record.detection_count, 2);
    }

    #[tokio::test]
    async fn test_broken_storage_degrades_to_miss() {
        let registry = KnownEntityRegistry::new(Arc::new(BrokenStorage));
        assert!(registry.lookup("dev").await.is_none());
        assert!(registry
            .flag_if_absent("dev", "TokenA", Verdict::Danger, "x")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_registry() {
        let registry = KnownEntityRegistry::disabled();
        assert!(!registry.is_enabled());
        assert!(registry.lookup("dev").await.is_none());
        assert!(!registry
            .flag_if_absent("dev", "TokenA", Verdict::Danger, "x")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_database_disables_registry() {
        let registry =
            KnownEntityRegistry::open(Some("sqlite:/nonexistent-dir/sub/registry.db")).await;
        assert!(!registry.is_enabled());
    }
}
