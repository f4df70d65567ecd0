//! Tests for the SQLite-backed known-entity registry

use chrono::Utc;
use std::sync::Arc;
use token_sentinel::oracle::{
    KnownEntityRecord, KnownEntityRegistry, KnownEntityStorage, SqliteEntityStorage,
};
use token_sentinel::Verdict;

fn create_test_record(identity: &str) -> KnownEntityRecord {
    KnownEntityRecord {
        identity: identity.to_string(),
        first_token: "FirstToken1111".to_string(),
        verdict: Verdict::Danger,
        reason: "Mint authority retained and liquidity pulled".to_string(),
        flagged_at: Utc::now(),
        detection_count: 1,
    }
}

#[tokio::test]
async fn test_sqlite_storage_basic() {
    let storage = SqliteEntityStorage::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory registry");
    assert!(storage.health_check().await.unwrap());
    assert_eq!(storage.count().await.unwrap(), 0);

    let record = create_test_record("CreatorAlpha");
    assert!(storage.insert_if_absent(&record).await.unwrap());
    // Second insert is a no-op
    let mut changed = create_test_record("CreatorAlpha");
    changed.reason = "different".to_string();
    assert!(!storage.insert_if_absent(&changed).await.unwrap());
    assert_eq!(storage.count().await.unwrap(), 1);

    let stored = storage.get("CreatorAlpha").await.unwrap().unwrap();
    assert_eq!(stored.reason, record.reason);
    assert_eq!(stored.verdict, Verdict::Danger);
    assert_eq!(stored.detection_count, 1);
    assert_eq!(
        stored.flagged_at.timestamp_millis(),
        record.flagged_at.timestamp_millis()
    );
}

#[tokio::test]
async fn test_sqlite_lookup_counts_detections() {
    let storage = SqliteEntityStorage::connect("sqlite::memory:").await.unwrap();
    storage.insert_if_absent(&create_test_record("CreatorBeta")).await.unwrap();

    let first = storage.lookup_and_count("CreatorBeta").await.unwrap().unwrap();
    let second = storage.lookup_and_count("CreatorBeta").await.unwrap().unwrap();
    assert_eq!(first.detection_count, 2);
    assert_eq!(second.detection_count, 3);

    assert!(storage.lookup_and_count("Nobody").await.unwrap().is_none());
    // get() never counts
    assert_eq!(storage.get("CreatorBeta").await.unwrap().unwrap().detection_count, 3);
}

#[tokio::test]
async fn test_registry_over_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("registry.db").display());

    {
        let registry = KnownEntityRegistry::open(Some(&url)).await;
        assert!(registry.is_enabled());
        assert!(registry
            .flag_if_absent("CreatorGamma", "TokenOne11111", Verdict::Danger, "honeypot")
            .await
            .unwrap());
    }

    // Records survive reopening the database
    let storage = Arc::new(SqliteEntityStorage::connect(&url).await.unwrap());
    let registry = KnownEntityRegistry::new(storage);
    let record = registry.lookup("CreatorGamma").await.unwrap();
    assert_eq!(record.first_token, "TokenOne11111");
    assert_eq!(record.detection_count, 2);
}
