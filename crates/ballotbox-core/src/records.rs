use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single JSON-like record held by a collection.
pub type Record = serde_json::Value;

/// Logical collections owned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Registered voter records.
    Voters,
    /// Encrypted ballots, in cast order, with no voter linkage.
    Ballots,
    /// Set of voter ids that have already voted.
    Voted,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Voters, Collection::Ballots, Collection::Voted];

    /// Stable on-disk name of the collection.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Voters => "voters",
            Collection::Ballots => "votes",
            Collection::Voted => "voted",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors produced by record store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    /// Underlying storage failure; the prior collection state is left intact.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// A persisted collection could not be parsed.
    #[error("collection {collection} is corrupt: {reason}")]
    Corrupt {
        collection: Collection,
        reason: String,
    },
}

/// Append-only persistence for the voters, ballots and voted-set collections.
///
/// Implementations must replace a collection atomically: a failed write leaves
/// the previous contents readable and never a partially written collection.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record to the end of a collection.
    async fn append(&self, collection: Collection, record: Record) -> Result<(), RecordStoreError>;

    /// Append several records, possibly spanning collections, as one commit.
    /// Either every entry becomes visible or none does.
    async fn append_batch(&self, entries: Vec<(Collection, Record)>)
        -> Result<(), RecordStoreError>;

    /// Every record of a collection in insertion order; empty if it does not exist yet.
    async fn read_all(&self, collection: Collection) -> Result<Vec<Record>, RecordStoreError>;

    /// Whether a set-like collection of strings contains `key`.
    async fn contains_member(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<bool, RecordStoreError> {
        let members = self.read_all(collection).await?;
        Ok(members.iter().any(|member| member.as_str() == Some(key)))
    }

    /// Add `key` to a set-like collection (idempotent).
    async fn add_member(&self, collection: Collection, key: &str) -> Result<(), RecordStoreError> {
        if self.contains_member(collection, key).await? {
            return Ok(());
        }
        self.append(collection, Record::String(key.to_string()))
            .await
    }

    /// Exclude every other handle on the same store until the guard drops.
    /// Callers bracket read-check-write sequences with it; `append` and
    /// friends do not take it themselves.
    async fn lock_exclusive(&self) -> Result<StoreGuard, RecordStoreError> {
        Ok(StoreGuard::unlocked())
    }

    /// Keep writers on other handles out while a snapshot is read.
    async fn lock_shared(&self) -> Result<StoreGuard, RecordStoreError> {
        Ok(StoreGuard::unlocked())
    }
}

/// Held lock on a record store; released on drop.
pub struct StoreGuard {
    _inner: Option<Box<dyn Send + Sync>>,
}

impl StoreGuard {
    pub fn new(inner: impl Send + Sync + 'static) -> Self {
        Self {
            _inner: Some(Box::new(inner)),
        }
    }

    /// Guard for stores with no state shared outside the process.
    pub fn unlocked() -> Self {
        Self { _inner: None }
    }
}

impl fmt::Debug for StoreGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGuard")
            .field("held", &self._inner.is_some())
            .finish()
    }
}

/// In-memory record store for tests and dry runs. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<HashMap<Collection, Vec<Record>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Collection, Vec<Record>>>, RecordStoreError> {
        self.inner.lock().map_err(|err| RecordStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, collection: Collection, record: Record) -> Result<(), RecordStoreError> {
        self.lock()?.entry(collection).or_default().push(record);
        Ok(())
    }

    async fn append_batch(
        &self,
        entries: Vec<(Collection, Record)>,
    ) -> Result<(), RecordStoreError> {
        // One guard for the whole batch keeps it invisible until complete.
        let mut map = self.lock()?;
        for (collection, record) in entries {
            map.entry(collection).or_default().push(record);
        }
        Ok(())
    }

    async fn read_all(&self, collection: Collection) -> Result<Vec<Record>, RecordStoreError> {
        Ok(self.lock()?.get(&collection).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_collection_reads_empty() {
        let store = InMemoryRecordStore::new();
        let records = store.read_all(Collection::Voters).await.expect("read");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_insertion_order() {
        let store = InMemoryRecordStore::new();
        for n in 0..5 {
            store
                .append(Collection::Ballots, json!({ "n": n }))
                .await
                .expect("append");
        }

        let records = store.read_all(Collection::Ballots).await.expect("read");
        let order: Vec<i64> = records
            .iter()
            .map(|r| r["n"].as_i64().expect("n"))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn batch_spans_collections() {
        let store = InMemoryRecordStore::new();
        store
            .append_batch(vec![
                (Collection::Ballots, json!({ "ciphertext": "x" })),
                (Collection::Voted, json!("V1")),
            ])
            .await
            .expect("batch");

        assert_eq!(store.read_all(Collection::Ballots).await.unwrap().len(), 1);
        assert!(store
            .contains_member(Collection::Voted, "V1")
            .await
            .expect("contains"));
    }

    #[tokio::test]
    async fn add_member_is_idempotent() {
        let store = InMemoryRecordStore::new();
        store.add_member(Collection::Voted, "V1").await.expect("add");
        store
            .add_member(Collection::Voted, "V1")
            .await
            .expect("add again");

        let members = store.read_all(Collection::Voted).await.expect("read");
        assert_eq!(members, vec![json!("V1")]);
        assert!(!store
            .contains_member(Collection::Voted, "V2")
            .await
            .expect("contains"));
    }

    #[test]
    fn collection_names_match_files() {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["voters", "votes", "voted"]);
    }
}
