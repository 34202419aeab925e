use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use ballotbox_core::{Collection, Record, RecordStore, RecordStoreError, StoreGuard};
use fs4::fs_std::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

/// File-backed record store keeping each collection as a JSON array
/// (`voters.json`, `votes.json`, `voted.json`) under `root`.
///
/// Writes go to a temp file in the same directory, are synced, then renamed
/// over the collection, so readers see either the old or the new array.
/// `lock_exclusive`/`lock_shared` take an OS advisory lock on `root/.lock`,
/// which serializes handles in other processes over the same directory.
pub struct JsonFileRecordStore {
    root: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.name()))
    }

    async fn acquire(&self, exclusive: bool) -> Result<StoreGuard, RecordStoreError> {
        let path = self.root.join(LOCK_FILE);
        // flock blocks; keep it off the async workers.
        let lock = tokio::task::spawn_blocking(move || open_locked(&path, exclusive))
            .await
            .map_err(storage_err)??;
        Ok(StoreGuard::new(lock))
    }
}

const LOCK_FILE: &str = ".lock";

/// Open lock file holding an advisory lock, released on drop.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(%err, "failed to release store lock");
        }
    }
}

fn open_locked(path: &Path, exclusive: bool) -> Result<FileLock, RecordStoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(storage_err)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(storage_err)?;

    let locked = if exclusive {
        FileExt::lock_exclusive(&file)
    } else {
        FileExt::lock_shared(&file)
    };
    locked.map_err(storage_err)?;
    Ok(FileLock { file })
}

/// A collection rewrite that is on disk but not yet in place.
struct StagedWrite {
    collection: Collection,
    path: PathBuf,
    previous: Option<Vec<u8>>,
    tmp: NamedTempFile,
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    #[instrument(skip_all, fields(collection = %collection))]
    async fn append(&self, collection: Collection, record: Record) -> Result<(), RecordStoreError> {
        let path = self.path_for(collection);
        let mut records = parse_collection(read_raw(&path)?.as_deref(), collection)?;
        records.push(record);

        let tmp = stage(&path, &records)?;
        tmp.persist(&path).map_err(|e| storage_err(e.error))?;
        debug!(len = records.len(), "appended record");
        Ok(())
    }

    #[instrument(skip_all, fields(entries = entries.len()))]
    async fn append_batch(
        &self,
        entries: Vec<(Collection, Record)>,
    ) -> Result<(), RecordStoreError> {
        let mut groups: Vec<(Collection, Vec<Record>)> = Vec::new();
        for (collection, record) in entries {
            match groups.iter_mut().find(|(c, _)| *c == collection) {
                Some((_, records)) => records.push(record),
                None => groups.push((collection, vec![record])),
            }
        }

        // Stage every collection before replacing any of them.
        let mut staged = Vec::with_capacity(groups.len());
        for (collection, new_records) in groups {
            let path = self.path_for(collection);
            let previous = read_raw(&path)?;
            let mut records = parse_collection(previous.as_deref(), collection)?;
            records.extend(new_records);
            let tmp = stage(&path, &records)?;
            staged.push(StagedWrite {
                collection,
                path,
                previous,
                tmp,
            });
        }

        let mut committed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        for write in staged {
            if let Err(err) = write.tmp.persist(&write.path) {
                warn!(collection = %write.collection, "batch commit failed, rolling back");
                rollback(&committed);
                return Err(storage_err(err.error));
            }
            committed.push((write.path, write.previous));
        }
        debug!(collections = committed.len(), "committed batch");
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn read_all(&self, collection: Collection) -> Result<Vec<Record>, RecordStoreError> {
        let path = self.path_for(collection);
        parse_collection(read_raw(&path)?.as_deref(), collection)
    }

    #[instrument(skip_all)]
    async fn lock_exclusive(&self) -> Result<StoreGuard, RecordStoreError> {
        self.acquire(true).await
    }

    #[instrument(skip_all)]
    async fn lock_shared(&self) -> Result<StoreGuard, RecordStoreError> {
        self.acquire(false).await
    }
}

fn read_raw(path: &Path) -> Result<Option<Vec<u8>>, RecordStoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(storage_err(err)),
    }
}

fn parse_collection(
    bytes: Option<&[u8]>,
    collection: Collection,
) -> Result<Vec<Record>, RecordStoreError> {
    let Some(bytes) = bytes else {
        return Ok(Vec::new());
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|e| RecordStoreError::Corrupt {
        collection,
        reason: e.to_string(),
    })
}

fn stage(path: &Path, records: &[Record]) -> Result<NamedTempFile, RecordStoreError> {
    let json = serde_json::to_vec_pretty(records).map_err(storage_err)?;
    stage_bytes(path, &json)
}

fn stage_bytes(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, RecordStoreError> {
    let parent = path.parent().ok_or_else(|| RecordStoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    Ok(tmp)
}

/// Put already replaced collections back to their pre-batch contents.
fn rollback(committed: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in committed.iter().rev() {
        let restored = match previous {
            Some(bytes) => stage_bytes(path, bytes)
                .and_then(|tmp| tmp.persist(path).map(|_| ()).map_err(|e| storage_err(e.error))),
            None => fs::remove_file(path).map_err(storage_err),
        };
        if let Err(err) = restored {
            warn!(path = %path.display(), %err, "rollback failed");
        }
    }
}

fn storage_err<E: ToString>(err: E) -> RecordStoreError {
    RecordStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_collection_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        assert!(store
            .read_all(Collection::Voters)
            .await
            .expect("read")
            .is_empty());
    }

    #[tokio::test]
    async fn appends_survive_reopen_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path().join("data"));
        store
            .append(Collection::Voters, json!({ "voter_id": "V1" }))
            .await
            .expect("append");
        store
            .append(Collection::Voters, json!({ "voter_id": "V2" }))
            .await
            .expect("append");

        let reopened = JsonFileRecordStore::new(dir.path().join("data"));
        let records = reopened.read_all(Collection::Voters).await.expect("read");
        assert_eq!(
            records,
            vec![json!({ "voter_id": "V1" }), json!({ "voter_id": "V2" })]
        );
        assert!(reopened.path_for(Collection::Voters).ends_with("voters.json"));
    }

    #[tokio::test]
    async fn corrupt_collection_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        fs::write(store.path_for(Collection::Ballots), "{ not an array").expect("write");

        let err = store
            .read_all(Collection::Ballots)
            .await
            .expect_err("corrupt");
        assert!(matches!(
            err,
            RecordStoreError::Corrupt {
                collection: Collection::Ballots,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_append_keeps_previous_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        store
            .append(Collection::Voted, json!("V1"))
            .await
            .expect("append");
        let before = fs::read(store.path_for(Collection::Voted)).expect("read");

        // Appending to a corrupt neighbour must not touch this collection.
        fs::write(store.path_for(Collection::Ballots), "garbage").expect("write");
        store
            .append_batch(vec![
                (Collection::Voted, json!("V2")),
                (Collection::Ballots, json!({ "ciphertext": "x" })),
            ])
            .await
            .expect_err("batch should fail while staging");

        let after = fs::read(store.path_for(Collection::Voted)).expect("read");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn batch_commits_every_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        store
            .append_batch(vec![
                (Collection::Ballots, json!({ "ciphertext": "a" })),
                (Collection::Voted, json!("V1")),
                (Collection::Ballots, json!({ "ciphertext": "b" })),
            ])
            .await
            .expect("batch");

        assert_eq!(
            store.read_all(Collection::Ballots).await.expect("read").len(),
            2
        );
        assert!(store
            .contains_member(Collection::Voted, "V1")
            .await
            .expect("contains"));
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        store
            .append(Collection::Voters, json!({ "voter_id": "V1" }))
            .await
            .expect("append");
        store.add_member(Collection::Voted, "V1").await.expect("add");

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["voted.json", "voters.json"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exclusive_lock_holds_off_other_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = JsonFileRecordStore::new(dir.path());
        let other = JsonFileRecordStore::new(dir.path());

        let guard = writer.lock_exclusive().await.expect("lock");
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(200), other.lock_shared()).await;
        assert!(waited.is_err(), "reader must wait for the writer");

        drop(guard);
        tokio::time::timeout(std::time::Duration::from_secs(5), other.lock_exclusive())
            .await
            .expect("lock released")
            .expect("lock");
    }

    #[tokio::test]
    async fn shared_locks_coexist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = JsonFileRecordStore::new(dir.path());
        let second = JsonFileRecordStore::new(dir.path());

        let _a = first.lock_shared().await.expect("first reader");
        let _b = second.lock_shared().await.expect("second reader");
        assert!(dir.path().join(".lock").exists());
    }

    #[test]
    fn rollback_restores_and_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join("votes.json");
        let created = dir.path().join("voted.json");
        fs::write(&existing, "[\"new\"]").expect("write");
        fs::write(&created, "[\"V1\"]").expect("write");

        rollback(&[
            (existing.clone(), Some(b"[]".to_vec())),
            (created.clone(), None),
        ]);

        assert_eq!(fs::read(&existing).expect("read"), b"[]");
        assert!(!created.exists());
    }
}
