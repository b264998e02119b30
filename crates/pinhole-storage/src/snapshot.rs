use crate::memory::InMemoryIndex;
use async_trait::async_trait;
use pinhole_core::error::Result;
use pinhole_core::{OwnerId, ShortCode, StorageError, UrlRecord, UrlStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One element of the snapshot file's JSON array.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    uuid: String,
    short_url: String,
    original_url: String,
}

impl From<&UrlRecord> for SnapshotEntry {
    fn from(record: &UrlRecord) -> Self {
        Self {
            uuid: record.owner_id.to_string(),
            short_url: record.short_code.to_string(),
            original_url: record.original_url.clone(),
        }
    }
}

impl From<SnapshotEntry> for UrlRecord {
    fn from(entry: SnapshotEntry) -> Self {
        UrlRecord::new(
            ShortCode::new_unchecked(entry.short_url),
            entry.original_url,
            OwnerId::new(entry.uuid),
        )
    }
}

/// Reads and writes the pretty-printed JSON snapshot of an index.
///
/// The file is a cache of index state, not the source of truth. It is
/// rewritten wholesale: the new content goes to a temporary file in the same
/// directory, which is then renamed over the old one, so readers never see a
/// half-written file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Replaces the snapshot file with `records`, creating parent
    /// directories as needed.
    pub fn save(&self, records: &[UrlRecord]) -> Result<()> {
        let directory = self.directory();
        std::fs::create_dir_all(directory).map_err(|e| snapshot_error(&self.path, e))?;

        let entries: Vec<SnapshotEntry> = records.iter().map(SnapshotEntry::from).collect();

        let temp = NamedTempFile::new_in(directory).map_err(|e| snapshot_error(&self.path, e))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &entries)
                .map_err(|e| snapshot_error(&self.path, e))?;
            writer.flush().map_err(|e| snapshot_error(&self.path, e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| snapshot_error(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| snapshot_error(&self.path, e.error))?;

        debug!(path = %self.path.display(), records = entries.len(), "snapshot written");
        Ok(())
    }

    /// Reads every record from the snapshot file.
    pub fn load(&self) -> Result<Vec<UrlRecord>> {
        let file = File::open(&self.path).map_err(|e| snapshot_error(&self.path, e))?;
        let entries: Vec<SnapshotEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| snapshot_error(&self.path, e))?;

        Ok(entries.into_iter().map(UrlRecord::from).collect())
    }
}

fn snapshot_error(path: &Path, err: impl std::fmt::Display) -> StorageError {
    StorageError::Snapshot(format!("{}: {err}", path.display()))
}

/// An [`InMemoryIndex`] mirrored to a [`SnapshotStore`].
///
/// Every successful save or delete rewrites the snapshot before returning,
/// so a mutation acknowledged to the caller is on disk. Writes run on the
/// blocking pool. A mutation and its write are serialized with every other
/// mutation, and if the write fails the mutation is undone before the error
/// is returned, so memory never holds a change the caller was told failed.
#[derive(Debug)]
pub struct SnapshotIndex {
    index: InMemoryIndex,
    snapshot: Arc<SnapshotStore>,
    flush_lock: Mutex<()>,
}

impl SnapshotIndex {
    /// Opens the index, loading the snapshot file if it can be read.
    ///
    /// A missing or malformed file is not fatal: the index starts empty and
    /// the failure is logged.
    pub fn open(snapshot: SnapshotStore) -> Self {
        let index = match snapshot.load() {
            Ok(records) => {
                info!(path = %snapshot.path().display(), records = records.len(), "snapshot loaded");
                InMemoryIndex::from_records(records)
            }
            Err(e) => {
                warn!(error = %e, "failed to load snapshot, starting with an empty index");
                InMemoryIndex::new()
            }
        };

        Self {
            index,
            snapshot: Arc::new(snapshot),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn index(&self) -> &InMemoryIndex {
        &self.index
    }

    /// Rewrites the snapshot file from the current index state.
    ///
    /// Callers must hold `flush_lock`.
    async fn flush(&self) -> Result<()> {
        let records = self.index.records();
        let snapshot = Arc::clone(&self.snapshot);
        tokio::task::spawn_blocking(move || snapshot.save(&records))
            .await
            .map_err(|e| StorageError::Snapshot(format!("snapshot task failed: {e}")))?
    }
}

#[async_trait]
impl UrlStore for SnapshotIndex {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        let _guard = self.flush_lock.lock().await;

        let code = record.short_code.clone();
        self.index.insert_new(record)?;

        if let Err(e) = self.flush().await {
            warn!(code = %code, error = %e, "snapshot write failed, dropping insert");
            self.index.remove(&code);
            return Err(e);
        }
        Ok(())
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let _guard = self.flush_lock.lock().await;

        let mut previous = HashMap::new();
        for record in &records {
            previous
                .entry(record.short_code.clone())
                .or_insert_with(|| self.index.find(&record.short_code));
        }
        self.index.extend(records);

        if let Err(e) = self.flush().await {
            warn!(records = previous.len(), error = %e, "snapshot write failed, reverting batch");
            for (code, record) in previous {
                match record {
                    Some(record) => self.index.save(record),
                    None => {
                        self.index.remove(&code);
                    }
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.index.find(code))
    }

    async fn find_code_by_url(&self, url: &str) -> Result<Option<ShortCode>> {
        Ok(self.index.find_code_by_url(url))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        Ok(self.index.list_by_owner(owner))
    }

    async fn delete(&self, code: &ShortCode, owner: &OwnerId) -> Result<()> {
        let _guard = self.flush_lock.lock().await;

        let removed = self.index.remove_owned(code, owner)?;

        if let Err(e) = self.flush().await {
            warn!(code = %code, error = %e, "snapshot write failed, restoring record");
            self.index.save(removed);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinhole_test_infra::TempSnapshot;

    fn record(c: &str, url: &str, owner: &str) -> UrlRecord {
        UrlRecord::new(ShortCode::new_unchecked(c), url, OwnerId::new(owner))
    }

    #[test]
    fn save_then_load_round_trips_records() {
        let temp = TempSnapshot::new().unwrap();
        let store = SnapshotStore::new(temp.path());
        let records = vec![
            record("aaa111", "https://a.example", "alice"),
            record("bbb222", "https://b.example", "bob"),
        ];

        store.save(&records).unwrap();

        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let temp = TempSnapshot::nested().unwrap();
        let store = SnapshotStore::new(temp.path());

        store.save(&[record("aaa111", "https://a.example", "alice")]).unwrap();

        assert!(temp.path().exists());
    }

    #[test]
    fn file_uses_the_documented_layout() {
        let temp = TempSnapshot::new().unwrap();
        let store = SnapshotStore::new(temp.path());

        store.save(&[record("aaa111", "https://a.example", "alice")]).unwrap();

        let raw = std::fs::read_to_string(temp.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"uuid": "alice", "short_url": "aaa111", "original_url": "https://a.example"}
            ])
        );
        assert!(raw.contains('\n'), "snapshot should be pretty-printed");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let temp = TempSnapshot::new().unwrap();
        let store = SnapshotStore::new(temp.path());

        assert!(matches!(store.load(), Err(StorageError::Snapshot(_))));
    }

    #[test]
    fn open_with_corrupt_file_starts_empty() {
        let temp = TempSnapshot::new().unwrap();
        std::fs::write(temp.path(), "{ not json").unwrap();

        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));

        assert!(index.index().is_empty());
    }

    #[tokio::test]
    async fn every_save_and_delete_rewrites_the_file() {
        let temp = TempSnapshot::new().unwrap();
        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));

        index.save(record("aaa111", "https://a.example", "alice")).await.unwrap();
        index.save(record("bbb222", "https://b.example", "alice")).await.unwrap();
        assert_eq!(SnapshotStore::new(temp.path()).load().unwrap().len(), 2);

        index
            .delete(&ShortCode::new_unchecked("aaa111"), &OwnerId::new("alice"))
            .await
            .unwrap();
        let on_disk = SnapshotStore::new(temp.path()).load().unwrap();
        assert_eq!(on_disk, vec![record("bbb222", "https://b.example", "alice")]);
    }

    #[tokio::test]
    async fn reopening_restores_the_index() {
        let temp = TempSnapshot::new().unwrap();
        {
            let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));
            index.save(record("aaa111", "https://a.example", "alice")).await.unwrap();
            index
                .save_batch(vec![
                    record("bbb222", "https://b.example", "bob"),
                    record("ccc333", "https://c.example", "bob"),
                ])
                .await
                .unwrap();
        }

        let reopened = SnapshotIndex::open(SnapshotStore::new(temp.path()));

        let found = reopened
            .find(&ShortCode::new_unchecked("bbb222"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.original_url, "https://b.example");
        assert_eq!(found.owner_id, OwnerId::new("bob"));
        assert_eq!(
            reopened.find_code_by_url("https://a.example").await.unwrap(),
            Some(ShortCode::new_unchecked("aaa111"))
        );
        assert_eq!(reopened.index().len(), 3);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_record_behind() {
        let temp = TempSnapshot::nested().unwrap();
        temp.block_parent().unwrap();
        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));

        let err = index
            .save(record("aaa111", "https://a.example", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Snapshot(_)));
        assert!(index.find(&ShortCode::new_unchecked("aaa111")).await.unwrap().is_none());
        assert_eq!(index.find_code_by_url("https://a.example").await.unwrap(), None);

        let again = index
            .save(record("aaa111", "https://a.example", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(again, StorageError::Snapshot(_)));
    }

    #[tokio::test]
    async fn failed_batch_write_restores_previous_records() {
        let temp = TempSnapshot::nested().unwrap();
        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));
        index.save(record("aaa111", "https://old.example", "alice")).await.unwrap();
        temp.block_parent().unwrap();

        let err = index
            .save_batch(vec![
                record("aaa111", "https://new.example", "bob"),
                record("bbb222", "https://b.example", "bob"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Snapshot(_)));
        assert_eq!(
            index.index().records(),
            vec![record("aaa111", "https://old.example", "alice")]
        );
        assert_eq!(
            index.find_code_by_url("https://old.example").await.unwrap(),
            Some(ShortCode::new_unchecked("aaa111"))
        );
        assert_eq!(index.find_code_by_url("https://new.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_delete_write_keeps_the_record() {
        let temp = TempSnapshot::nested().unwrap();
        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));
        index.save(record("aaa111", "https://a.example", "alice")).await.unwrap();
        temp.block_parent().unwrap();

        let err = index
            .delete(&ShortCode::new_unchecked("aaa111"), &OwnerId::new("alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Snapshot(_)));
        assert_eq!(
            index.find(&ShortCode::new_unchecked("aaa111")).await.unwrap(),
            Some(record("aaa111", "https://a.example", "alice"))
        );
    }

    #[tokio::test]
    async fn save_rejects_an_occupied_code() {
        let temp = TempSnapshot::new().unwrap();
        let index = SnapshotIndex::open(SnapshotStore::new(temp.path()));
        index.save(record("aaa111", "https://a.example", "alice")).await.unwrap();

        let err = index
            .save(record("aaa111", "https://b.example", "bob"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(SnapshotStore::new(temp.path()).load().unwrap().len(), 1);
    }
}
