use async_trait::async_trait;
use parking_lot::RwLock;
use pinhole_core::error::Result;
use pinhole_core::{OwnerId, ShortCode, StorageError, UrlRecord, UrlStore};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct IndexState {
    by_code: HashMap<ShortCode, UrlRecord>,
    // Reverse index kept in step with `by_code` under the same lock.
    by_url: HashMap<String, BTreeSet<ShortCode>>,
}

impl IndexState {
    fn insert(&mut self, record: UrlRecord) {
        let code = record.short_code.clone();
        let url = record.original_url.clone();

        if let Some(previous) = self.by_code.insert(code.clone(), record) {
            if previous.original_url != url {
                self.unlink(&previous.original_url, &code);
            }
        }

        self.by_url.entry(url).or_default().insert(code);
    }

    fn remove(&mut self, code: &ShortCode) -> Option<UrlRecord> {
        let removed = self.by_code.remove(code)?;
        self.unlink(&removed.original_url, code);
        Some(removed)
    }

    fn unlink(&mut self, url: &str, code: &ShortCode) {
        if let Some(codes) = self.by_url.get_mut(url) {
            codes.remove(code);
            if codes.is_empty() {
                self.by_url.remove(url);
            }
        }
    }
}

/// Concurrency-safe in-memory index of short code → record.
///
/// Every operation takes the lock for the duration of a map operation only
/// and never performs I/O, so no caller can be blocked indefinitely. A
/// reverse URL → code index is maintained under the same lock, which keeps
/// [`InMemoryIndex::find_code_by_url`] O(1) and consistent with the forward
/// map.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index pre-populated with `records`.
    pub fn from_records(records: impl IntoIterator<Item = UrlRecord>) -> Self {
        let index = Self::new();
        index.extend(records);
        index
    }

    /// Upserts a record. An anonymous owner is replaced with a generated one.
    ///
    /// Re-saving an existing code overwrites it silently.
    pub fn save(&self, record: UrlRecord) {
        let record = record.with_owner_or_generated();
        trace!(code = %record.short_code, "saving record in memory");
        self.state.write().insert(record);
    }

    /// Inserts a record unless its code is already taken.
    ///
    /// The occupancy check and the insert happen under one write lock, so of
    /// two racing inserts for the same code exactly one succeeds.
    pub fn insert_new(&self, record: UrlRecord) -> Result<()> {
        let record = record.with_owner_or_generated();
        let mut state = self.state.write();

        if state.by_code.contains_key(&record.short_code) {
            return Err(StorageError::Conflict(record.short_code));
        }

        trace!(code = %record.short_code, "inserting record in memory");
        state.insert(record);
        Ok(())
    }

    /// Upserts every record under a single lock acquisition.
    pub fn extend(&self, records: impl IntoIterator<Item = UrlRecord>) {
        let mut state = self.state.write();
        for record in records {
            state.insert(record.with_owner_or_generated());
        }
    }

    pub fn find(&self, code: &ShortCode) -> Option<UrlRecord> {
        self.state.read().by_code.get(code).cloned()
    }

    /// Returns a code currently mapped to `url`.
    ///
    /// When several codes map to the same URL (bulk imports), the
    /// lexicographically smallest one is returned.
    pub fn find_code_by_url(&self, url: &str) -> Option<ShortCode> {
        self.state
            .read()
            .by_url
            .get(url)
            .and_then(|codes| codes.first().cloned())
    }

    /// Removes a record unconditionally.
    pub fn remove(&self, code: &ShortCode) -> Option<UrlRecord> {
        self.state.write().remove(code)
    }

    /// Removes a record if it belongs to `owner`.
    ///
    /// The ownership check and the removal happen under one write lock.
    pub fn remove_owned(&self, code: &ShortCode, owner: &OwnerId) -> Result<UrlRecord> {
        let mut state = self.state.write();

        let record = state
            .by_code
            .get(code)
            .ok_or_else(|| StorageError::NotFound(code.clone()))?;
        if !record.is_owned_by(owner) {
            return Err(StorageError::Unauthorized(code.clone()));
        }

        state
            .remove(code)
            .ok_or_else(|| StorageError::NotFound(code.clone()))
    }

    pub fn list_by_owner(&self, owner: &OwnerId) -> Vec<UrlRecord> {
        let mut records: Vec<_> = self
            .state
            .read()
            .by_code
            .values()
            .filter(|record| record.is_owned_by(owner))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        records
    }

    /// Returns a copy of every record, ordered by short code.
    pub fn records(&self) -> Vec<UrlRecord> {
        let mut records: Vec<_> = self.state.read().by_code.values().cloned().collect();
        records.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        records
    }

    pub fn len(&self) -> usize {
        self.state.read().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UrlStore for InMemoryIndex {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        self.insert_new(record)
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        debug!(records = records.len(), "saving batch in memory");
        self.extend(records);
        Ok(())
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(InMemoryIndex::find(self, code))
    }

    async fn find_code_by_url(&self, url: &str) -> Result<Option<ShortCode>> {
        Ok(InMemoryIndex::find_code_by_url(self, url))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        Ok(InMemoryIndex::list_by_owner(self, owner))
    }

    async fn delete(&self, code: &ShortCode, owner: &OwnerId) -> Result<()> {
        self.remove_owned(code, owner)?;
        debug!(code = %code, owner = %owner, "removed record from memory");
        Ok(())
    }
}
