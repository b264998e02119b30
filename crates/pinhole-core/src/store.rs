use crate::error::Result;
use crate::owner::OwnerId;
use crate::record::UrlRecord;
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// The capability set every storage backend exposes.
///
/// Callers depend on this trait only; which backend is active (in-memory
/// index, snapshot-backed index, relational) is decided once by the factory
/// at startup.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Stores a record under a code nobody holds yet.
    ///
    /// An occupied code is rejected with `Err(Conflict)` on every backend,
    /// atomically with the insert.
    async fn save(&self, record: UrlRecord) -> Result<()>;

    /// Stores every record or none of them.
    ///
    /// No duplicate-URL or collision check is performed: a record whose code
    /// already exists overwrites it.
    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()>;

    /// Looks a record up by code. Soft-deleted records are returned with
    /// `deleted` set so callers can tell "gone" from "never existed".
    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Returns a live code currently mapped to `url`, if any.
    async fn find_code_by_url(&self, url: &str) -> Result<Option<ShortCode>>;

    /// Returns every record created by `owner`, deleted ones included.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>>;

    /// Deletes a record on behalf of `owner`.
    ///
    /// Ownership is checked before anything is mutated: `Err(NotFound)` if
    /// the code does not resolve, `Err(Unauthorized)` if it belongs to
    /// someone else.
    async fn delete(&self, code: &ShortCode, owner: &OwnerId) -> Result<()>;

    /// Reports whether the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Irrevocable removal of soft-deleted records.
#[async_trait]
pub trait Purge: Send + Sync + 'static {
    /// Removes every soft-deleted record and returns how many were removed.
    async fn purge_deleted(&self) -> Result<u64>;
}
