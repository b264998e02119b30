use async_trait::async_trait;
use pinhole_core::error::Result;
use pinhole_core::{OwnerId, Purge, ShortCode, StorageError, UrlRecord, UrlStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

const SCHEMA: &str = include_str!("../ddl/sqlite/urls.sql");

/// Relational implementation of the store contract.
///
/// Deletion is two-phase: [`UrlStore::delete`] flips `deleted_flag` after
/// checking ownership, and [`Purge::purge_deleted`] physically removes every
/// flagged row. Reads return soft-deleted rows with `deleted` set so callers
/// can answer "gone" rather than "not found".
///
/// Every operation is bounded by the optional query timeout; dropping the
/// returned future cancels the outstanding call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    query_timeout: Option<Duration>,
}

impl SqliteStore {
    /// Creates a store from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            query_timeout: None,
        }
    }

    /// Opens a pool for `database_url`, creating the database file if needed.
    ///
    /// In-memory databases are private to a connection, so they get a pool of
    /// exactly one connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(map_sqlx_error)?
            .create_if_missing(true);

        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Bounds every subsequent operation by `timeout`.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the `urls` table and its indexes if they do not exist.
    pub async fn init(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.bounded(sqlx::query(statement).execute(&self.pool))
                .await?;
        }
        info!("table 'urls' is ready");
        Ok(())
    }

    async fn deadline<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| StorageError::Timeout(format!("operation exceeded {limit:?}"))),
            None => Ok(operation.await),
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        self.deadline(operation).await?.map_err(map_sqlx_error)
    }

    async fn insert_batch(&self, records: &[UrlRecord]) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let inserted = sqlx::query(
                r#"
                INSERT INTO urls (uuid, short_url, original_url)
                VALUES (?, ?, ?)
                ON CONFLICT (short_url) DO UPDATE
                SET uuid = excluded.uuid,
                    original_url = excluded.original_url,
                    deleted_flag = FALSE
                "#,
            )
            .bind(record.owner_id.as_str())
            .bind(record.short_code.as_str())
            .bind(record.original_url.as_str())
            .execute(&mut *tx)
            .await;

            if let Err(err) = inserted {
                tx.rollback().await?;
                return Err(err);
            }
        }

        tx.commit().await
    }

    async fn soft_delete(&self, code: &ShortCode, owner: &OwnerId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let stored_owner: Option<Option<String>> =
            sqlx::query_scalar("SELECT uuid FROM urls WHERE short_url = ? LIMIT 1")
                .bind(code.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let Some(stored_owner) = stored_owner else {
            return Err(StorageError::NotFound(code.clone()));
        };
        // A row without an owner belongs to nobody and cannot be deleted.
        match stored_owner {
            Some(stored) if !stored.is_empty() && stored == owner.as_str() => {}
            _ => return Err(StorageError::Unauthorized(code.clone())),
        }

        sqlx::query("UPDATE urls SET deleted_flag = TRUE WHERE short_url = ?")
            .bind(code.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(code = %code, owner = %owner, "record soft-deleted");
        Ok(())
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &SqliteRow) -> std::result::Result<UrlRecord, sqlx::Error> {
    let owner: Option<String> = row.try_get("uuid")?;
    let short_url: String = row.try_get("short_url")?;
    let original_url: String = row.try_get("original_url")?;
    let deleted: bool = row.try_get("deleted_flag")?;

    Ok(UrlRecord {
        short_code: ShortCode::new_unchecked(short_url),
        original_url,
        owner_id: OwnerId::new(owner.unwrap_or_default()),
        deleted,
    })
}

#[async_trait]
impl UrlStore for SqliteStore {
    async fn save(&self, record: UrlRecord) -> Result<()> {
        let record = record.with_owner_or_generated();

        let result = self
            .deadline(
                sqlx::query("INSERT INTO urls (uuid, short_url, original_url) VALUES (?, ?, ?)")
                    .bind(record.owner_id.as_str())
                    .bind(record.short_code.as_str())
                    .bind(record.original_url.as_str())
                    .execute(&self.pool),
            )
            .await?;

        match result {
            Ok(_) => {
                trace!(code = %record.short_code, "record inserted");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict(record.short_code)),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn save_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let records: Vec<_> = records
            .into_iter()
            .map(UrlRecord::with_owner_or_generated)
            .collect();

        self.bounded(self.insert_batch(&records)).await?;
        debug!(records = records.len(), "batch committed");
        Ok(())
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = self
            .bounded(
                sqlx::query(
                    r#"
                    SELECT uuid, short_url, original_url, deleted_flag
                    FROM urls
                    WHERE short_url = ?
                    LIMIT 1
                    "#,
                )
                .bind(code.as_str())
                .fetch_optional(&self.pool),
            )
            .await?;

        row.as_ref()
            .map(record_from_row)
            .transpose()
            .map_err(map_sqlx_error)
    }

    async fn find_code_by_url(&self, url: &str) -> Result<Option<ShortCode>> {
        let code: Option<String> = self
            .bounded(
                sqlx::query_scalar(
                    r#"
                    SELECT short_url
                    FROM urls
                    WHERE original_url = ?
                      AND deleted_flag = FALSE
                    ORDER BY rowid
                    LIMIT 1
                    "#,
                )
                .bind(url)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(code.map(ShortCode::new_unchecked))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlRecord>> {
        let rows = self
            .bounded(
                sqlx::query(
                    r#"
                    SELECT uuid, short_url, original_url, deleted_flag
                    FROM urls
                    WHERE uuid = ?
                    ORDER BY rowid
                    "#,
                )
                .bind(owner.as_str())
                .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(record_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlx_error)
    }

    async fn delete(&self, code: &ShortCode, owner: &OwnerId) -> Result<()> {
        self.deadline(self.soft_delete(code, owner)).await?
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Purge for SqliteStore {
    async fn purge_deleted(&self) -> Result<u64> {
        let result = self
            .bounded(sqlx::query("DELETE FROM urls WHERE deleted_flag = TRUE").execute(&self.pool))
            .await?;
        Ok(result.rows_affected())
    }
}
