use crate::memory::InMemoryIndex;
use crate::snapshot::{SnapshotIndex, SnapshotStore};
use crate::sqlite::SqliteStore;
use crate::sweeper::{DeletionSweeper, SweeperHandle, SweeperSettings};
use pinhole_core::error::Result;
use pinhole_core::{Purge, UrlStore};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which backend serves the process. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Records live in memory only.
    Memory,
    /// Records live in memory and are mirrored to a snapshot file.
    Snapshot { path: PathBuf },
    /// Records live in a relational database.
    Relational {
        database_url: String,
        query_timeout: Option<Duration>,
    },
}

impl Display for BackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Memory => write!(f, "memory"),
            BackendConfig::Snapshot { path } => write!(f, "snapshot({})", path.display()),
            BackendConfig::Relational { .. } => write!(f, "relational"),
        }
    }
}

/// An opened backend.
///
/// `store` is the only thing request handling depends on. `purger` is set
/// when the backend soft-deletes and therefore needs a [`DeletionSweeper`].
#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn UrlStore>,
    purger: Option<Arc<dyn Purge>>,
}

impl Backend {
    pub fn store(&self) -> Arc<dyn UrlStore> {
        Arc::clone(&self.store)
    }

    pub fn purger(&self) -> Option<Arc<dyn Purge>> {
        self.purger.clone()
    }

    /// Starts a sweeper if the backend needs one.
    pub fn spawn_sweeper(&self, settings: SweeperSettings) -> Option<SweeperHandle> {
        self.purger
            .clone()
            .map(|purger| DeletionSweeper::new(purger, settings).spawn())
    }
}

/// Opens the configured backend.
///
/// The snapshot backend loads its file best-effort; the relational backend
/// connects and ensures the schema exists, failing if either step fails.
pub async fn open(config: &BackendConfig) -> Result<Backend> {
    let backend = match config {
        BackendConfig::Memory => Backend {
            store: Arc::new(InMemoryIndex::new()),
            purger: None,
        },
        BackendConfig::Snapshot { path } => Backend {
            store: Arc::new(SnapshotIndex::open(SnapshotStore::new(path.clone()))),
            purger: None,
        },
        BackendConfig::Relational {
            database_url,
            query_timeout,
        } => {
            let mut store = SqliteStore::connect(database_url).await?;
            if let Some(timeout) = query_timeout {
                store = store.with_query_timeout(*timeout);
            }
            store.init().await?;

            let store = Arc::new(store);
            Backend {
                store: store.clone(),
                purger: Some(store),
            }
        }
    };

    info!(backend = %config, "storage backend opened");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinhole_core::{OwnerId, ShortCode, UrlRecord};
    use pinhole_test_infra::TempSnapshot;

    fn record() -> UrlRecord {
        UrlRecord::new(
            ShortCode::new_unchecked("abc123"),
            "https://example.com",
            OwnerId::new("alice"),
        )
    }

    #[tokio::test]
    async fn memory_backend_has_no_purger() {
        let backend = open(&BackendConfig::Memory).await.unwrap();

        backend.store().save(record()).await.unwrap();

        assert!(backend.purger().is_none());
        assert!(backend.spawn_sweeper(SweeperSettings::default()).is_none());
        assert!(backend.store().ping().await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_backend_writes_its_file() {
        let temp = TempSnapshot::new().unwrap();
        let backend = open(&BackendConfig::Snapshot {
            path: temp.path().to_path_buf(),
        })
        .await
        .unwrap();

        backend.store().save(record()).await.unwrap();

        assert_eq!(SnapshotStore::new(temp.path()).load().unwrap(), vec![record()]);
        assert!(backend.purger().is_none());
    }

    #[tokio::test]
    async fn relational_backend_is_initialized_and_sweepable() {
        let backend = open(&BackendConfig::Relational {
            database_url: "sqlite::memory:".to_string(),
            query_timeout: Some(Duration::from_secs(5)),
        })
        .await
        .unwrap();

        let store = backend.store();
        store.save(record()).await.unwrap();
        store
            .delete(&ShortCode::new_unchecked("abc123"), &OwnerId::new("alice"))
            .await
            .unwrap();

        let purger = backend.purger().unwrap();
        assert_eq!(purger.purge_deleted().await.unwrap(), 1);
        assert!(store
            .find(&ShortCode::new_unchecked("abc123"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn relational_backend_with_unreachable_database_fails() {
        let temp = TempSnapshot::new().unwrap();
        let missing_dir = temp.path().with_file_name("missing").join("urls.db");
        let result = open(&BackendConfig::Relational {
            database_url: format!("sqlite://{}", missing_dir.display()),
            query_timeout: None,
        })
        .await;

        assert!(result.is_err());
    }
}
