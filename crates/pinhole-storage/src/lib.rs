//! Storage backends for the Pinhole URL shortener.
//!
//! Exactly one backend is active per process, chosen by [`factory::open`]:
//! the in-memory [`InMemoryIndex`], the same index mirrored to a JSON
//! snapshot file ([`SnapshotIndex`]), or the relational [`SqliteStore`].
//! The [`DeletionSweeper`] purges soft-deleted rows when the relational
//! backend is active.

pub mod factory;
pub mod memory;
pub mod snapshot;
pub mod sqlite;
pub mod sweeper;

pub use factory::{Backend, BackendConfig};
pub use memory::InMemoryIndex;
pub use pinhole_core::{Purge, StorageError, UrlStore};
pub use snapshot::{SnapshotIndex, SnapshotStore};
pub use sqlite::SqliteStore;
pub use sweeper::{DeletionSweeper, SweeperHandle, SweeperSettings};
