//! Fixtures shared by Pinhole test suites.

pub mod error;
pub mod snapshot;
pub mod sqlite;

pub use error::{Result, TestInfraError};
pub use snapshot::TempSnapshot;
