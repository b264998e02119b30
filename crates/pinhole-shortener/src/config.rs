use clap::Parser;
use pinhole_storage::sweeper::DEFAULT_SWEEP_INTERVAL;
use pinhole_storage::{BackendConfig, SweeperSettings};
use pinhole_telemetry::LogFormat;
use std::path::PathBuf;
use std::time::Duration;

pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_MS";
pub const QUERY_TIMEOUT_ENV: &str = "QUERY_TIMEOUT_MS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Parser)]
#[command(name = "pinhole", about = "URL shortener storage engine")]
pub struct CLI {
    /// Mirror records to this JSON snapshot file.
    #[arg(short = 'f', long = "file", env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// Store records in this database. Takes precedence over `--file`.
    #[arg(short = 'd', long = "database", env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Milliseconds between purges of soft-deleted rows.
    #[arg(
        long,
        env = SWEEP_INTERVAL_ENV,
        default_value_t = DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
    )]
    pub sweep_interval_ms: u64,

    /// Per-query deadline for the database backend.
    #[arg(long, env = QUERY_TIMEOUT_ENV)]
    pub query_timeout_ms: Option<u64>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CLI {
    /// Picks the backend: database, then snapshot file, then memory.
    ///
    /// Empty values count as unset, so `DATABASE_DSN=` falls through.
    pub fn backend(&self) -> BackendConfig {
        if let Some(dsn) = self.database_dsn.as_deref().filter(|s| !s.trim().is_empty()) {
            return BackendConfig::Relational {
                database_url: dsn.to_string(),
                query_timeout: self.query_timeout_ms.map(Duration::from_millis),
            };
        }

        match &self.file_storage_path {
            Some(path) if !path.as_os_str().is_empty() => BackendConfig::Snapshot {
                path: path.clone(),
            },
            _ => BackendConfig::Memory,
        }
    }

    pub fn sweeper_settings(&self) -> SweeperSettings {
        SweeperSettings::builder()
            .interval(Duration::from_millis(self.sweep_interval_ms.max(1)))
            .build()
    }
}
