use pinhole_core::error::Result;
use pinhole_core::Purge;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(200);

/// Configures a [`DeletionSweeper`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SweeperSettings {
    /// Time between purge attempts.
    #[builder(default = DEFAULT_SWEEP_INTERVAL)]
    pub interval: Duration,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Periodically purges soft-deleted records.
///
/// Purges run one at a time on a single task: the next tick is only awaited
/// after the current purge returns, and ticks missed while a purge stalls are
/// skipped rather than replayed. A failed purge is logged and retried on the
/// next tick.
pub struct DeletionSweeper<P: ?Sized> {
    purger: Arc<P>,
    settings: SweeperSettings,
}

impl<P: Purge + ?Sized> DeletionSweeper<P> {
    pub fn new(purger: Arc<P>, settings: SweeperSettings) -> Self {
        Self { purger, settings }
    }

    /// Runs a single purge.
    pub async fn sweep_once(&self) -> Result<u64> {
        let removed = self.purger.purge_deleted().await?;
        if removed > 0 {
            info!(rows = removed, "purged soft-deleted records");
        } else {
            trace!("nothing to purge");
        }
        Ok(removed)
    }

    /// Starts the sweep loop on the tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        SweeperHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval = ?self.settings.interval, "deletion sweeper started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "purge failed, retrying on next tick");
                    }
                }
            }
        }

        debug!("deletion sweeper stopped");
    }
}

/// Handle to a running [`DeletionSweeper`].
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the sweeper, waiting for an in-flight purge to complete.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "deletion sweeper task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pinhole_core::StorageError;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fails the first `failures` purges, then succeeds.
    struct FlakyPurge {
        calls: AtomicU64,
        failures: u64,
    }

    impl FlakyPurge {
        fn new(failures: u64) -> Self {
            Self {
                calls: AtomicU64::new(0),
                failures,
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Purge for FlakyPurge {
        async fn purge_deleted(&self) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(StorageError::Unavailable("database is down".into()));
            }
            Ok(1)
        }
    }

    fn settings(millis: u64) -> SweeperSettings {
        SweeperSettings::builder()
            .interval(Duration::from_millis(millis))
            .build()
    }

    #[test]
    fn default_interval_is_200ms() {
        assert_eq!(SweeperSettings::default().interval, Duration::from_millis(200));
    }

    #[tokio::test]
    async fn sweep_once_reports_removed_rows() {
        let sweeper = DeletionSweeper::new(Arc::new(FlakyPurge::new(0)), settings(10));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let purger = Arc::new(FlakyPurge::new(2));
        let handle = DeletionSweeper::new(Arc::clone(&purger), settings(10)).spawn();

        tokio::time::sleep(Duration::from_millis(55)).await;

        assert!(purger.calls() >= 4, "expected several ticks, got {}", purger.calls());
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_further_purges() {
        let purger = Arc::new(FlakyPurge::new(0));
        let handle = DeletionSweeper::new(Arc::clone(&purger), settings(10)).spawn();

        tokio::time::sleep(Duration::from_millis(25)).await;
        handle.shutdown().await;
        let calls = purger.calls();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(purger.calls(), calls);
    }
}
