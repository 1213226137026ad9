use crate::ingest::ratelimit::RateLimiter;
use crate::storage::EventStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Background housekeeping: prunes idle rate-limiter windows and, when a
/// retention period is configured, evicts events older than the cutoff.
///
/// Constructed explicitly and started by whoever owns the process; `stop()`
/// tears the task down so tests get a clean lifecycle instead of a
/// process-wide ambient loop.
pub struct Maintenance {
    store: Arc<dyn EventStore>,
    rate_limiter: RateLimiter,
    sweep_interval: Duration,
    retention_days: u32,
}

pub struct MaintenanceHandle {
    task: tokio::task::JoinHandle<()>,
}

impl MaintenanceHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Maintenance {
    pub fn new(
        store: Arc<dyn EventStore>,
        rate_limiter: RateLimiter,
        sweep_interval: Duration,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            sweep_interval,
            retention_days,
        }
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    pub fn start(self) -> MaintenanceHandle {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        });
        MaintenanceHandle { task }
    }

    async fn sweep(&self) {
        self.rate_limiter.cleanup();

        if self.retention_days == 0 {
            return;
        }

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.retention_days));
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.delete_before(cutoff)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(deleted)) => {
                tracing::info!(deleted, retention_days = self.retention_days, "Retention sweep");
            }
            Ok(Err(e)) => tracing::error!(error = %e, "Retention sweep failed"),
            Err(e) => tracing::error!(error = %e, "Retention sweep task panicked"),
        }
    }
}
