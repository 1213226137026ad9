pub mod duckdb;
pub mod null;

use crate::event::VisitorEvent;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Field selectors for distinct-value counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    VisitorId,
    SessionId,
}

/// Backing-store contract for visitor events.
///
/// Implementations are synchronous and `Send + Sync`; handlers call them
/// through `tokio::task::spawn_blocking`. Writes are append-only, reads never
/// mutate stored events.
pub trait EventStore: Send + Sync {
    /// Append one event. Never overwrites.
    fn insert(&self, event: &VisitorEvent) -> Result<(), StorageError>;

    /// All events with `timestamp` in `[from, to]`, order not guaranteed.
    fn scan_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VisitorEvent>, StorageError>;

    /// Events in `[from, to]`, newest first, capped at `limit`.
    fn recent(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<VisitorEvent>, StorageError>;

    /// Count of distinct values of `field` among events in `[from, to]`.
    /// Empty values are not counted.
    fn count_distinct(
        &self,
        field: DistinctField,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Delete events older than `cutoff`. Returns the number removed.
    /// Retention sweeps are the only deletion path; request handling never
    /// calls this.
    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Whether a real backing store is reachable. `false` means the degraded
    /// no-op sink is in use.
    fn is_connected(&self) -> bool;
}

#[derive(Debug)]
pub enum StorageError {
    /// The backing store cannot be reached. Ingest degrades to
    /// accepted-with-warning on this variant; queries report it explicitly.
    Unavailable(String),
    Database(::duckdb::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
            Self::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<::duckdb::Error> for StorageError {
    fn from(e: ::duckdb::Error) -> Self {
        Self::Database(e)
    }
}

/// Open the configured backing store.
///
/// With no path configured, or when DuckDB fails to open, the service runs on
/// the degraded [`null::NullStore`] instead of refusing to start: losing
/// telemetry is preferable to taking the instrumented application down with
/// us. The degradation is logged and visible on `/api/health`.
pub fn open(path: Option<&Path>) -> Arc<dyn EventStore> {
    let Some(path) = path else {
        tracing::warn!("No database_path configured, running without persistence");
        return Arc::new(null::NullStore);
    };

    match duckdb::DuckDbStore::open(path) {
        Ok(store) => {
            tracing::info!(path = %path.display(), "Event store opened");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to open event store, running without persistence"
            );
            Arc::new(null::NullStore)
        }
    }
}
