use crate::event::VisitorEvent;
use crate::storage::{DistinctField, EventStore, StorageError};
use chrono::{DateTime, Utc};

/// Degraded-mode store used when no backing database is configured or
/// reachable. Inserts are accepted and dropped, reads return nothing, so the
/// endpoints keep answering instead of surfacing errors to end-user-facing
/// instrumentation.
pub struct NullStore;

impl EventStore for NullStore {
    fn insert(&self, _event: &VisitorEvent) -> Result<(), StorageError> {
        Ok(())
    }

    fn scan_range(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<VisitorEvent>, StorageError> {
        Ok(Vec::new())
    }

    fn recent(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<VisitorEvent>, StorageError> {
        Ok(Vec::new())
    }

    fn count_distinct(
        &self,
        _field: DistinctField,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        Ok(0)
    }

    fn delete_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        Ok(0)
    }

    fn is_connected(&self) -> bool {
        false
    }
}
