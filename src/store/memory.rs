use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::GridStore;
use crate::error::{Error, Result};
use crate::point::{GridRecord, IntegralResult, IntrinsicPoint, PointId};

/// In-memory grid store (the default).
///
/// A thin wrapper around `Arc<RwLock<Vec<GridRecord>>>`.
pub struct MemoryStore {
    records: Arc<RwLock<Vec<GridRecord>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Creates a store pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: Vec<GridRecord>) -> Self {
        let next_id = next_id_after(&records);
        Self {
            records: Arc::new(RwLock::new(records)),
            next_id: AtomicU64::new(next_id),
        }
    }

    /// Ensures the id counter is at least `min_value`.
    pub(crate) fn bump_next_id(&self, min_value: u64) {
        self.next_id.fetch_max(min_value, Ordering::SeqCst);
    }

    /// Whether `id` is stored and already resolved.
    #[cfg(feature = "journal")]
    pub(crate) fn is_resolved(&self, id: PointId) -> Result<bool> {
        self.records
            .read()
            .iter()
            .find(|r| r.point.id == id)
            .map(|r| r.status().is_resolved())
            .ok_or(Error::UnknownPoint(id))
    }

    #[cfg(feature = "journal")]
    pub(crate) fn contains(&self, id: PointId) -> bool {
        self.records.read().iter().any(|r| r.point.id == id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GridStore for MemoryStore {
    fn insert(&self, point: IntrinsicPoint) -> Result<bool> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.point.id == point.id) {
            return Ok(false);
        }
        self.bump_next_id(point.id.0 + 1);
        records.push(GridRecord::pending(point));
        Ok(true)
    }

    fn resolve(&self, id: PointId, result: IntegralResult) -> Result<bool> {
        check_resolvable(&result)?;
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.point.id == id)
            .ok_or(Error::UnknownPoint(id))?;
        if record.status().is_resolved() {
            return Ok(false);
        }
        record.result = result;
        Ok(true)
    }

    fn records_arc(&self) -> &Arc<RwLock<Vec<GridRecord>>> {
        &self.records
    }

    fn next_point_id(&self) -> PointId {
        PointId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn peek_next_point_id(&self) -> PointId {
        PointId(self.next_id.load(Ordering::SeqCst))
    }
}

pub(super) fn next_id_after(records: &[GridRecord]) -> u64 {
    records
        .iter()
        .map(|r| r.point.id.0)
        .max()
        .map_or(0, |id| id + 1)
}

pub(super) fn check_resolvable(result: &IntegralResult) -> Result<()> {
    if result.status.is_resolved() {
        Ok(())
    } else {
        Err(Error::InvalidConfig {
            name: "result",
            reason: "a point cannot be resolved with a pending status".into(),
        })
    }
}
