//! Grid point storage backends.
//!
//! The [`GridStore`] trait holds the cumulative history of a run: every
//! point ever emitted, with its lineage and (once integrated) its result.
//! The scheduler reads it for fitting, deduplication, and convergence; the
//! run driver writes pending points into it and resolves them as results
//! arrive. Each run owns its own store, so independent runs never share
//! state.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryStore`] | In-memory `Vec` behind a read-write lock (the default) | none |
//! | `JournalStore` | JSONL file with `fs2` file locking, resumable | `journal` |
//!
//! # Record lifecycle
//!
//! [`insert`](GridStore::insert) adds a point with a pending result.
//! [`resolve`](GridStore::resolve) attaches its final result exactly once;
//! resolving an already-resolved point is a no-op, so re-submitting a
//! completed point after a restart is harmless.
//!
//! ```
//! use rapid_pe::store::{GridStore, MemoryStore};
//! use rapid_pe::{IntegralResult, IntegralStatus, IntrinsicPoint};
//!
//! let store = MemoryStore::new();
//! let id = store.next_point_id();
//! store.insert(IntrinsicPoint::new(id, vec![1.4, 1.3], 0, None)).unwrap();
//!
//! let result = IntegralResult { status: IntegralStatus::Converged, ..IntegralResult::pending() };
//! assert!(store.resolve(id, result.clone()).unwrap());
//! assert!(!store.resolve(id, result).unwrap());
//! ```

mod export;
#[cfg(feature = "journal")]
mod journal;
mod memory;

use std::sync::Arc;

#[cfg(feature = "journal")]
pub use journal::JournalStore;
pub use memory::MemoryStore;
use parking_lot::RwLock;

use crate::error::Result;
use crate::point::{GridRecord, IntegralResult, IntrinsicPoint, PointId};
use crate::types::IntegralStatus;

/// Storage for grid points and their results.
///
/// Implementations must be `Send + Sync`: points of one generation are
/// resolved concurrently from worker threads.
pub trait GridStore: Send + Sync {
    /// Adds a point with a pending result.
    ///
    /// Returns `Ok(false)` without changes if a point with the same id is
    /// already stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be persisted.
    fn insert(&self, point: IntrinsicPoint) -> Result<bool>;

    /// Attaches the final result of a point.
    ///
    /// Returns `Ok(false)` without changes if the point already holds a
    /// resolved result.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownPoint` for an id that was never inserted,
    /// `Error::InvalidConfig` for a pending `result`, or a storage error if
    /// the record cannot be persisted.
    fn resolve(&self, id: PointId, result: IntegralResult) -> Result<bool>;

    /// Returns a reference to the in-memory record buffer.
    ///
    /// Records appear in insertion order. Callers may hold a read lock for
    /// allocation-free access; never hold it across a call that writes.
    fn records_arc(&self) -> &Arc<RwLock<Vec<GridRecord>>>;

    /// Atomically returns the next unique point id.
    fn next_point_id(&self) -> PointId;

    /// Returns the next point id without consuming it.
    fn peek_next_point_id(&self) -> PointId;

    /// Reloads from an external source (e.g. a file written by another
    /// process). Returns `true` if the in-memory buffer changed.
    ///
    /// The default implementation is a no-op that returns `false`.
    fn refresh(&self) -> bool {
        false
    }
}

impl dyn GridStore + '_ {
    /// A snapshot of every record.
    #[must_use]
    pub fn records(&self) -> Vec<GridRecord> {
        self.records_arc().read().clone()
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records_arc().read().len()
    }

    /// Whether the store holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records_arc().read().is_empty()
    }

    /// The record of one point.
    #[must_use]
    pub fn get(&self, id: PointId) -> Option<GridRecord> {
        self.records_arc()
            .read()
            .iter()
            .find(|r| r.point.id == id)
            .cloned()
    }

    /// Records of one generation, in insertion order.
    #[must_use]
    pub fn generation(&self, index: u32) -> Vec<GridRecord> {
        self.records_arc()
            .read()
            .iter()
            .filter(|r| r.point.generation == index)
            .cloned()
            .collect()
    }

    /// Highest generation index present, if any.
    #[must_use]
    pub fn latest_generation(&self) -> Option<u32> {
        self.records_arc()
            .read()
            .iter()
            .map(|r| r.point.generation)
            .max()
    }

    /// Number of points in `generation` still waiting for a result.
    #[must_use]
    pub fn pending_in(&self, generation: u32) -> usize {
        self.records_arc()
            .read()
            .iter()
            .filter(|r| r.point.generation == generation && !r.status().is_resolved())
            .count()
    }

    /// Number of points with the given status across all generations.
    #[must_use]
    pub fn count_status(&self, status: IntegralStatus) -> usize {
        self.records_arc()
            .read()
            .iter()
            .filter(|r| r.status() == status)
            .count()
    }

    /// The usable record with the highest log evidence.
    #[must_use]
    pub fn best(&self) -> Option<GridRecord> {
        self.records_arc()
            .read()
            .iter()
            .filter(|r| r.status().is_usable() && r.result.log_evidence.is_finite())
            .max_by(|a, b| a.result.log_evidence.total_cmp(&b.result.log_evidence))
            .cloned()
    }
}
