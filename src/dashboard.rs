//! Background facility snapshot loads for the dashboard.
//!
//! A load runs the store queries on a blocking worker, bounded by a timeout,
//! and hands its result to a single completion callback. Cancelling a load
//! before it completes guarantees the callback never runs. Successful
//! snapshots are kept in a `SnapshotCache` so the dashboard can skip reloads
//! while the last one is still fresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::FacilityConfig;
use crate::error::CellError;
use crate::manager::CellManager;
use crate::types::{CapacityTotals, Cell, CellStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: CellStatus,
    pub count: usize,
}

/// Facility-wide figures shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitySnapshot {
    pub cell_count: usize,
    pub available_cells: usize,
    pub totals: CapacityTotals,
    pub utilization_percentage: f64,
    pub status_counts: Vec<StatusCount>,
    pub loaded_at: DateTime<Utc>,
}

impl FacilitySnapshot {
    pub fn from_cells(cells: &[Cell], loaded_at: DateTime<Utc>) -> Self {
        let totals = CapacityTotals::from_cells(cells);
        let status_counts = CellStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: *status,
                count: cells.iter().filter(|c| c.status() == *status).count(),
            })
            .collect();
        Self {
            cell_count: cells.len(),
            available_cells: cells.iter().filter(|c| c.has_available_space()).count(),
            totals,
            utilization_percentage: totals.utilization_percentage(),
            status_counts,
            loaded_at,
        }
    }

    pub fn count_for(&self, status: CellStatus) -> usize {
        self.status_counts
            .iter()
            .find(|sc| sc.status == status)
            .map(|sc| sc.count)
            .unwrap_or(0)
    }
}

/// Read every cell once and summarize. Runs on the caller's thread.
pub fn load_snapshot(manager: &CellManager) -> Result<FacilitySnapshot, CellError> {
    let cells = manager.list_all()?;
    Ok(FacilitySnapshot::from_cells(&cells, Utc::now()))
}

// ---------------------------------------------------------------------------
// Freshness cache
// ---------------------------------------------------------------------------

/// Last successful snapshot, considered fresh for `ttl` after it was loaded.
pub struct SnapshotCache {
    ttl: chrono::Duration,
    slot: Mutex<Option<FacilitySnapshot>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
            slot: Mutex::new(None),
        }
    }

    pub fn store(&self, snapshot: FacilitySnapshot) {
        *self.slot.lock() = Some(snapshot);
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }

    /// The cached snapshot if it was loaded less than `ttl` before `now`.
    pub fn fresh_at(&self, now: DateTime<Utc>) -> Option<FacilitySnapshot> {
        let slot = self.slot.lock();
        slot.as_ref()
            .filter(|snap| now.signed_duration_since(snap.loaded_at) < self.ttl)
            .cloned()
    }

    pub fn fresh(&self) -> Option<FacilitySnapshot> {
        self.fresh_at(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Background loads
// ---------------------------------------------------------------------------

/// Handle to an in-flight snapshot load.
pub struct LoadHandle {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LoadHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop the load. If the callback has not started yet, it never will.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
        log::debug!("Snapshot load {} cancelled", self.id);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct DashboardLoader {
    manager: Arc<CellManager>,
    runtime: Handle,
    timeout: Duration,
    cache: Arc<SnapshotCache>,
}

impl DashboardLoader {
    pub fn new(
        manager: Arc<CellManager>,
        runtime: Handle,
        timeout: Duration,
        snapshot_ttl: Duration,
    ) -> Self {
        Self {
            manager,
            runtime,
            timeout,
            cache: Arc::new(SnapshotCache::new(snapshot_ttl)),
        }
    }

    pub fn from_config(manager: Arc<CellManager>, runtime: Handle, config: &FacilityConfig) -> Self {
        Self::new(manager, runtime, config.load_timeout(), config.snapshot_ttl())
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Start a snapshot load. `on_complete` runs at most once, on a runtime
    /// worker thread, with either the snapshot or the error that stopped it.
    pub fn spawn_snapshot<F>(&self, on_complete: F) -> LoadHandle
    where
        F: FnOnce(Result<FacilitySnapshot, CellError>) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));
        let manager = Arc::clone(&self.manager);
        let cache = Arc::clone(&self.cache);
        let timeout = self.timeout;
        let task_cancelled = Arc::clone(&cancelled);

        let task = self.runtime.spawn(async move {
            let work = tokio::task::spawn_blocking(move || load_snapshot(&manager));
            let result = match tokio::time::timeout(timeout, work).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) if join_err.is_cancelled() => Err(CellError::Cancelled),
                Ok(Err(join_err)) => Err(CellError::Persistence(format!(
                    "Snapshot worker failed: {}",
                    join_err
                ))),
                Err(_) => Err(CellError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };

            if task_cancelled.load(Ordering::SeqCst) {
                log::debug!("Snapshot load {} finished after cancel; result dropped", id);
                return;
            }
            match &result {
                Ok(snapshot) => {
                    log::debug!(
                        "Snapshot load {} complete: {} cells, {:.1}% utilized",
                        id,
                        snapshot.cell_count,
                        snapshot.utilization_percentage
                    );
                    cache.store(snapshot.clone());
                }
                Err(e) => log::warn!("Snapshot load {} failed: {}", id, e),
            }
            on_complete(result);
        });

        LoadHandle {
            id,
            cancelled,
            task,
        }
    }

    /// Serve the cached snapshot if still fresh, otherwise start a load.
    ///
    /// Returns `None` when the callback was already invoked from the cache.
    pub fn refresh_if_stale<F>(&self, on_complete: F) -> Option<LoadHandle>
    where
        F: FnOnce(Result<FacilitySnapshot, CellError>) + Send + 'static,
    {
        if let Some(snapshot) = self.cache.fresh() {
            on_complete(Ok(snapshot));
            return None;
        }
        Some(self.spawn_snapshot(on_complete))
    }
}
