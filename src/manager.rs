//! Cell record manager.
//!
//! Owns the occupancy invariant for every cell. Each mutation takes the
//! cell's record lock, reloads the record, validates the transition in
//! memory, persists the result, and only then reports it. Nothing is written
//! when a check fails.
//!
//! Lock order: record locks are always taken in ascending cell-number order,
//! and the store's own locks are only ever taken while holding record locks,
//! never the other way round.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::CellError;
use crate::notification::{CellEvent, NotificationSink};
use crate::occupancy;
use crate::store::CellStore;
use crate::types::{CapacityTotals, Cell, CellFilter, CellStatus, CellType, SecurityLevel};

pub struct CellManager {
    store: Arc<dyn CellStore>,
    sink: Arc<dyn NotificationSink>,
    record_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CellManager {
    pub fn new(store: Arc<dyn CellStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            sink,
            record_locks: DashMap::new(),
        }
    }

    fn record_lock(&self, number: &str) -> Arc<Mutex<()>> {
        self.record_locks
            .entry(number.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn load(&self, number: &str) -> Result<Cell, CellError> {
        self.store
            .find_by_number(number)?
            .ok_or_else(|| CellError::NotFound(number.to_string()))
    }

    fn report(&self, number: &str, result: &Result<Cell, CellError>) {
        match result {
            Ok(cell) => self.sink.notify(CellEvent::updated(cell)),
            Err(e) => self.sink.notify(CellEvent::failed(number, e)),
        }
    }

    /// Apply `op` to the current record under its lock and persist the result.
    fn mutate<F>(&self, number: &str, op: F) -> Result<Cell, CellError>
    where
        F: FnOnce(&Cell) -> Result<Cell, CellError>,
    {
        let result = (|| -> Result<Cell, CellError> {
            let lock = self.record_lock(number);
            let _guard = lock.lock();
            let current = self.load(number)?;
            let next = op(&current)?;
            if next != current {
                self.store.save(&next)?;
            }
            Ok(next)
        })();
        self.report(number, &result);
        result
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Register a new, empty cell.
    pub fn create(
        &self,
        number: &str,
        cell_type: CellType,
        capacity: u32,
        security_level: SecurityLevel,
    ) -> Result<Cell, CellError> {
        let number = number.trim();
        let result = (|| -> Result<Cell, CellError> {
            let cell = Cell::new(number, cell_type, capacity, security_level)?;
            let lock = self.record_lock(number);
            let _guard = lock.lock();
            if self.store.find_by_number(number)?.is_some() {
                return Err(CellError::Validation(format!(
                    "Cell number {} is already in use",
                    number
                )));
            }
            self.store.save(&cell)?;
            log::info!(
                "Created cell {} ({}, capacity {}, {})",
                number,
                cell_type,
                capacity,
                security_level
            );
            Ok(cell)
        })();
        self.report(number, &result);
        result
    }

    /// Register a new cell from form labels, e.g. `"Maximum Security"`.
    pub fn create_from_labels(
        &self,
        number: &str,
        cell_type: &str,
        capacity: i64,
        security_level: &str,
    ) -> Result<Cell, CellError> {
        let parsed = (|| -> Result<(CellType, u32, SecurityLevel), CellError> {
            let cell_type: CellType = cell_type.parse().map_err(CellError::Validation)?;
            let security_level: SecurityLevel =
                security_level.parse().map_err(CellError::Validation)?;
            let capacity = u32::try_from(capacity).map_err(|_| {
                CellError::Validation(format!("Capacity must be positive, got {}", capacity))
            })?;
            Ok((cell_type, capacity, security_level))
        })();
        match parsed {
            Ok((cell_type, capacity, security_level)) => {
                self.create(number, cell_type, capacity, security_level)
            }
            Err(e) => {
                self.sink.notify(CellEvent::failed(number.trim(), &e));
                Err(e)
            }
        }
    }

    pub fn admit(&self, number: &str, count: u32) -> Result<Cell, CellError> {
        log::debug!("Admitting {} to cell {}", count, number);
        self.mutate(number, |cell| occupancy::admit(cell, count))
    }

    pub fn release(&self, number: &str, count: u32) -> Result<Cell, CellError> {
        log::debug!("Releasing {} from cell {}", count, number);
        self.mutate(number, |cell| occupancy::release(cell, count))
    }

    pub fn set_occupancy(&self, number: &str, value: u32) -> Result<Cell, CellError> {
        self.mutate(number, |cell| occupancy::set_occupancy(cell, value))
    }

    pub fn set_under_maintenance(&self, number: &str) -> Result<Cell, CellError> {
        self.mutate(number, occupancy::set_under_maintenance)
    }

    pub fn clear_maintenance(&self, number: &str) -> Result<Cell, CellError> {
        self.mutate(number, |cell| Ok(occupancy::clear_maintenance(cell)))
    }

    pub fn start_cleaning(&self, number: &str) -> Result<Cell, CellError> {
        self.mutate(number, occupancy::start_cleaning)
    }

    pub fn close(&self, number: &str) -> Result<Cell, CellError> {
        self.mutate(number, occupancy::close)
    }

    pub fn reopen(&self, number: &str) -> Result<Cell, CellError> {
        self.mutate(number, occupancy::reopen)
    }

    /// Move one occupant between cells in a single store write.
    ///
    /// Returns the updated `(from, to)` pair. On any failure neither cell changes.
    pub fn transfer(&self, from: &str, to: &str) -> Result<(Cell, Cell), CellError> {
        let result = (|| -> Result<(Cell, Cell), CellError> {
            if from == to {
                return Err(CellError::Validation(format!(
                    "Cannot transfer within the same cell {}",
                    from
                )));
            }
            let (first, second) = if from < to { (from, to) } else { (to, from) };
            let first_lock = self.record_lock(first);
            let second_lock = self.record_lock(second);
            let _first_guard = first_lock.lock();
            let _second_guard = second_lock.lock();

            let source = self.load(from)?;
            let target = self.load(to)?;
            let (source, target) = occupancy::transfer(&source, &target)?;
            self.store.save_all(&[source.clone(), target.clone()])?;
            log::info!("Transferred one occupant from cell {} to {}", from, to);
            Ok((source, target))
        })();

        match &result {
            Ok((source, target)) => {
                self.sink.notify(CellEvent::updated(source));
                self.sink.notify(CellEvent::updated(target));
            }
            Err(e) => self.sink.notify(CellEvent::failed(from, e)),
        }
        result
    }

    /// Remove an empty cell. Prisoner records pointing at it are not touched.
    pub fn delete(&self, number: &str) -> Result<(), CellError> {
        let result = (|| -> Result<(), CellError> {
            let lock = self.record_lock(number);
            let _guard = lock.lock();
            let cell = self.load(number)?;
            occupancy::ensure_deletable(&cell)?;
            if !self.store.delete(number)? {
                return Err(CellError::NotFound(number.to_string()));
            }
            log::info!("Deleted cell {}", number);
            Ok(())
        })();

        match &result {
            Ok(()) => self.sink.notify(CellEvent::Removed {
                cell_number: number.to_string(),
            }),
            Err(e) => self.sink.notify(CellEvent::failed(number, e)),
        }
        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, number: &str) -> Result<Cell, CellError> {
        self.load(number)
    }

    pub fn list_all(&self) -> Result<Vec<Cell>, CellError> {
        self.store.list_all()
    }

    pub fn list_by_security_level(&self, level: SecurityLevel) -> Result<Vec<Cell>, CellError> {
        self.store.list_where(CellFilter::SecurityLevel(level))
    }

    pub fn list_by_status(&self, status: CellStatus) -> Result<Vec<Cell>, CellError> {
        self.store.list_where(CellFilter::Status(status))
    }

    /// Cells with free places that are not under maintenance.
    pub fn list_available(&self) -> Result<Vec<Cell>, CellError> {
        self.store.list_where(CellFilter::Available)
    }

    pub fn capacity_totals(&self) -> Result<CapacityTotals, CellError> {
        Ok(CapacityTotals::from_cells(&self.store.list_all()?))
    }

    pub fn utilization_percentage(&self) -> Result<f64, CellError> {
        Ok(self.capacity_totals()?.utilization_percentage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::notification::RecordingSink;
    use crate::store::MemoryCellStore;

    fn setup() -> (CellManager, Arc<MemoryCellStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryCellStore::new());
        let sink = Arc::new(RecordingSink::new());
        let manager = CellManager::new(store.clone(), sink.clone());
        (manager, store, sink)
    }

    fn with_c101(manager: &CellManager) {
        manager
            .create("C-101", CellType::Double, 2, SecurityLevel::Medium)
            .expect("create C-101");
    }

    #[test]
    fn test_c101_scenario() {
        let (manager, _, sink) = setup();
        with_c101(&manager);
        let cell = manager.get("C-101").unwrap();
        assert_eq!((cell.occupancy(), cell.status()), (0, CellStatus::Vacant));

        let steps: [(&str, u32, u32, CellStatus); 4] = [
            ("admit", 2, 2, CellStatus::Full),
            ("release", 1, 1, CellStatus::Occupied),
            ("admit", 1, 2, CellStatus::Full),
            ("release", 2, 0, CellStatus::Vacant),
        ];
        for (op, count, expected_occupancy, expected_status) in steps {
            let cell = match op {
                "admit" => manager.admit("C-101", count),
                _ => manager.release("C-101", count),
            }
            .unwrap();
            assert_eq!(cell.occupancy(), expected_occupancy, "after {} {}", op, count);
            assert_eq!(cell.status(), expected_status, "after {} {}", op, count);
        }

        let events = sink.events();
        assert_eq!(events.len(), 5);
        assert_eq!(
            events.last(),
            Some(&CellEvent::Updated {
                cell_number: "C-101".to_string(),
                occupancy: 0,
                status: CellStatus::Vacant,
            })
        );
    }

    #[test]
    fn test_overflow_leaves_store_untouched() {
        let (manager, store, sink) = setup();
        with_c101(&manager);
        sink.take();

        let err = manager.admit("C-101", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(store.find_by_number("C-101").unwrap().unwrap().occupancy(), 0);

        match &sink.events()[..] {
            [CellEvent::Failed {
                cell_number, kind, ..
            }] => {
                assert_eq!(cell_number, "C-101");
                assert_eq!(*kind, ErrorKind::CapacityExceeded);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_maintenance_scenario() {
        let (manager, _, _) = setup();
        with_c101(&manager);
        manager.admit("C-101", 1).unwrap();

        let err = manager.set_under_maintenance("C-101").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(manager.get("C-101").unwrap().status(), CellStatus::Occupied);

        manager.release("C-101", 1).unwrap();
        let cell = manager.set_under_maintenance("C-101").unwrap();
        assert_eq!(cell.status(), CellStatus::UnderMaintenance);
        assert!(manager.list_available().unwrap().is_empty());

        let cell = manager.clear_maintenance("C-101").unwrap();
        assert_eq!(cell.status(), CellStatus::Vacant);
        assert_eq!(manager.list_available().unwrap().len(), 1);
    }

    #[test]
    fn test_admit_fills_held_cells() {
        let (manager, store, _) = setup();
        with_c101(&manager);
        manager.set_under_maintenance("C-101").unwrap();

        let cell = manager.admit("C-101", 2).unwrap();
        assert_eq!((cell.occupancy(), cell.status()), (2, CellStatus::Full));
        assert_eq!(store.find_by_number("C-101").unwrap().unwrap().hold(), None);

        manager
            .create("X-1", CellType::Single, 1, SecurityLevel::Maximum)
            .unwrap();
        manager.close("X-1").unwrap();
        let cell = manager.admit("X-1", 1).unwrap();
        assert_eq!(cell.status(), CellStatus::Full);
    }

    #[test]
    fn test_create_validation() {
        let (manager, store, sink) = setup();
        with_c101(&manager);

        let dup = manager
            .create(" C-101 ", CellType::Single, 1, SecurityLevel::Minimum)
            .unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::Validation);

        let bad_capacity = manager
            .create("C-102", CellType::Single, 51, SecurityLevel::Minimum)
            .unwrap_err();
        assert_eq!(bad_capacity.kind(), ErrorKind::Validation);

        let bad_type = manager
            .create_from_labels("C-103", "Penthouse", 2, "Medium")
            .unwrap_err();
        assert_eq!(bad_type.kind(), ErrorKind::Validation);

        let negative = manager
            .create_from_labels("C-104", "Single", -1, "Medium")
            .unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Validation);

        assert_eq!(store.len(), 1);
        let failures = sink
            .events()
            .iter()
            .filter(|e| matches!(e, CellEvent::Failed { .. }))
            .count();
        assert_eq!(failures, 4);

        let cell = manager
            .create_from_labels("M-1", "maximum security", 1, "Super Maximum")
            .unwrap();
        assert_eq!(cell.cell_type(), CellType::MaximumSecurity);
        assert_eq!(cell.security_level(), SecurityLevel::SuperMaximum);
    }

    #[test]
    fn test_unknown_cell_is_not_found() {
        let (manager, _, sink) = setup();
        assert_eq!(manager.admit("nope", 1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(manager.get("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(manager.delete("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_delete_requires_empty_cell() {
        let (manager, store, sink) = setup();
        with_c101(&manager);
        manager.admit("C-101", 1).unwrap();

        let err = manager.delete("C-101").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(store.len(), 1);

        manager.release("C-101", 1).unwrap();
        manager.delete("C-101").unwrap();
        assert!(store.is_empty());
        assert_eq!(
            sink.events().last(),
            Some(&CellEvent::Removed {
                cell_number: "C-101".to_string()
            })
        );
    }

    #[test]
    fn test_transfer_updates_both_or_neither() {
        let (manager, _, sink) = setup();
        with_c101(&manager);
        manager
            .create("S-1", CellType::Solitary, 1, SecurityLevel::Maximum)
            .unwrap();
        manager.admit("C-101", 2).unwrap();
        sink.take();

        let (from, to) = manager.transfer("C-101", "S-1").unwrap();
        assert_eq!((from.occupancy(), from.status()), (1, CellStatus::Occupied));
        assert_eq!((to.occupancy(), to.status()), (1, CellStatus::Full));
        assert_eq!(sink.take().len(), 2);

        // Target is full now: nothing may change on either side.
        let err = manager.transfer("C-101", "S-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(manager.get("C-101").unwrap().occupancy(), 1);
        assert_eq!(manager.get("S-1").unwrap().occupancy(), 1);

        // Reverse direction takes the locks in the same order.
        let (from, to) = manager.transfer("S-1", "C-101").unwrap();
        assert_eq!(from.occupancy(), 0);
        assert_eq!(to.occupancy(), 2);

        let err = manager.transfer("C-101", "C-101").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_queries_and_totals() {
        let (manager, _, _) = setup();
        assert_eq!(manager.utilization_percentage().unwrap(), 0.0);

        with_c101(&manager);
        manager
            .create("G-1", CellType::General, 8, SecurityLevel::Minimum)
            .unwrap();
        manager
            .create("X-1", CellType::MaximumSecurity, 2, SecurityLevel::SuperMaximum)
            .unwrap();
        manager.admit("C-101", 2).unwrap();
        manager.admit("G-1", 3).unwrap();
        manager.set_under_maintenance("X-1").unwrap();

        let totals = manager.capacity_totals().unwrap();
        assert_eq!(totals.total_capacity, 12);
        assert_eq!(totals.total_occupancy, 5);
        let pct = manager.utilization_percentage().unwrap();
        assert!((pct - 41.666).abs() < 0.01, "{}", pct);

        assert_eq!(manager.list_all().unwrap().len(), 3);
        assert_eq!(manager.list_by_status(CellStatus::Full).unwrap().len(), 1);
        assert_eq!(
            manager
                .list_by_security_level(SecurityLevel::SuperMaximum)
                .unwrap()[0]
                .number(),
            "X-1"
        );
        let available: Vec<String> = manager
            .list_available()
            .unwrap()
            .iter()
            .map(|c| c.number().to_string())
            .collect();
        assert_eq!(available, vec!["G-1"]);
    }

    #[test]
    fn test_noop_clear_maintenance_skips_write() {
        let (manager, store, _) = setup();
        with_c101(&manager);
        let before = store.find_by_number("C-101").unwrap().unwrap();
        let after = manager.clear_maintenance("C-101").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_concurrent_admits_never_overfill() {
        let (manager, store, _) = setup();
        let manager = Arc::new(manager);
        manager
            .create("G-50", CellType::General, 50, SecurityLevel::Minimum)
            .unwrap();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.admit("G-50", 1).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 50);
        let cell = store.find_by_number("G-50").unwrap().unwrap();
        assert_eq!(cell.occupancy(), 50);
        assert_eq!(cell.status(), CellStatus::Full);
    }

    #[test]
    fn test_concurrent_cross_transfers_do_not_deadlock() {
        let (manager, _, _) = setup();
        let manager = Arc::new(manager);
        manager
            .create("A", CellType::General, 50, SecurityLevel::Medium)
            .unwrap();
        manager
            .create("B", CellType::General, 50, SecurityLevel::Medium)
            .unwrap();
        manager.admit("A", 25).unwrap();
        manager.admit("B", 25).unwrap();

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    let _ = if i % 2 == 0 {
                        manager.transfer("A", "B")
                    } else {
                        manager.transfer("B", "A")
                    };
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = manager.capacity_totals().unwrap().total_occupancy;
        assert_eq!(total, 50);
    }
}
