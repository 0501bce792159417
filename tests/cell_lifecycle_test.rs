//! End-to-end cell lifecycle against an on-disk SQLite database.

use std::sync::Arc;

use cellblock::{
    CellDb, CellError, CellEvent, CellManager, CellStatus, CellStore, CellType, ChannelSink,
    ErrorKind, RecordingSink, SecurityLevel,
};

fn open_manager(dir: &tempfile::TempDir) -> (CellManager, Arc<CellDb>, Arc<RecordingSink>) {
    cellblock::init_logging();
    let db = Arc::new(CellDb::open_at(dir.path().join("facility.db")).expect("open db"));
    let sink = Arc::new(RecordingSink::new());
    let manager = CellManager::new(db.clone(), sink.clone());
    (manager, db, sink)
}

#[test]
fn c101_walkthrough_persists_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, db, _) = open_manager(&dir);

    let cell = manager
        .create_from_labels("C-101", "Double", 2, "Medium")
        .unwrap();
    assert_eq!((cell.occupancy(), cell.status()), (0, CellStatus::Vacant));

    manager.admit("C-101", 2).unwrap();
    assert_eq!(db.find_by_number("C-101").unwrap().unwrap().status(), CellStatus::Full);

    manager.release("C-101", 1).unwrap();
    assert_eq!(
        db.find_by_number("C-101").unwrap().unwrap().status(),
        CellStatus::Occupied
    );

    manager.admit("C-101", 1).unwrap();
    manager.release("C-101", 2).unwrap();
    let stored = db.find_by_number("C-101").unwrap().unwrap();
    assert_eq!((stored.occupancy(), stored.status()), (0, CellStatus::Vacant));
}

#[test]
fn failed_operations_leave_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, db, sink) = open_manager(&dir);
    manager
        .create("C-101", CellType::Double, 2, SecurityLevel::Medium)
        .unwrap();

    let err = manager.admit("C-101", 3).unwrap_err();
    assert!(matches!(err, CellError::CapacityExceeded { .. }));
    assert_eq!(db.find_by_number("C-101").unwrap().unwrap().occupancy(), 0);

    let err = manager.release("C-101", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(db.find_by_number("C-101").unwrap().unwrap().occupancy(), 0);

    manager.admit("C-101", 1).unwrap();
    let err = manager.set_under_maintenance("C-101").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    manager.release("C-101", 1).unwrap();
    let cell = manager.set_under_maintenance("C-101").unwrap();
    assert_eq!(cell.status(), CellStatus::UnderMaintenance);
    assert_eq!(
        db.find_by_number("C-101").unwrap().unwrap().status(),
        CellStatus::UnderMaintenance
    );

    let failures: Vec<ErrorKind> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            CellEvent::Failed { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            ErrorKind::CapacityExceeded,
            ErrorKind::InvalidOperation,
            ErrorKind::InvalidOperation
        ]
    );
}

#[test]
fn transfer_is_atomic_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (manager, _, _) = open_manager(&dir);
        manager
            .create("A-1", CellType::General, 4, SecurityLevel::Minimum)
            .unwrap();
        manager
            .create("S-1", CellType::Solitary, 1, SecurityLevel::Maximum)
            .unwrap();
        manager.admit("A-1", 3).unwrap();
        manager.transfer("A-1", "S-1").unwrap();
        assert!(manager.transfer("A-1", "S-1").is_err());
    }

    // Fresh connection sees exactly one completed transfer.
    let (manager, _, _) = open_manager(&dir);
    assert_eq!(manager.get("A-1").unwrap().occupancy(), 2);
    let solitary = manager.get("S-1").unwrap();
    assert_eq!((solitary.occupancy(), solitary.status()), (1, CellStatus::Full));
    assert_eq!(manager.capacity_totals().unwrap().total_occupancy, 3);
}

#[test]
fn queries_and_delete_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _, _) = open_manager(&dir);
    assert_eq!(manager.utilization_percentage().unwrap(), 0.0);

    manager
        .create("M-1", CellType::Medical, 4, SecurityLevel::Medium)
        .unwrap();
    manager
        .create("X-1", CellType::MaximumSecurity, 1, SecurityLevel::SuperMaximum)
        .unwrap();
    manager.admit("M-1", 1).unwrap();
    manager.close("X-1").unwrap();

    assert_eq!(manager.list_by_status(CellStatus::Closed).unwrap().len(), 1);
    assert_eq!(
        manager
            .list_by_security_level(SecurityLevel::Medium)
            .unwrap()
            .len(),
        1
    );
    // Closed cells still report free space; only maintenance hides it.
    assert_eq!(manager.list_available().unwrap().len(), 2);
    assert_eq!(manager.utilization_percentage().unwrap(), 20.0);

    assert!(manager.delete("M-1").is_err());
    manager.delete("X-1").unwrap();
    assert_eq!(manager.list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn channel_sink_feeds_ui_side() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(CellDb::open_at(dir.path().join("facility.db")).unwrap());
    let (sink, mut rx) = ChannelSink::new();
    let manager = CellManager::new(db, Arc::new(sink));

    manager
        .create("C-101", CellType::Double, 2, SecurityLevel::Medium)
        .unwrap();
    manager.admit("C-101", 2).unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.cell_number(), "C-101");
    assert_eq!(
        rx.recv().await.unwrap(),
        CellEvent::Updated {
            cell_number: "C-101".to_string(),
            occupancy: 2,
            status: CellStatus::Full,
        }
    );
}
