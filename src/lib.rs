//! Cell occupancy and status management for facility records.
//!
//! `CellManager` is the entry point: construct a store (`CellDb` or
//! `MemoryCellStore`) and a `NotificationSink` once at startup and pass them
//! in. UI code calls the manager and renders the events it emits.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod manager;
mod migrations;
pub mod notification;
pub mod occupancy;
pub mod store;
pub mod types;

use std::sync::Once;

pub use config::FacilityConfig;
pub use dashboard::{DashboardLoader, FacilitySnapshot, LoadHandle, SnapshotCache};
pub use db::CellDb;
pub use error::{CellError, CellFailure, ErrorKind};
pub use manager::CellManager;
pub use notification::{CellEvent, ChannelSink, LogSink, NoopSink, NotificationSink, RecordingSink};
pub use store::{CellStore, MemoryCellStore};
pub use types::{
    CapacityTotals, Cell, CellFilter, CellHold, CellStatus, CellSummary, CellType, SecurityLevel,
};

/// Install the `env_logger` backend for the `log` facade.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .try_init();
    });
}
