//! Notification sinks for cell changes.
//!
//! The manager reports every outcome through a `NotificationSink`: the new
//! occupancy and status after a successful mutation, or the error kind and
//! message after a failed one. The UI layer owns the receiving end.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{CellError, ErrorKind};
use crate::types::{Cell, CellStatus};

/// One outcome reported by the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CellEvent {
    #[serde(rename_all = "camelCase")]
    Updated {
        cell_number: String,
        occupancy: u32,
        status: CellStatus,
    },
    #[serde(rename_all = "camelCase")]
    Removed { cell_number: String },
    #[serde(rename_all = "camelCase")]
    Failed {
        cell_number: String,
        kind: ErrorKind,
        message: String,
    },
}

impl CellEvent {
    pub fn updated(cell: &Cell) -> Self {
        CellEvent::Updated {
            cell_number: cell.number().to_string(),
            occupancy: cell.occupancy(),
            status: cell.status(),
        }
    }

    pub fn failed(cell_number: &str, err: &CellError) -> Self {
        CellEvent::Failed {
            cell_number: cell_number.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn cell_number(&self) -> &str {
        match self {
            CellEvent::Updated { cell_number, .. }
            | CellEvent::Removed { cell_number }
            | CellEvent::Failed { cell_number, .. } => cell_number,
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: CellEvent);
}

/// Drops every event.
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _event: CellEvent) {}
}

/// Writes events to the log.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: CellEvent) {
        match &event {
            CellEvent::Updated {
                cell_number,
                occupancy,
                status,
            } => log::info!("Cell {}: occupancy {} ({})", cell_number, occupancy, status),
            CellEvent::Removed { cell_number } => log::info!("Cell {} removed", cell_number),
            CellEvent::Failed {
                cell_number,
                kind,
                message,
            } => log::warn!("Cell {} {:?}: {}", cell_number, kind, message),
        }
    }
}

/// Forwards events to an unbounded channel drained by the UI thread.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CellEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: CellEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Cell event dropped: receiver closed");
        }
    }
}

/// Keeps every event in memory, oldest first.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CellEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CellEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<CellEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: CellEvent) {
        self.events.lock().push(event);
    }
}
