//! Error types for cell record operations
//!
//! Errors are classified by what the caller can do about them:
//! - Rejected input: validation failures, unknown cells
//! - Rejected transition: capacity overflow, illegal state change
//! - Infrastructure: store failures, background load timeouts

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// Error types for cell record operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    // Rejected input
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cell not found: {0}")]
    NotFound(String),

    // Rejected transitions
    #[error("Cell {number} cannot take {requested} more (capacity {capacity}, occupancy {occupancy})")]
    CapacityExceeded {
        number: String,
        capacity: u32,
        occupancy: u32,
        requested: u32,
    },

    #[error("Operation not allowed: {0}")]
    InvalidOperation(String),

    // Infrastructure
    #[error("Storage error: {0}")]
    Persistence(String),

    /// Carries the elapsed bound in milliseconds.
    #[error("Load timed out after {0} ms")]
    Timeout(u64),

    #[error("Load was cancelled")]
    Cancelled,
}

/// Coarse classification delivered to notification sinks and the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    CapacityExceeded,
    InvalidOperation,
    NotFound,
    Persistence,
    Timeout,
    Cancelled,
}

impl CellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CellError::Validation(_) => ErrorKind::Validation,
            CellError::NotFound(_) => ErrorKind::NotFound,
            CellError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            CellError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            CellError::Persistence(_) => ErrorKind::Persistence,
            CellError::Timeout(_) => ErrorKind::Timeout,
            CellError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the same request may succeed when repeated later
    /// without any change by the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, CellError::Persistence(_) | CellError::Timeout(_))
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CellError::Validation(_) => "Check the entered values and try again.",
            CellError::NotFound(_) => "Refresh the cell list; the cell may have been removed.",
            CellError::CapacityExceeded { .. } => {
                "Choose a cell with available space or release occupants first."
            }
            CellError::InvalidOperation(_) => {
                "Check the cell's current status and occupancy before retrying."
            }
            CellError::Persistence(_) => "Check the database file and disk space.",
            CellError::Timeout(_) => "The database took too long to respond. Try again.",
            CellError::Cancelled => "The load was cancelled before it finished.",
        }
    }
}

impl From<DbError> for CellError {
    fn from(err: DbError) -> Self {
        CellError::Persistence(err.to_string())
    }
}

impl From<rusqlite::Error> for CellError {
    fn from(err: rusqlite::Error) -> Self {
        CellError::Persistence(err.to_string())
    }
}

/// Serializable error representation for the UI layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFailure {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

impl From<&CellError> for CellFailure {
    fn from(err: &CellError) -> Self {
        CellFailure {
            message: err.to_string(),
            kind: err.kind(),
            can_retry: err.is_transient(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
