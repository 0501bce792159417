//! Persistence boundary for cell records.
//!
//! The manager only ever talks to a `CellStore`. `CellDb` is the SQLite
//! implementation; `MemoryCellStore` backs tests and embedded use.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::CellError;
use crate::types::{Cell, CellFilter};

pub trait CellStore: Send + Sync {
    /// Look up a cell. Absence is `Ok(None)`, not an error.
    fn find_by_number(&self, number: &str) -> Result<Option<Cell>, CellError>;

    /// Insert or update a single record.
    fn save(&self, cell: &Cell) -> Result<(), CellError>;

    /// Write several records as one unit: all land or none do.
    fn save_all(&self, cells: &[Cell]) -> Result<(), CellError>;

    /// Remove a record. Returns whether a record existed.
    fn delete(&self, number: &str) -> Result<bool, CellError>;

    /// All cells, ordered by number.
    fn list_all(&self) -> Result<Vec<Cell>, CellError>;

    /// Cells matching `filter`, ordered by number.
    fn list_where(&self, filter: CellFilter) -> Result<Vec<Cell>, CellError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|cell| filter.matches(cell))
            .collect())
    }
}

/// In-process store keyed by cell number.
#[derive(Default)]
pub struct MemoryCellStore {
    cells: RwLock<BTreeMap<String, Cell>>,
}

impl MemoryCellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }
}

impl CellStore for MemoryCellStore {
    fn find_by_number(&self, number: &str) -> Result<Option<Cell>, CellError> {
        Ok(self.cells.read().get(number).cloned())
    }

    fn save(&self, cell: &Cell) -> Result<(), CellError> {
        self.cells
            .write()
            .insert(cell.number().to_string(), cell.clone());
        Ok(())
    }

    fn save_all(&self, cells: &[Cell]) -> Result<(), CellError> {
        let mut guard = self.cells.write();
        for cell in cells {
            guard.insert(cell.number().to_string(), cell.clone());
        }
        Ok(())
    }

    fn delete(&self, number: &str) -> Result<bool, CellError> {
        Ok(self.cells.write().remove(number).is_some())
    }

    fn list_all(&self) -> Result<Vec<Cell>, CellError> {
        Ok(self.cells.read().values().cloned().collect())
    }
}
