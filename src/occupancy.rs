//! Occupancy and status transitions for a single cell.
//!
//! Every function here is pure: it validates against the current record and
//! returns an updated copy, or an error with the input untouched. Status is
//! never assigned directly; it follows from occupancy plus the optional hold
//! (see [`Cell::status`]), so the two cannot drift apart.

use chrono::Utc;

use crate::error::CellError;
use crate::types::{Cell, CellHold};

fn touched(cell: &Cell) -> Cell {
    let mut next = cell.clone();
    next.updated_at = Utc::now().to_rfc3339();
    next
}

fn require_positive(count: u32) -> Result<(), CellError> {
    if count == 0 {
        return Err(CellError::Validation("Count must be at least 1".to_string()));
    }
    Ok(())
}

/// Reconcile the hold with a new occupancy count.
///
/// A cell filled to capacity reads Full whatever hold it had. A cleaning hold
/// ends when the cell empties; maintenance and closed holds survive emptying.
fn settle_hold(next: &mut Cell) {
    if next.occupancy == next.capacity {
        next.hold = None;
    } else if next.occupancy == 0 && next.hold == Some(CellHold::Cleaning) {
        next.hold = None;
    }
}

/// Add `count` occupants. All-or-nothing.
///
/// Only capacity limits an admission. A partial admission leaves any hold in
/// place; filling the cell replaces it with Full.
pub fn admit(cell: &Cell, count: u32) -> Result<Cell, CellError> {
    require_positive(count)?;
    if count > cell.available_space() {
        return Err(CellError::CapacityExceeded {
            number: cell.number.clone(),
            capacity: cell.capacity,
            occupancy: cell.occupancy,
            requested: count,
        });
    }

    let mut next = touched(cell);
    next.occupancy += count;
    settle_hold(&mut next);
    if next.hold.is_some() {
        log::debug!(
            "Cell {} admitted {} while {}",
            next.number,
            count,
            next.status()
        );
    }
    Ok(next)
}

/// Remove `count` occupants.
pub fn release(cell: &Cell, count: u32) -> Result<Cell, CellError> {
    require_positive(count)?;
    if count > cell.occupancy {
        return Err(CellError::InvalidOperation(format!(
            "Cannot release {} from cell {} holding {}",
            count, cell.number, cell.occupancy
        )));
    }

    let mut next = touched(cell);
    next.occupancy -= count;
    settle_hold(&mut next);
    Ok(next)
}

/// Direct correction of the occupancy count. Holds settle as for admit and
/// release.
pub fn set_occupancy(cell: &Cell, value: u32) -> Result<Cell, CellError> {
    if value > cell.capacity {
        return Err(CellError::Validation(format!(
            "Occupancy must be between 0 and {}, got {}",
            cell.capacity, value
        )));
    }

    let mut next = touched(cell);
    next.occupancy = value;
    settle_hold(&mut next);
    Ok(next)
}

/// Move one occupant from `from` to `to`, returning both updated records.
pub fn transfer(from: &Cell, to: &Cell) -> Result<(Cell, Cell), CellError> {
    if from.number == to.number {
        return Err(CellError::Validation(format!(
            "Cannot transfer within the same cell {}",
            from.number
        )));
    }
    let released = release(from, 1)?;
    let admitted = admit(to, 1)?;
    Ok((released, admitted))
}

fn require_empty(cell: &Cell, action: &str) -> Result<(), CellError> {
    if cell.occupancy > 0 {
        return Err(CellError::InvalidOperation(format!(
            "Cannot {} cell {} while it holds {} occupant(s)",
            action, cell.number, cell.occupancy
        )));
    }
    Ok(())
}

pub fn set_under_maintenance(cell: &Cell) -> Result<Cell, CellError> {
    require_empty(cell, "put under maintenance")?;
    let mut next = touched(cell);
    next.hold = Some(CellHold::UnderMaintenance);
    Ok(next)
}

/// Lift a maintenance hold; status falls back to the occupancy-derived value.
/// Cells without one are returned unchanged.
pub fn clear_maintenance(cell: &Cell) -> Cell {
    if cell.hold != Some(CellHold::UnderMaintenance) {
        return cell.clone();
    }
    let mut next = touched(cell);
    next.hold = None;
    next
}

pub fn start_cleaning(cell: &Cell) -> Result<Cell, CellError> {
    require_empty(cell, "clean")?;
    if cell.hold == Some(CellHold::UnderMaintenance) {
        return Err(CellError::InvalidOperation(format!(
            "Cell {} is under maintenance",
            cell.number
        )));
    }
    let mut next = touched(cell);
    next.hold = Some(CellHold::Cleaning);
    Ok(next)
}

/// Close a cell to admissions. Current occupants stay until released.
pub fn close(cell: &Cell) -> Result<Cell, CellError> {
    if cell.hold == Some(CellHold::UnderMaintenance) {
        return Err(CellError::InvalidOperation(format!(
            "Cell {} is under maintenance; clear maintenance first",
            cell.number
        )));
    }
    let mut next = touched(cell);
    next.hold = Some(CellHold::Closed);
    Ok(next)
}

/// Lift a cleaning or closed hold.
pub fn reopen(cell: &Cell) -> Result<Cell, CellError> {
    match cell.hold {
        Some(CellHold::Cleaning) | Some(CellHold::Closed) => {
            let mut next = touched(cell);
            next.hold = None;
            Ok(next)
        }
        Some(CellHold::UnderMaintenance) => Err(CellError::InvalidOperation(format!(
            "Cell {} is under maintenance; use clear maintenance",
            cell.number
        ))),
        None => Ok(cell.clone()),
    }
}

pub fn ensure_deletable(cell: &Cell) -> Result<(), CellError> {
    require_empty(cell, "delete")
}
