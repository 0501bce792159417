use rusqlite::{params, Connection};

use super::*;
use crate::error::CellError;
use crate::store::CellStore;
use crate::types::{Cell, CellFilter, CellHold, CellStatus, CellType, SecurityLevel};

const CELL_COLUMNS: &str = "number, cell_type, capacity, occupancy, security_level,
                            hold, status, created_at, updated_at";

/// SQL mirror of `Cell::status`. Filters use this instead of the stored
/// `status` column, which older rows may carry out of step with occupancy.
const DERIVED_STATUS: &str = "CASE
        WHEN hold IS NOT NULL THEN hold
        WHEN occupancy = 0 THEN 'Vacant'
        WHEN occupancy >= capacity THEN 'Full'
        ELSE 'Occupied'
    END";

impl TryFrom<DbCellRow> for Cell {
    type Error = DbError;

    fn try_from(row: DbCellRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| DbError::CorruptRow {
            number: row.number.clone(),
            reason,
        };
        let cell_type: CellType = row.cell_type.parse().map_err(corrupt)?;
        let security_level: SecurityLevel = row.security_level.parse().map_err(corrupt)?;
        let hold = match row.hold.as_deref() {
            None => None,
            Some(raw) => Some(
                CellHold::from_str_opt(raw)
                    .ok_or_else(|| corrupt(format!("unknown hold '{}'", raw)))?,
            ),
        };
        let capacity = u32::try_from(row.capacity)
            .map_err(|_| corrupt(format!("capacity {} out of range", row.capacity)))?;
        let occupancy = u32::try_from(row.occupancy)
            .map_err(|_| corrupt(format!("occupancy {} out of range", row.occupancy)))?;

        let number = row.number.clone();
        let stored_status = row.status;
        let cell = Cell::from_parts(
            row.number,
            cell_type,
            capacity,
            occupancy,
            security_level,
            hold,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| DbError::CorruptRow {
            number,
            reason: e.to_string(),
        })?;

        // Rows edited outside this crate can carry a status that disagrees
        // with occupancy. The derived status wins.
        if cell.status().as_str() != stored_status {
            log::warn!(
                "Cell {} stored status '{}' disagrees with occupancy {}; using '{}'",
                cell.number(),
                stored_status,
                cell.occupancy(),
                cell.status()
            );
        }
        Ok(cell)
    }
}

impl CellDb {
    // =========================================================================
    // Cells
    // =========================================================================

    /// Helper: map a row to `DbCellRow`.
    pub(crate) fn map_cell_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbCellRow> {
        Ok(DbCellRow {
            number: row.get(0)?,
            cell_type: row.get(1)?,
            capacity: row.get(2)?,
            occupancy: row.get(3)?,
            security_level: row.get(4)?,
            hold: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Insert or update a cell. The `status` column is always rewritten from
    /// the record's derived status.
    fn upsert_cell(conn: &Connection, cell: &Cell) -> Result<(), DbError> {
        conn.execute(
            "INSERT INTO cells (
                number, cell_type, capacity, occupancy, security_level,
                hold, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(number) DO UPDATE SET
                occupancy = excluded.occupancy,
                hold = excluded.hold,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                cell.number(),
                cell.cell_type().as_str(),
                cell.capacity(),
                cell.occupancy(),
                cell.security_level().as_str(),
                cell.hold().map(|h| h.as_str()),
                cell.status().as_str(),
                cell.created_at(),
                cell.updated_at(),
            ],
        )?;
        Ok(())
    }

    fn query_cells(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Cell>, DbError> {
        let sql = format!(
            "SELECT {} FROM cells {} ORDER BY number",
            CELL_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_cell_row)?;
        let mut cells = Vec::new();
        for row in rows {
            cells.push(Cell::try_from(row?)?);
        }
        Ok(cells)
    }

    /// Get a cell by number.
    pub fn get_cell(&self, number: &str) -> Result<Option<Cell>, DbError> {
        self.with_conn(|conn| {
            let mut cells = Self::query_cells(conn, "WHERE number = ?1", &[&number])?;
            Ok(cells.pop())
        })
    }

    /// Get all cells, ordered by number.
    pub fn get_all_cells(&self) -> Result<Vec<Cell>, DbError> {
        self.with_conn(|conn| Self::query_cells(conn, "", &[]))
    }

    pub fn get_cells_by_security_level(&self, level: SecurityLevel) -> Result<Vec<Cell>, DbError> {
        self.with_conn(|conn| {
            Self::query_cells(conn, "WHERE security_level = ?1", &[&level.as_str()])
        })
    }

    /// Cells whose derived status is `status`.
    pub fn get_cells_by_status(&self, status: CellStatus) -> Result<Vec<Cell>, DbError> {
        let where_clause = format!("WHERE ({}) = ?1", DERIVED_STATUS);
        self.with_conn(|conn| Self::query_cells(conn, &where_clause, &[&status.as_str()]))
    }

    /// Cells with free places that are not under maintenance.
    pub fn get_available_cells(&self) -> Result<Vec<Cell>, DbError> {
        self.with_conn(|conn| {
            Self::query_cells(
                conn,
                "WHERE occupancy < capacity AND (hold IS NULL OR hold != ?1)",
                &[&CellHold::UnderMaintenance.as_str()],
            )
        })
    }

    pub fn delete_cell(&self, number: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM cells WHERE number = ?1", params![number])?;
            Ok(removed > 0)
        })
    }

    /// Number of prisoner rows still pointing at `number`.
    pub fn count_prisoners_in(&self, number: &str) -> Result<usize, DbError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM prisoners WHERE cell_number = ?1",
                params![number],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

impl CellStore for CellDb {
    fn find_by_number(&self, number: &str) -> Result<Option<Cell>, CellError> {
        Ok(self.get_cell(number)?)
    }

    fn save(&self, cell: &Cell) -> Result<(), CellError> {
        Ok(self.with_conn(|conn| Self::upsert_cell(conn, cell))?)
    }

    fn save_all(&self, cells: &[Cell]) -> Result<(), CellError> {
        Ok(self.with_transaction(|conn| {
            for cell in cells {
                Self::upsert_cell(conn, cell)?;
            }
            Ok(())
        })?)
    }

    fn delete(&self, number: &str) -> Result<bool, CellError> {
        Ok(self.delete_cell(number)?)
    }

    fn list_all(&self) -> Result<Vec<Cell>, CellError> {
        Ok(self.get_all_cells()?)
    }

    fn list_where(&self, filter: CellFilter) -> Result<Vec<Cell>, CellError> {
        let cells = match filter {
            CellFilter::SecurityLevel(level) => self.get_cells_by_security_level(level)?,
            CellFilter::Status(status) => self.get_cells_by_status(status)?,
            CellFilter::Available => self.get_available_cells()?,
        };
        Ok(cells)
    }
}
