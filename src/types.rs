use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CellError;

/// Smallest and largest capacity a cell may be built with.
pub const MIN_CAPACITY: u32 = 1;
pub const MAX_CAPACITY: u32 = 50;

/// Normalize a user-entered enum label: lowercase, `_`/`-` treated as spaces.
fn normalize_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Kind of holding unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Single,
    Double,
    General,
    Solitary,
    Medical,
    #[serde(rename = "Maximum Security")]
    MaximumSecurity,
}

impl CellType {
    pub const ALL: [CellType; 6] = [
        CellType::Single,
        CellType::Double,
        CellType::General,
        CellType::Solitary,
        CellType::Medical,
        CellType::MaximumSecurity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Single => "Single",
            CellType::Double => "Double",
            CellType::General => "General",
            CellType::Solitary => "Solitary",
            CellType::Medical => "Medical",
            CellType::MaximumSecurity => "Maximum Security",
        }
    }
}

impl std::str::FromStr for CellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "single" => Ok(CellType::Single),
            "double" => Ok(CellType::Double),
            "general" => Ok(CellType::General),
            "solitary" => Ok(CellType::Solitary),
            "medical" => Ok(CellType::Medical),
            "maximum security" => Ok(CellType::MaximumSecurity),
            _ => Err(format!("Unknown cell type: {}", s)),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security classification of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecurityLevel {
    Minimum,
    Medium,
    Maximum,
    #[serde(rename = "Super Maximum")]
    SuperMaximum,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Minimum,
        SecurityLevel::Medium,
        SecurityLevel::Maximum,
        SecurityLevel::SuperMaximum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Minimum => "Minimum",
            SecurityLevel::Medium => "Medium",
            SecurityLevel::Maximum => "Maximum",
            SecurityLevel::SuperMaximum => "Super Maximum",
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "minimum" => Ok(SecurityLevel::Minimum),
            "medium" => Ok(SecurityLevel::Medium),
            "maximum" => Ok(SecurityLevel::Maximum),
            "super maximum" => Ok(SecurityLevel::SuperMaximum),
            _ => Err(format!("Unknown security level: {}", s)),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative hold placed on a cell, overriding its occupancy-derived status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellHold {
    #[serde(rename = "Under Maintenance")]
    UnderMaintenance,
    Cleaning,
    Closed,
}

impl CellHold {
    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    pub fn status(&self) -> CellStatus {
        match self {
            CellHold::UnderMaintenance => CellStatus::UnderMaintenance,
            CellHold::Cleaning => CellStatus::Cleaning,
            CellHold::Closed => CellStatus::Closed,
        }
    }

    /// Parse from SQL string.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.parse::<CellStatus>().ok()? {
            CellStatus::UnderMaintenance => Some(CellHold::UnderMaintenance),
            CellStatus::Cleaning => Some(CellHold::Cleaning),
            CellStatus::Closed => Some(CellHold::Closed),
            _ => None,
        }
    }
}

/// Status shown for a cell. Never stored as independent truth: see [`Cell::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellStatus {
    Occupied,
    Vacant,
    Full,
    #[serde(rename = "Under Maintenance")]
    UnderMaintenance,
    Cleaning,
    Closed,
}

impl CellStatus {
    pub const ALL: [CellStatus; 6] = [
        CellStatus::Occupied,
        CellStatus::Vacant,
        CellStatus::Full,
        CellStatus::UnderMaintenance,
        CellStatus::Cleaning,
        CellStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Occupied => "Occupied",
            CellStatus::Vacant => "Vacant",
            CellStatus::Full => "Full",
            CellStatus::UnderMaintenance => "Under Maintenance",
            CellStatus::Cleaning => "Cleaning",
            CellStatus::Closed => "Closed",
        }
    }
}

impl std::str::FromStr for CellStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "occupied" => Ok(CellStatus::Occupied),
            "vacant" => Ok(CellStatus::Vacant),
            "full" => Ok(CellStatus::Full),
            "under maintenance" | "maintenance" => Ok(CellStatus::UnderMaintenance),
            "cleaning" => Ok(CellStatus::Cleaning),
            "closed" => Ok(CellStatus::Closed),
            _ => Err(format!("Unknown cell status: {}", s)),
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A holding unit with fixed capacity and mutable occupancy.
///
/// Fields are crate-private so `0 <= occupancy <= capacity` can only be
/// changed through [`crate::occupancy`] transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub(crate) number: String,
    pub(crate) cell_type: CellType,
    pub(crate) capacity: u32,
    pub(crate) occupancy: u32,
    pub(crate) security_level: SecurityLevel,
    pub(crate) hold: Option<CellHold>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl Cell {
    /// Build a new, empty cell. Validates number and capacity.
    pub fn new(
        number: &str,
        cell_type: CellType,
        capacity: u32,
        security_level: SecurityLevel,
    ) -> Result<Self, CellError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(CellError::Validation("Cell number must not be empty".to_string()));
        }
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(CellError::Validation(format!(
                "Capacity must be between {} and {}, got {}",
                MIN_CAPACITY, MAX_CAPACITY, capacity
            )));
        }
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            number: number.to_string(),
            cell_type,
            capacity,
            occupancy: 0,
            security_level,
            hold: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Rehydrate a stored record, rejecting rows that break the occupancy invariant.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        number: String,
        cell_type: CellType,
        capacity: u32,
        occupancy: u32,
        security_level: SecurityLevel,
        hold: Option<CellHold>,
        created_at: String,
        updated_at: String,
    ) -> Result<Self, CellError> {
        if occupancy > capacity {
            return Err(CellError::Persistence(format!(
                "Stored cell {} has occupancy {} above capacity {}",
                number, occupancy, capacity
            )));
        }
        Ok(Self {
            number,
            cell_type,
            capacity,
            occupancy,
            security_level,
            hold,
            created_at,
            updated_at,
        })
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    pub fn hold(&self) -> Option<CellHold> {
        self.hold
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    /// The hold if one is set, otherwise Vacant / Full / Occupied from occupancy.
    pub fn status(&self) -> CellStatus {
        if let Some(hold) = self.hold {
            return hold.status();
        }
        if self.occupancy == 0 {
            CellStatus::Vacant
        } else if self.occupancy >= self.capacity {
            CellStatus::Full
        } else {
            CellStatus::Occupied
        }
    }

    pub fn available_space(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }

    pub fn occupancy_rate(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupancy as f64 / self.capacity as f64 * 100.0
    }

    pub fn has_available_space(&self) -> bool {
        self.available_space() > 0 && self.status() != CellStatus::UnderMaintenance
    }

    /// Flattened, serializable view for table rendering.
    pub fn summary(&self) -> CellSummary {
        CellSummary {
            number: self.number.clone(),
            cell_type: self.cell_type,
            capacity: self.capacity,
            occupancy: self.occupancy,
            security_level: self.security_level,
            status: self.status(),
            available_space: self.available_space(),
            occupancy_rate: self.occupancy_rate(),
            has_available_space: self.has_available_space(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Row shape handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSummary {
    pub number: String,
    #[serde(rename = "type")]
    pub cell_type: CellType,
    pub capacity: u32,
    pub occupancy: u32,
    pub security_level: SecurityLevel,
    pub status: CellStatus,
    pub available_space: u32,
    pub occupancy_rate: f64,
    pub has_available_space: bool,
    pub updated_at: String,
}

/// Predicates the store can evaluate for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFilter {
    SecurityLevel(SecurityLevel),
    Status(CellStatus),
    Available,
}

impl CellFilter {
    pub fn matches(&self, cell: &Cell) -> bool {
        match self {
            CellFilter::SecurityLevel(level) => cell.security_level == *level,
            CellFilter::Status(status) => cell.status() == *status,
            CellFilter::Available => cell.has_available_space(),
        }
    }
}

/// Facility-wide capacity totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityTotals {
    pub total_capacity: u64,
    pub total_occupancy: u64,
}

impl CapacityTotals {
    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Self {
        cells.into_iter().fold(Self::default(), |acc, cell| Self {
            total_capacity: acc.total_capacity + cell.capacity as u64,
            total_occupancy: acc.total_occupancy + cell.occupancy as u64,
        })
    }

    /// Percentage of total capacity in use; 0 when there is no capacity at all.
    pub fn utilization_percentage(&self) -> f64 {
        if self.total_capacity == 0 {
            return 0.0;
        }
        self.total_occupancy as f64 / self.total_capacity as f64 * 100.0
    }
}
