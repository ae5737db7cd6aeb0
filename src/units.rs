// 📏 Units & Origins - fixed enumerations stored as small integers

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// UNIT CODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitCode {
    Kilogram,
    Gram,
    Liter,
    Milliliter,
    Unit,
    Meter,
    SquareMeter,
}

impl UnitCode {
    pub const ALL: [UnitCode; 7] = [
        UnitCode::Kilogram,
        UnitCode::Gram,
        UnitCode::Liter,
        UnitCode::Milliliter,
        UnitCode::Unit,
        UnitCode::Meter,
        UnitCode::SquareMeter,
    ];

    /// Short name as typed by the user and shown next to amounts
    pub fn name(&self) -> &'static str {
        match self {
            UnitCode::Kilogram => "kg",
            UnitCode::Gram => "g",
            UnitCode::Liter => "l",
            UnitCode::Milliliter => "ml",
            UnitCode::Unit => "u",
            UnitCode::Meter => "m",
            UnitCode::SquareMeter => "m2",
        }
    }

    /// Storage number (1-based)
    pub fn number(&self) -> i64 {
        match self {
            UnitCode::Kilogram => 1,
            UnitCode::Gram => 2,
            UnitCode::Liter => 3,
            UnitCode::Milliliter => 4,
            UnitCode::Unit => 5,
            UnitCode::Meter => 6,
            UnitCode::SquareMeter => 7,
        }
    }

    pub fn from_number(number: i64) -> Result<Self, CatalogError> {
        UnitCode::ALL
            .iter()
            .copied()
            .find(|unit| unit.number() == number)
            .ok_or_else(|| CatalogError::UnknownUnit(number.to_string()))
    }

    /// Unit used when comparing rates, with the factor applied to a per-unit rate
    pub fn reporting(&self) -> (&'static str, f64) {
        match self {
            UnitCode::Gram => ("kg", 1000.0),
            UnitCode::Milliliter => ("l", 1000.0),
            UnitCode::Meter => ("km", 1000.0),
            other => (other.name(), 1.0),
        }
    }
}

impl FromStr for UnitCode {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        UnitCode::ALL
            .iter()
            .copied()
            .find(|unit| unit.name() == lower)
            .ok_or_else(|| CatalogError::UnknownUnit(s.to_string()))
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ORIGIN
// ============================================================================

/// Where a price was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Offline,
    Website,
}

impl Origin {
    pub fn name(&self) -> &'static str {
        match self {
            Origin::Offline => "offline",
            Origin::Website => "website",
        }
    }

    pub fn number(&self) -> i64 {
        match self {
            Origin::Offline => 1,
            Origin::Website => 2,
        }
    }

    pub fn from_number(number: i64) -> Result<Self, CatalogError> {
        match number {
            1 => Ok(Origin::Offline),
            2 => Ok(Origin::Website),
            other => Err(CatalogError::UnknownOrigin(other.to_string())),
        }
    }
}

impl FromStr for Origin {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "offline" => Ok(Origin::Offline),
            "website" => Ok(Origin::Website),
            _ => Err(CatalogError::UnknownOrigin(s.to_string())),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// TESTS
// ============================================================================
