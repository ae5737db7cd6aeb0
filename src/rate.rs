// ⚖️ Rate Normalizer - price per canonical unit

use crate::error::CatalogError;
use crate::units::UnitCode;
use serde::Serialize;
use std::fmt;

/// Price per reporting unit (e.g. 1.25/kg)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rate {
    pub value: f64,
    pub unit: &'static str,
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}/{}", self.value, self.unit)
    }
}

/// Convert a price in cents for `amount` units into a comparable rate.
///
/// Grams, milliliters and meters report per kg, l and km respectively.
pub fn normalize(price: i64, amount: f64, unit: UnitCode) -> Result<Rate, CatalogError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CatalogError::InvalidAmount(amount));
    }

    let per_unit = price as f64 / 100.0 / amount;
    let (reporting_unit, factor) = unit.reporting();

    Ok(Rate {
        value: per_unit * factor,
        unit: reporting_unit,
    })
}
