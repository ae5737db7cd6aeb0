// 🧾 Session Context - current store, date and origin for price entry
//
// Passed explicitly to every call that records a purchase.

use crate::error::CatalogError;
use crate::units::Origin;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub store_id: Option<i64>,
    pub date: NaiveDate,
    pub origin: Origin,
}

impl SessionContext {
    /// No store yet, today's date, offline
    pub fn new() -> Self {
        SessionContext {
            store_id: None,
            date: Local::now().date_naive(),
            origin: Origin::Offline,
        }
    }

    pub fn with_store(mut self, store_id: i64) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn require_store(&self) -> Result<i64, CatalogError> {
        self.store_id.ok_or(CatalogError::NoStoreSelected)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a compact `YYYYMMDD` date
pub fn parse_compact_date(text: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y%m%d")?;
    Ok(date)
}

/// Parse a decimal money amount ("1.99", "2,5", "3") into cents
pub fn parse_money(text: &str) -> Result<i64, CatalogError> {
    let normalized = text.trim().replace(',', ".");
    let value: f64 = normalized
        .parse()
        .map_err(|_| CatalogError::InvalidMoney(text.to_string()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(CatalogError::InvalidMoney(text.to_string()));
    }

    Ok((value * 100.0).round() as i64)
}
