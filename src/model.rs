// 🛒 Catalog Model - joined price rows, packages, raw price records

use crate::error::CatalogError;
use crate::rate::{normalize, Rate};
use crate::units::{Origin, UnitCode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// PRICE OBSERVATION (price joined with package/product/brand/store)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: i64,

    /// Price in cents
    pub price: i64,

    pub date: NaiveDate,
    pub store_name: String,
    pub package_id: i64,
    pub package_amount: f64,
    pub package_extra: String,
    pub product_id: i64,
    pub product_name: String,
    pub product_extra: String,
    pub product_unit: UnitCode,

    /// Empty when the package has no brand
    pub brand_name: String,

    pub barcode: Option<String>,
}

impl PriceObservation {
    pub fn rate(&self) -> Result<Rate, CatalogError> {
        normalize(self.price, self.package_amount, self.product_unit)
    }

    pub fn package_description(&self) -> String {
        describe_package(
            &self.product_name,
            &self.product_extra,
            &self.package_extra,
            &self.brand_name,
            self.package_amount,
            self.product_unit,
        )
    }
}

// ============================================================================
// PACKAGE (catalog view used by consistency checks)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_extra: String,
    pub unit: UnitCode,
    pub brand_name: String,
    pub extra: String,
    pub amount: f64,
    pub barcode: Option<String>,
}

impl Package {
    pub fn description(&self) -> String {
        describe_package(
            &self.product_name,
            &self.product_extra,
            &self.extra,
            &self.brand_name,
            self.amount,
            self.unit,
        )
    }
}

// ============================================================================
// PRICE RECORD (raw prices row)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: i64,
    pub store_id: i64,
    pub package_id: i64,
    pub price: i64,
    pub date: NaiveDate,
    pub origin: Origin,

    /// Reviewed and confirmed as a legitimate repeat ("not a bug")
    pub known_duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
}

/// Everything the consistency checks read, fetched in one go
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub packages: Vec<Package>,
    pub stores: Vec<Store>,

    /// Ordered by id
    pub prices: Vec<PriceRecord>,
}

/// "Milk whole Carton Acme 1 l"
pub fn describe_package(
    product_name: &str,
    product_extra: &str,
    package_extra: &str,
    brand_name: &str,
    amount: f64,
    unit: UnitCode,
) -> String {
    let mut parts = vec![product_name];
    for part in [product_extra, package_extra, brand_name] {
        if !part.is_empty() {
            parts.push(part);
        }
    }

    format!("{} {} {}", parts.join(" "), amount, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_package_skips_empty_parts() {
        assert_eq!(
            describe_package("Milk", "", "Carton", "", 1.0, UnitCode::Liter),
            "Milk Carton 1 l"
        );
        assert_eq!(
            describe_package("Rice", "basmati", "2x500g", "Acme", 1000.0, UnitCode::Gram),
            "Rice basmati 2x500g Acme 1000 g"
        );
    }

    #[test]
    fn test_observation_rate_uses_product_unit() {
        let obs = PriceObservation {
            id: 1,
            price: 300,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            store_name: "Corner".to_string(),
            package_id: 7,
            package_amount: 500.0,
            package_extra: String::new(),
            product_id: 3,
            product_name: "Flour".to_string(),
            product_extra: String::new(),
            product_unit: UnitCode::Gram,
            brand_name: String::new(),
            barcode: None,
        };

        let rate = obs.rate().unwrap();
        assert!((rate.value - 6.0).abs() < 1e-9);
        assert_eq!(rate.unit, "kg");
        assert_eq!(obs.package_description(), "Flour 500 g");
    }
}
