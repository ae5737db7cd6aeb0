// ⚠️ Catalog Errors - input-contract violations
// Data-quality problems are never errors; see consistency::ConsistencyFinding

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Unit name or stored unit number outside the known set
    UnknownUnit(String),

    /// Origin name or stored origin number outside the known set
    UnknownOrigin(String),

    /// Package amount is zero, negative, or not a number
    InvalidAmount(f64),

    /// Filter field identifier is not part of the joined price view
    UnknownField(String),

    /// Filter value cannot be read as the field's type
    InvalidFilterValue { field: String, value: String },

    /// Substring matching requested on a numeric field
    FuzzyOnNumericField(String),

    /// Predicate text is not `field=value` or `field~value`
    MalformedPredicate(String),

    /// Money text is not a decimal amount
    InvalidMoney(String),

    /// Barcode fails its check digit
    InvalidBarcode(String),

    /// A price entry needs a current store in the session
    NoStoreSelected,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::UnknownUnit(unit) => write!(f, "unknown unit: {}", unit),
            CatalogError::UnknownOrigin(origin) => write!(f, "unknown origin: {}", origin),
            CatalogError::InvalidAmount(amount) => {
                write!(f, "package amount must be positive, got {}", amount)
            }
            CatalogError::UnknownField(field) => write!(f, "unknown filter field: {}", field),
            CatalogError::InvalidFilterValue { field, value } => {
                write!(f, "invalid value '{}' for filter field {}", value, field)
            }
            CatalogError::FuzzyOnNumericField(field) => {
                write!(f, "fuzzy match is not supported on numeric field {}", field)
            }
            CatalogError::MalformedPredicate(text) => {
                write!(f, "expected field=value or field~value, got '{}'", text)
            }
            CatalogError::InvalidMoney(text) => write!(f, "invalid money amount: {}", text),
            CatalogError::InvalidBarcode(code) => write!(f, "invalid barcode: {}", code),
            CatalogError::NoStoreSelected => write!(f, "no current store selected"),
        }
    }
}

impl std::error::Error for CatalogError {}
