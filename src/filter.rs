// 🔎 Filter Compiler - declarative predicates → price query
//
// Field identifiers are a closed set. Each one knows its SQL column and how
// to read the same value from an in-memory PriceObservation, so a FilterSet
// can run either inside SQLite or over an already fetched slice.

use crate::error::CatalogError;
use crate::model::PriceObservation;
use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Id,
    Price,
    Date,
    StoreName,
    PackageId,
    PackageAmount,
    PackageExtra,
    PackageBarcode,
    ProductId,
    ProductName,
    ProductExtra,
    ProductUnit,
    BrandName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    Integer,
    Real,
    Date,
    Unit,
}

impl FilterField {
    pub const ALL: [FilterField; 13] = [
        FilterField::Id,
        FilterField::Price,
        FilterField::Date,
        FilterField::StoreName,
        FilterField::PackageId,
        FilterField::PackageAmount,
        FilterField::PackageExtra,
        FilterField::PackageBarcode,
        FilterField::ProductId,
        FilterField::ProductName,
        FilterField::ProductExtra,
        FilterField::ProductUnit,
        FilterField::BrandName,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterField::Id => "id",
            FilterField::Price => "price",
            FilterField::Date => "date",
            FilterField::StoreName => "store_name",
            FilterField::PackageId => "package_id",
            FilterField::PackageAmount => "package_amount",
            FilterField::PackageExtra => "package_extra",
            FilterField::PackageBarcode => "package_barcode",
            FilterField::ProductId => "product_id",
            FilterField::ProductName => "product_name",
            FilterField::ProductExtra => "product_extra",
            FilterField::ProductUnit => "product_unit",
            FilterField::BrandName => "brand_name",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            FilterField::Id => "pri.id",
            FilterField::Price => "pri.price",
            FilterField::Date => "pri.date",
            FilterField::StoreName => "sto.name",
            FilterField::PackageId => "pac.id",
            FilterField::PackageAmount => "pac.amount",
            FilterField::PackageExtra => "pac.extra",
            FilterField::PackageBarcode => "pac.barcode",
            FilterField::ProductId => "pro.id",
            FilterField::ProductName => "pro.name",
            FilterField::ProductExtra => "pro.extra",
            FilterField::ProductUnit => "pro.unit",
            FilterField::BrandName => "COALESCE(bra.name, '')",
        }
    }

    fn field_type(&self) -> FieldType {
        match self {
            FilterField::Id | FilterField::Price | FilterField::PackageId | FilterField::ProductId => {
                FieldType::Integer
            }
            FilterField::PackageAmount => FieldType::Real,
            FilterField::Date => FieldType::Date,
            FilterField::ProductUnit => FieldType::Unit,
            FilterField::StoreName
            | FilterField::PackageExtra
            | FilterField::PackageBarcode
            | FilterField::ProductName
            | FilterField::ProductExtra
            | FilterField::BrandName => FieldType::Text,
        }
    }

    fn access<'a>(&self, obs: &'a PriceObservation) -> FieldRef<'a> {
        match self {
            FilterField::Id => FieldRef::Integer(obs.id),
            FilterField::Price => FieldRef::Integer(obs.price),
            FilterField::Date => FieldRef::Text(Some(Cow::Owned(obs.date.to_string()))),
            FilterField::StoreName => FieldRef::Text(Some(Cow::Borrowed(obs.store_name.as_str()))),
            FilterField::PackageId => FieldRef::Integer(obs.package_id),
            FilterField::PackageAmount => FieldRef::Real(obs.package_amount),
            FilterField::PackageExtra => FieldRef::Text(Some(Cow::Borrowed(obs.package_extra.as_str()))),
            FilterField::PackageBarcode => {
                FieldRef::Text(obs.barcode.as_deref().map(Cow::Borrowed))
            }
            FilterField::ProductId => FieldRef::Integer(obs.product_id),
            FilterField::ProductName => FieldRef::Text(Some(Cow::Borrowed(obs.product_name.as_str()))),
            FilterField::ProductExtra => FieldRef::Text(Some(Cow::Borrowed(obs.product_extra.as_str()))),
            FilterField::ProductUnit => FieldRef::Integer(obs.product_unit.number()),
            FilterField::BrandName => FieldRef::Text(Some(Cow::Borrowed(obs.brand_name.as_str()))),
        }
    }
}

impl FromStr for FilterField {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterField::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| CatalogError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum FieldRef<'a> {
    Text(Option<Cow<'a, str>>),
    Integer(i64),
    Real(f64),
}

// ============================================================================
// PREDICATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    /// Case-sensitive substring containment
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: FilterField,
    pub kind: MatchKind,
    pub value: String,
}

impl FilterPredicate {
    pub fn exact(field: FilterField, value: impl Into<String>) -> Self {
        FilterPredicate {
            field,
            kind: MatchKind::Exact,
            value: value.into(),
        }
    }

    pub fn fuzzy(field: FilterField, value: impl Into<String>) -> Self {
        FilterPredicate {
            field,
            kind: MatchKind::Fuzzy,
            value: value.into(),
        }
    }

    /// Parse `field=value` (exact) or `field~value` (fuzzy)
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let split = text
            .find(|c: char| c == '=' || c == '~')
            .ok_or_else(|| CatalogError::MalformedPredicate(text.to_string()))?;

        let (name, rest) = text.split_at(split);
        let kind = if rest.starts_with('~') {
            MatchKind::Fuzzy
        } else {
            MatchKind::Exact
        };

        Ok(FilterPredicate {
            field: name.trim().parse()?,
            kind,
            value: rest[1..].to_string(),
        })
    }
}

/// A bound parameter, typed after the column it is compared with
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FilterValue::Text(s) => ToSqlOutput::from(s.as_str()),
            FilterValue::Integer(i) => ToSqlOutput::from(*i),
            FilterValue::Real(r) => ToSqlOutput::from(*r),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledPredicate {
    field: FilterField,
    kind: MatchKind,
    value: FilterValue,
}

impl CompiledPredicate {
    fn compile(predicate: &FilterPredicate) -> Result<Self, CatalogError> {
        let field = predicate.field;
        let field_type = field.field_type();
        let invalid = || CatalogError::InvalidFilterValue {
            field: field.name().to_string(),
            value: predicate.value.clone(),
        };

        if predicate.kind == MatchKind::Fuzzy && !matches!(field_type, FieldType::Text | FieldType::Date) {
            return Err(CatalogError::FuzzyOnNumericField(field.name().to_string()));
        }

        let value = match (field_type, predicate.kind) {
            (FieldType::Text, _) | (FieldType::Date, MatchKind::Fuzzy) => {
                FilterValue::Text(predicate.value.clone())
            }
            (FieldType::Date, MatchKind::Exact) => {
                let date = NaiveDate::parse_from_str(predicate.value.trim(), "%Y-%m-%d")
                    .map_err(|_| invalid())?;
                FilterValue::Text(date.to_string())
            }
            (FieldType::Integer, _) => {
                FilterValue::Integer(predicate.value.trim().parse().map_err(|_| invalid())?)
            }
            (FieldType::Real, _) => {
                FilterValue::Real(predicate.value.trim().parse().map_err(|_| invalid())?)
            }
            (FieldType::Unit, _) => {
                let unit: crate::units::UnitCode =
                    predicate.value.parse().map_err(|_| invalid())?;
                FilterValue::Integer(unit.number())
            }
        };

        Ok(CompiledPredicate {
            field,
            kind: predicate.kind,
            value,
        })
    }

    fn sql(&self) -> String {
        match self.kind {
            MatchKind::Exact => format!("{} = ?", self.field.column()),
            MatchKind::Fuzzy => format!("instr({}, ?) > 0", self.field.column()),
        }
    }

    fn matches(&self, obs: &PriceObservation) -> bool {
        match (self.field.access(obs), &self.value) {
            (FieldRef::Text(Some(text)), FilterValue::Text(value)) => match self.kind {
                MatchKind::Exact => text.as_ref() == value,
                MatchKind::Fuzzy => text.contains(value.as_str()),
            },
            (FieldRef::Integer(actual), FilterValue::Integer(value)) => actual == *value,
            (FieldRef::Real(actual), FilterValue::Real(value)) => actual == *value,
            _ => false,
        }
    }
}

/// Conjunction of compiled predicates; empty matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    predicates: Vec<CompiledPredicate>,
}

impl FilterSet {
    pub fn compile(predicates: Option<&[FilterPredicate]>) -> Result<Self, CatalogError> {
        let predicates = predicates
            .unwrap_or_default()
            .iter()
            .map(CompiledPredicate::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterSet { predicates })
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, obs: &PriceObservation) -> bool {
        self.predicates.iter().all(|p| p.matches(obs))
    }

    /// Keep only matching observations, preserving order
    pub fn apply<'a>(&self, observations: &'a [PriceObservation]) -> Vec<&'a PriceObservation> {
        observations.iter().filter(|obs| self.matches(obs)).collect()
    }
}

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Ascending date, most expensive per unit first within a day.
    /// Sorts on raw `price / amount`, so same-day rows only rank by rate when they share a unit.
    #[default]
    Default,
    /// Newest records first, for "last N" listings
    IdDescending,
}

/// Columns selected by every price query, in row-index order
pub const PRICE_COLUMNS: &str = "pri.id, pri.price, pri.date, sto.name, pac.id, pac.amount, \
     pac.extra, pac.barcode, pro.id, pro.name, pro.extra, pro.unit, COALESCE(bra.name, '')";

const PRICE_JOINS: &str = "prices pri
     JOIN packages pac ON pri.package_id = pac.id
     JOIN products pro ON pac.product_id = pro.id
     LEFT JOIN brands bra ON pac.brand_id = bra.id
     JOIN stores sto ON pri.store_id = sto.id";

const NOT_HIDDEN: &str = "pri.hide = 0 AND pac.hide = 0 AND pro.hide = 0 \
     AND COALESCE(bra.hide, 0) = 0 AND sto.hide = 0";

/// Query descriptor executed by the storage layer
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub sql: String,
    pub params: Vec<FilterValue>,
    pub filter: FilterSet,
    pub order: OrderMode,
    pub limit: Option<u32>,
}

pub fn compile(
    predicates: Option<&[FilterPredicate]>,
    order: OrderMode,
    limit: Option<u32>,
) -> Result<PriceQuery, CatalogError> {
    let filter = FilterSet::compile(predicates)?;

    let mut where_clause = NOT_HIDDEN.to_string();
    for predicate in &filter.predicates {
        where_clause.push_str(" AND ");
        where_clause.push_str(&predicate.sql());
    }

    let order_clause = match order {
        OrderMode::Default => "ORDER BY pri.date ASC, pri.price / pac.amount DESC, pri.id ASC",
        OrderMode::IdDescending => "ORDER BY pri.id DESC",
    };

    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} {}",
        PRICE_COLUMNS, PRICE_JOINS, where_clause, order_clause
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let params = filter.predicates.iter().map(|p| p.value.clone()).collect();

    tracing::debug!(predicates = filter.predicates.len(), ?order, ?limit, "compiled price query");

    Ok(PriceQuery {
        sql,
        params,
        filter,
        order,
        limit,
    })
}

// ============================================================================
// TESTS
// ============================================================================
