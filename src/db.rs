use crate::barcode;
use crate::error::CatalogError;
use crate::filter::{compile, FilterField, FilterPredicate, OrderMode, PriceQuery};
use crate::model::{CatalogSnapshot, Package, PriceObservation, PriceRecord, Store};
use crate::session::{parse_money, SessionContext};
use crate::units::{Origin, UnitCode};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::path::Path;

/// Purchase row as found in an import CSV
#[derive(Debug, Deserialize, Clone)]
pub struct PurchaseRow {
    /// YYYY-MM-DD
    #[serde(rename = "Date")]
    pub date: String,

    #[serde(rename = "Store")]
    pub store: String,

    #[serde(rename = "Product")]
    pub product: String,

    #[serde(rename = "Product_Extra", default)]
    pub product_extra: String,

    #[serde(rename = "Unit")]
    pub unit: String,

    #[serde(rename = "Brand", default)]
    pub brand: String,

    #[serde(rename = "Package_Extra", default)]
    pub package_extra: String,

    #[serde(rename = "Amount", default)]
    pub amount: Option<f64>,

    #[serde(rename = "Barcode", default)]
    pub barcode: Option<String>,

    /// Decimal price ("1.99")
    #[serde(rename = "Price")]
    pub price: String,

    #[serde(rename = "Origin", default)]
    pub origin: String,
}

/// New package fields; `amount` None means a single unit
#[derive(Debug, Clone, Default)]
pub struct NewPackage {
    pub product_id: i64,
    pub brand_id: Option<i64>,
    pub extra: String,
    pub amount: Option<f64>,
    pub barcode: Option<String>,
}

/// Tables carrying a hide flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogTable {
    Brands,
    Stores,
    Products,
    Packages,
    Prices,
}

impl CatalogTable {
    fn name(&self) -> &'static str {
        match self {
            CatalogTable::Brands => "brands",
            CatalogTable::Stores => "stores",
            CatalogTable::Products => "products",
            CatalogTable::Packages => "packages",
            CatalogTable::Prices => "prices",
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases report "memory"
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS brands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hide INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS stores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hide INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hide INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            extra TEXT NOT NULL DEFAULT '',
            unit INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hide INTEGER NOT NULL DEFAULT 0,
            product_id INTEGER NOT NULL REFERENCES products(id),
            brand_id INTEGER REFERENCES brands(id),
            extra TEXT NOT NULL DEFAULT '',
            amount REAL NOT NULL DEFAULT 1,
            barcode TEXT
        )",
        [],
    )?;

    // sic: reviewed repeat, excluded from duplicate detection
    conn.execute(
        "CREATE TABLE IF NOT EXISTS prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hide INTEGER NOT NULL DEFAULT 0,
            store_id INTEGER NOT NULL REFERENCES stores(id),
            package_id INTEGER NOT NULL REFERENCES packages(id),
            price INTEGER NOT NULL,
            date TEXT NOT NULL,
            origin INTEGER NOT NULL DEFAULT 1,
            sic INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prices_package ON prices(package_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_packages_barcode ON packages(barcode)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// INSERTS
// ============================================================================

pub fn insert_brand(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO brands (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_store(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO stores (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_product(conn: &Connection, name: &str, extra: &str, unit: UnitCode) -> Result<i64> {
    conn.execute(
        "INSERT INTO products (name, extra, unit) VALUES (?1, ?2, ?3)",
        params![name, extra, unit.number()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_package(conn: &Connection, package: &NewPackage) -> Result<i64> {
    let amount = package.amount.unwrap_or(1.0);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CatalogError::InvalidAmount(amount).into());
    }

    let barcode = package
        .barcode
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());
    if let Some(code) = barcode {
        if !barcode::is_valid(code) {
            return Err(CatalogError::InvalidBarcode(code.to_string()).into());
        }
    }

    conn.execute(
        "INSERT INTO packages (product_id, brand_id, extra, amount, barcode)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![package.product_id, package.brand_id, package.extra, amount, barcode],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record a purchase at the session's store, date and origin
pub fn insert_price(
    conn: &Connection,
    session: &SessionContext,
    package_id: i64,
    price: i64,
) -> Result<i64> {
    let store_id = session.require_store()?;

    conn.execute(
        "INSERT INTO prices (store_id, package_id, price, date, origin)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            store_id,
            package_id,
            price,
            session.date.to_string(),
            session.origin.number()
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::debug!(id, store_id, package_id, price, "price recorded");
    Ok(id)
}

// ============================================================================
// LOOKUPS
// ============================================================================

pub fn find_stores_by_name(conn: &Connection, pattern: &str) -> Result<Vec<Store>> {
    let mut stmt = conn.prepare(
        "SELECT id, name FROM stores WHERE hide = 0 AND instr(name, ?1) > 0 ORDER BY name",
    )?;

    let stores = stmt
        .query_map(params![pattern], |row| {
            Ok(Store {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stores)
}

pub fn find_or_insert_store(conn: &Connection, name: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM stores WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;

    match existing {
        Some(id) => Ok(id),
        None => insert_store(conn, name),
    }
}

pub fn find_or_insert_brand(conn: &Connection, name: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM brands WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;

    match existing {
        Some(id) => Ok(id),
        None => insert_brand(conn, name),
    }
}

pub fn find_or_insert_product(conn: &Connection, name: &str, extra: &str, unit: UnitCode) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM products WHERE name = ?1 AND extra = ?2 AND unit = ?3",
            params![name, extra, unit.number()],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => Ok(id),
        None => insert_product(conn, name, extra, unit),
    }
}

pub fn find_or_insert_package(conn: &Connection, package: &NewPackage) -> Result<i64> {
    let amount = package.amount.unwrap_or(1.0);
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM packages
             WHERE product_id = ?1 AND brand_id IS ?2 AND extra = ?3 AND amount = ?4",
            params![package.product_id, package.brand_id, package.extra, amount],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => Ok(id),
        None => insert_package(conn, package),
    }
}

pub fn get_package(conn: &Connection, id: i64) -> Result<Option<Package>> {
    let package = conn
        .query_row(
            &format!("{} WHERE pac.id = ?1", PACKAGE_SELECT),
            params![id],
            map_package,
        )
        .optional()?;

    Ok(package)
}

// ============================================================================
// PRICE QUERIES
// ============================================================================

/// Execute a compiled price query
pub fn fetch(conn: &Connection, query: &PriceQuery) -> Result<Vec<PriceObservation>> {
    let mut stmt = conn.prepare(&query.sql).context("Failed to prepare price query")?;

    let observations = stmt
        .query_map(params_from_iter(query.params.iter()), map_observation)?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(rows = observations.len(), "fetched price observations");
    Ok(observations)
}

pub fn fetch_prices(
    conn: &Connection,
    predicates: Option<&[FilterPredicate]>,
    order: OrderMode,
    limit: Option<u32>,
) -> Result<Vec<PriceObservation>> {
    let query = compile(predicates, order, limit)?;
    fetch(conn, &query)
}

/// Most recent prices first
pub fn recent_prices(conn: &Connection, limit: u32) -> Result<Vec<PriceObservation>> {
    fetch_prices(conn, None, OrderMode::IdDescending, Some(limit))
}

/// Price history of one package in default order
pub fn prices_for_package(conn: &Connection, package_id: i64) -> Result<Vec<PriceObservation>> {
    let predicates = [FilterPredicate::exact(FilterField::PackageId, package_id.to_string())];
    fetch_prices(conn, Some(&predicates), OrderMode::Default, None)
}

// ============================================================================
// FULL CATALOG (consistency checks)
// ============================================================================

const PACKAGE_SELECT: &str = "SELECT pac.id, pro.id, pro.name, pro.extra, pro.unit,
        COALESCE(bra.name, ''), pac.extra, pac.amount, pac.barcode
     FROM packages pac
     JOIN products pro ON pac.product_id = pro.id
     LEFT JOIN brands bra ON pac.brand_id = bra.id";

pub fn fetch_all_packages(conn: &Connection) -> Result<Vec<Package>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY pac.id", PACKAGE_SELECT))?;

    let packages = stmt
        .query_map([], map_package)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(packages)
}

pub fn fetch_all_stores(conn: &Connection) -> Result<Vec<Store>> {
    let mut stmt = conn.prepare("SELECT id, name FROM stores ORDER BY id")?;

    let stores = stmt
        .query_map([], |row| {
            Ok(Store {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stores)
}

/// Every price row, hidden or not, ordered by id
pub fn fetch_all_prices(conn: &Connection) -> Result<Vec<PriceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, store_id, package_id, price, date, origin, sic FROM prices ORDER BY id",
    )?;

    let prices = stmt
        .query_map([], |row| {
            let date: String = row.get(4)?;
            let origin: i64 = row.get(5)?;
            let sic: i64 = row.get(6)?;

            Ok(PriceRecord {
                id: row.get(0)?,
                store_id: row.get(1)?,
                package_id: row.get(2)?,
                price: row.get(3)?,
                date: parse_date_column(4, &date)?,
                origin: Origin::from_number(origin)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(e)))?,
                known_duplicate: sic != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(prices)
}

pub fn load_snapshot(conn: &Connection) -> Result<CatalogSnapshot> {
    Ok(CatalogSnapshot {
        packages: fetch_all_packages(conn)?,
        stores: fetch_all_stores(conn)?,
        prices: fetch_all_prices(conn)?,
    })
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Returns false when no such price exists
pub fn delete_price(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM prices WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Flag (or unflag) a price as a reviewed, legitimate repeat
pub fn mark_known_duplicate(conn: &Connection, id: i64, known: bool) -> Result<bool> {
    let sic: i64 = if known { 1 } else { 0 };
    let updated = conn.execute("UPDATE prices SET sic = ?1 WHERE id = ?2", params![sic, id])?;
    Ok(updated > 0)
}

pub fn toggle_hide(conn: &Connection, table: CatalogTable, id: i64) -> Result<bool> {
    let updated = conn.execute(
        &format!("UPDATE {} SET hide = 1 - hide WHERE id = ?1", table.name()),
        params![id],
    )?;
    Ok(updated > 0)
}

pub fn count_prices(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

pub fn load_csv(csv_path: &Path) -> Result<Vec<PurchaseRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: PurchaseRow = result.context("Failed to deserialize purchase row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Insert purchases, creating stores, brands, products and packages as needed
pub fn import_purchases(conn: &Connection, rows: &[PurchaseRow]) -> Result<usize> {
    let mut inserted = 0;

    for (line, row) in rows.iter().enumerate() {
        import_purchase(conn, row).with_context(|| format!("Failed to import row {}", line + 1))?;
        inserted += 1;
    }

    tracing::info!(inserted, "purchases imported");
    Ok(inserted)
}

fn import_purchase(conn: &Connection, row: &PurchaseRow) -> Result<i64> {
    let unit: UnitCode = row.unit.parse()?;
    let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'", row.date))?;
    let origin = if row.origin.trim().is_empty() {
        Origin::default()
    } else {
        row.origin.parse()?
    };
    let price = parse_money(&row.price)?;

    let store_id = find_or_insert_store(conn, row.store.trim())?;
    let product_id = find_or_insert_product(conn, row.product.trim(), row.product_extra.trim(), unit)?;
    let brand_id = match row.brand.trim() {
        "" => None,
        brand => Some(find_or_insert_brand(conn, brand)?),
    };
    let package_id = find_or_insert_package(
        conn,
        &NewPackage {
            product_id,
            brand_id,
            extra: row.package_extra.trim().to_string(),
            amount: row.amount,
            barcode: row.barcode.clone(),
        },
    )?;

    let session = SessionContext::new()
        .with_store(store_id)
        .with_date(date)
        .with_origin(origin);

    insert_price(conn, &session, package_id, price)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_date_column(idx: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_unit_column(idx: usize, number: i64) -> rusqlite::Result<UnitCode> {
    UnitCode::from_number(number)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Row layout follows filter::PRICE_COLUMNS
fn map_observation(row: &Row<'_>) -> rusqlite::Result<PriceObservation> {
    let date: String = row.get(2)?;
    let unit: i64 = row.get(11)?;

    Ok(PriceObservation {
        id: row.get(0)?,
        price: row.get(1)?,
        date: parse_date_column(2, &date)?,
        store_name: row.get(3)?,
        package_id: row.get(4)?,
        package_amount: row.get(5)?,
        package_extra: row.get(6)?,
        barcode: row.get(7)?,
        product_id: row.get(8)?,
        product_name: row.get(9)?,
        product_extra: row.get(10)?,
        product_unit: parse_unit_column(11, unit)?,
        brand_name: row.get(12)?,
    })
}

fn map_package(row: &Row<'_>) -> rusqlite::Result<Package> {
    let unit: i64 = row.get(4)?;

    Ok(Package {
        id: row.get(0)?,
        product_id: row.get(1)?,
        product_name: row.get(2)?,
        product_extra: row.get(3)?,
        unit: parse_unit_column(4, unit)?,
        brand_name: row.get(5)?,
        extra: row.get(6)?,
        amount: row.get(7)?,
        barcode: row.get(8)?,
    })
}
