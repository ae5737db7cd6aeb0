// Price Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod barcode;
pub mod config;
pub mod consistency;
pub mod db;
pub mod error;
pub mod filter;
pub mod model;
pub mod rate;
pub mod selector;
pub mod session;
pub mod units;

// Re-export commonly used types
pub use config::CatalogConfig;
pub use consistency::{
    ConsistencyChecker, ConsistencyFinding, ConsistencyReport, FindingKind,
};
pub use db::{
    CatalogTable, NewPackage, PurchaseRow,
    setup_database, fetch, fetch_prices, recent_prices, prices_for_package,
    load_snapshot, load_csv, import_purchases, insert_price, delete_price,
    mark_known_duplicate, toggle_hide, count_prices,
};
pub use error::CatalogError;
pub use filter::{
    compile, FilterField, FilterPredicate, FilterSet, MatchKind, OrderMode, PriceQuery,
};
pub use model::{CatalogSnapshot, Package, PriceObservation, PriceRecord, Store};
pub use rate::{normalize, Rate};
pub use selector::{select_best_prices, Mark, SelectedPrice};
pub use session::SessionContext;
pub use units::{Origin, UnitCode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Query the catalog and reduce it to the best-price frontier
pub fn best_prices(
    conn: &rusqlite::Connection,
    predicates: Option<&[FilterPredicate]>,
    highlight_id: Option<i64>,
) -> anyhow::Result<Vec<SelectedPrice>> {
    let observations = fetch_prices(conn, predicates, OrderMode::Default, None)?;
    let selected = select_best_prices(&observations, highlight_id)?;

    tracing::info!(
        observations = observations.len(),
        selected = selected.len(),
        "best prices selected"
    );
    Ok(selected)
}

/// Load the full catalog and run every consistency check
pub fn run_checks(conn: &rusqlite::Connection) -> anyhow::Result<ConsistencyReport> {
    let snapshot = load_snapshot(conn)?;
    Ok(ConsistencyChecker::new().run(&snapshot))
}
