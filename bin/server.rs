// Price Catalog - Web Server
// JSON API with Axum

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use price_catalog::{
    best_prices, recent_prices, run_checks, setup_database, CatalogConfig, ConsistencyReport,
    FilterPredicate, Mark, SelectedPrice,
};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    recent_limit: u32,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

/// Best-price row (simplified for API)
#[derive(Serialize)]
struct BestPriceResponse {
    id: i64,
    date: String,
    store: String,
    package_id: i64,
    package: String,
    price: i64,
    rate: f64,
    rate_unit: &'static str,
    mark: Mark,
    discarded: usize,
}

impl From<SelectedPrice> for BestPriceResponse {
    fn from(entry: SelectedPrice) -> Self {
        let package = entry.observation.package_description();
        let obs = entry.observation;
        Self {
            id: obs.id,
            date: obs.date.to_string(),
            store: obs.store_name,
            package_id: obs.package_id,
            package,
            price: obs.price,
            rate: entry.rate.value,
            rate_unit: entry.rate.unit,
            mark: entry.mark,
            discarded: entry.discarded,
        }
    }
}

/// Reserved query key on /api/best
const HIGHLIGHT_KEY: &str = "highlight";

/// `field=value` is exact, `field=~value` is fuzzy
fn predicates_from_query(params: &HashMap<String, String>) -> Result<(Vec<FilterPredicate>, Option<i64>), String> {
    let mut predicates = Vec::new();
    let mut highlight = None;

    for (key, value) in params {
        if key == HIGHLIGHT_KEY {
            highlight = Some(value.parse::<i64>().map_err(|_| format!("Invalid highlight id '{}'", value))?);
            continue;
        }

        let field = key.parse().map_err(|e: price_catalog::CatalogError| e.to_string())?;
        let predicate = match value.strip_prefix('~') {
            Some(pattern) => FilterPredicate::fuzzy(field, pattern),
            None => FilterPredicate::exact(field, value.as_str()),
        };
        predicates.push(predicate);
    }

    // HashMap order is arbitrary; keep compiled SQL stable
    predicates.sort_by_key(|p| p.field.name());

    Ok((predicates, highlight))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/best - Best-price frontier for the given filters
async fn get_best(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let (predicates, highlight) = match predicates_from_query(&params) {
        Ok(parsed) => parsed,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::<Vec<BestPriceResponse>>::err(e)))
                .into_response()
        }
    };

    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Vec<BestPriceResponse>>::err("database lock poisoned")),
            )
                .into_response()
        }
    };

    match best_prices(&conn, Some(&predicates), highlight) {
        Ok(selected) => {
            let response: Vec<BestPriceResponse> = selected.into_iter().map(|s| s.into()).collect();

            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            tracing::error!("Error selecting best prices: {:#}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<Vec<BestPriceResponse>>::err(format!("{:#}", e))),
            )
                .into_response()
        }
    }
}

/// GET /api/recent - Most recently entered prices
async fn get_recent(State(state): State<AppState>) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err("database lock poisoned")),
            )
                .into_response()
        }
    };

    match recent_prices(&conn, state.recent_limit) {
        Ok(prices) => (StatusCode::OK, Json(ApiResponse::ok(prices))).into_response(),
        Err(e) => {
            tracing::error!("Error getting recent prices: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err(format!("{:#}", e))),
            )
                .into_response()
        }
    }
}

/// GET /api/checks - Run consistency checks
async fn get_checks(State(state): State<AppState>) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ConsistencyReport>::err("database lock poisoned")),
            )
                .into_response()
        }
    };

    match run_checks(&conn) {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::ok(report))).into_response(),
        Err(e) => {
            tracing::error!("Error running checks: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ConsistencyReport>::err(format!("{:#}", e))),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("price_server=info".parse()?)
        .add_directive("price_catalog=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("🌐 Price Catalog - Web Server v{}", price_catalog::VERSION);

    let config = CatalogConfig::load()?;
    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    tracing::info!("✓ Database opened: {:?}", config.db_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        recent_limit: config.recent_limit,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/best", get(get_best))
        .route("/recent", get(get_recent))
        .route("/checks", get(get_checks))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("🚀 Server running on http://localhost:3000");
    tracing::info!("   API: http://localhost:3000/api/best?product_name=~Milk");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_become_predicates() {
        let params: HashMap<String, String> = [
            ("product_name".to_string(), "~Milk".to_string()),
            ("store_name".to_string(), "Corner Shop".to_string()),
            ("highlight".to_string(), "12".to_string()),
        ]
        .into_iter()
        .collect();

        let (predicates, highlight) = predicates_from_query(&params).unwrap();

        assert_eq!(highlight, Some(12));
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0].kind, price_catalog::MatchKind::Fuzzy);
        assert_eq!(predicates[0].value, "Milk");
        assert_eq!(predicates[1].kind, price_catalog::MatchKind::Exact);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let params: HashMap<String, String> =
            [("colour".to_string(), "red".to_string())].into_iter().collect();

        assert!(predicates_from_query(&params).is_err());
    }
}
