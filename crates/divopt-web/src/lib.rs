//! # divopt Web
//!
//! Read-only dashboard over the options warehouse.
//!
//! ## Routes
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /` | HTML page: filter form, summary, contract table, IV scatter, premium heatmap |
//! | `GET /api/contracts` | Filtered contracts as JSON (same query parameters as `/`) |
//! | `GET /api/tickers` | Stored tickers and per-ticker ingest counts |
//! | `GET /health` | Liveness plus stored contract count |
//!
//! Query parameters: `tickers`, `type` (`call`/`put`/`both`), `from`, `to`,
//! `min_premium`, `max_premium`, `max_strike_distance`, `limit`.
//!
//! The page refreshes itself every `refresh_secs` seconds, so it follows the
//! fetch loop without client-side scripting.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use divopt_warehouse::{Warehouse, WarehouseError, WarehouseReader};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod filters;
pub mod handlers;
pub mod render;

pub use error::ApiError;
pub use filters::ContractFilters;

/// Default page auto-refresh period.
pub const DEFAULT_REFRESH_SECS: u64 = 60;

/// Where handlers read from.
#[derive(Clone)]
enum ReadSource {
    /// Reader sharing the poller's open instance.
    Shared(WarehouseReader),
    /// Database file opened read-only for each read and closed afterwards,
    /// so a separate writer process can lock the file between requests.
    PerRequest(PathBuf),
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    source: ReadSource,
    refresh_secs: u64,
}

impl AppState {
    /// Serve from a reader on an already open warehouse.
    pub fn new(reader: WarehouseReader) -> Self {
        Self {
            source: ReadSource::Shared(reader),
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }

    /// Serve from a database file without holding it open between requests.
    pub fn per_request(db_path: impl Into<PathBuf>) -> Self {
        Self {
            source: ReadSource::PerRequest(db_path.into()),
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }

    /// Page auto-refresh period; zero disables refreshing.
    pub fn with_refresh_secs(mut self, refresh_secs: u64) -> Self {
        self.refresh_secs = refresh_secs;
        self
    }

    /// Run a warehouse read on the blocking pool.
    async fn blocking<T, F>(&self, read: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&WarehouseReader) -> Result<T, WarehouseError> + Send + 'static,
    {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || match source {
            ReadSource::Shared(reader) => read(&reader),
            ReadSource::PerRequest(path) => {
                let warehouse = Warehouse::open_read_only(&path)?;
                read(&warehouse.reader())
            }
        })
        .await
        .map_err(|error| ApiError::Internal(format!("warehouse read task failed: {error}")))?
        .map_err(ApiError::from)
    }
}

/// Creates the dashboard router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/contracts", get(handlers::contracts))
        .route("/api/tickers", get(handlers::tickers))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(Arc::new(state))
}

/// Serve the dashboard until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "dashboard listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
