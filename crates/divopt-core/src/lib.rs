//! # divopt Core
//!
//! Domain types, upstream adapters, and the cycling fetch loop for divopt.
//!
//! ## Overview
//!
//! - **Domain models** for tickers, option contracts, and chain snapshots
//! - **Source traits** for the ticker universe, dividend data, and options chains
//! - **Adapters** for Polygon, Yahoo Finance, local ticker files, and index CSVs
//! - **Resilience** through a request throttle, retry policy, and circuit breaker
//! - **Scheduler** that walks the universe N tickers per interval into the warehouse
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Polygon, Yahoo, ticker file, index constituents |
//! | [`circuit_breaker`] | Fail-fast after consecutive upstream failures |
//! | [`domain`] | Symbol, Ticker, OptionContract, ChainSnapshot |
//! | [`error`] | Validation errors |
//! | [`http_client`] | HTTP transport abstraction over reqwest |
//! | [`retry`] | In-request retry policy |
//! | [`scheduler`] | Cycling fetch loop |
//! | [`source`] | Source traits and `SourceError` |
//! | [`throttling`] | `governor`-backed request throttle |
//! | [`universe`] | Yield filtering and universe selection |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use divopt_core::{
//!     FileUniverse, PolygonChainSource, PolygonConfig, ReqwestHttpClient, Scheduler,
//!     SchedulerConfig, UniverseSelector, Warehouse, WarehouseConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http = Arc::new(ReqwestHttpClient::new()?);
//!     let chains = PolygonChainSource::new(PolygonConfig::new("api-key"), http);
//!     let warehouse = Warehouse::open(WarehouseConfig::new("data/options.duckdb"))?;
//!
//!     let mut scheduler = Scheduler::new(
//!         UniverseSelector::new(Arc::new(FileUniverse::new("tickers.txt"))),
//!         Arc::new(chains),
//!         Arc::new(warehouse),
//!         SchedulerConfig::default(),
//!     )?;
//!     let summary = scheduler.run(Duration::from_secs(3600)).await;
//!     println!("{} chains stored", summary.succeeded);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Adapters return [`SourceError`]; the scheduler wraps step failures in
//! [`CycleError`] and keeps going:
//!
//! ```rust
//! use divopt_core::{SourceError, SourceErrorKind};
//!
//! fn describe(error: &SourceError) -> &'static str {
//!     match error.kind() {
//!         SourceErrorKind::RateLimited => "wait for the next cycle",
//!         SourceErrorKind::Unavailable => "skip this ticker",
//!         _ => "report",
//!     }
//! }
//! ```

pub mod adapters;
pub mod circuit_breaker;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod throttling;
pub mod universe;

// Adapters
pub use adapters::{
    FileUniverse, IndexUniverse, PolygonChainSource, PolygonConfig, YahooDividendSource,
    DEFAULT_CONSTITUENTS_URL,
};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Domain models
pub use domain::{
    CalendarDate, ChainSnapshot, Greeks, OptionContract, OptionType, Symbol, Ticker, UtcDateTime,
};

// Error types
pub use error::ValidationError;

// HTTP client types
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Scheduler
pub use scheduler::{
    BatchReport, ContractSink, CycleError, RunSummary, Scheduler, SchedulerConfig, StepOutcome,
};

// Source traits
pub use source::{ChainSource, DividendSource, SourceError, SourceErrorKind, UniverseSource};

// Throttling
pub use throttling::{RequestThrottle, ThrottleQuota};

// Universe selection
pub use universe::{filter_by_yield, validate_threshold, UniverseSelector, DEFAULT_YIELD_THRESHOLD};

// Warehouse (re-exported from divopt-warehouse)
pub use divopt_warehouse::{
    ContractQuery, ContractRecord, ContractRow, OptionKind, RetentionPolicy, UpsertReport,
    Warehouse, WarehouseConfig, WarehouseError, WarehouseReader,
};
