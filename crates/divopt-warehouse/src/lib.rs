//! # divopt Warehouse
//!
//! DuckDB-backed storage for options-chain snapshots.
//!
//! ## Overview
//!
//! The fetch loop is the only writer: each ticker's chain is upserted in its
//! own transaction, so a failure for one ticker never leaves partial rows
//! behind. The dashboard reads the same file through [`WarehouseReader`],
//! either sharing the writer's pool or through a read-only instance opened
//! with [`Warehouse::open_read_only`].
//!
//! ```rust,no_run
//! use divopt_warehouse::{ContractQuery, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), divopt_warehouse::WarehouseError> {
//!     let warehouse = Warehouse::open(WarehouseConfig::new("data/options.duckdb"))?;
//!     let rows = warehouse.query_contracts(&ContractQuery {
//!         min_premium: Some(1.0),
//!         ..ContractQuery::default()
//!     })?;
//!     println!("{} contracts", rows.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `option_contracts` | Latest observation per (ticker, expiration, strike, type) |
//! | `option_observations` | Append-only history when retention is `history` |
//! | `ingest_log` | One row per ticker write attempt |
//! | `schema_migrations` | Applied migration versions |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_contract_metrics` | Contracts with premium, mid, spread, strike distance |
//! | `vw_ingest_summary` | Per-ticker ingest counters |

pub mod duckdb;
mod error;
pub mod migrations;
mod models;
pub mod views;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ::duckdb::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use ::duckdb::{params_from_iter, Connection, Row, ToSql};
use uuid::Uuid;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;
pub use models::{
    ContractQuery, ContractRecord, ContractRow, ExpirationBounds, IngestSummary, OptionKind,
    PremiumBounds, RetentionPolicy, UpsertReport, DEFAULT_QUERY_LIMIT,
};

/// Source label written to `ingest_log` for successful chain writes.
const WRITE_SOURCE: &str = "warehouse";

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data").join("options.duckdb"),
            max_pool_size: 4,
        }
    }
}

/// The write-side handle over the contract store.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
    reader: WarehouseReader,
}

impl Warehouse {
    /// Open (creating if necessary) a read-write warehouse and apply
    /// migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(
            config.db_path.clone(),
            config.max_pool_size,
            AccessMode::ReadWrite,
        )?;
        let warehouse = Self::from_manager(manager);
        warehouse.initialize()?;
        tracing::debug!(path = %config.db_path.display(), "opened warehouse");
        Ok(warehouse)
    }

    /// Open an existing warehouse without write access.
    ///
    /// Fails with [`WarehouseError::MissingDatabase`] when the file does not
    /// exist and [`WarehouseError::SchemaMissing`] when it was never
    /// initialized. Every write method returns [`WarehouseError::ReadOnly`].
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WarehouseError::MissingDatabase {
                path: path.to_path_buf(),
            });
        }

        let manager = DuckDbConnectionManager::open(path, 2, AccessMode::ReadOnly)?;
        {
            let connection = manager.acquire()?;
            if !migrations::is_applied(&connection, migrations::LATEST_MIGRATION)? {
                return Err(WarehouseError::SchemaMissing {
                    expected: migrations::LATEST_MIGRATION,
                });
            }
        }
        Ok(Self::from_manager(manager))
    }

    fn from_manager(manager: DuckDbConnectionManager) -> Self {
        Self {
            reader: WarehouseReader {
                manager: manager.clone(),
            },
            manager,
        }
    }

    /// Create tables and views if absent. Idempotent.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        self.ensure_writable()?;
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn is_read_only(&self) -> bool {
        self.manager.mode() == AccessMode::ReadOnly
    }

    /// A cheap read handle sharing this warehouse's pool.
    pub fn reader(&self) -> WarehouseReader {
        self.reader.clone()
    }

    /// Write one ticker's chain in a single transaction.
    ///
    /// Records are de-duplicated by (expiration, strike, type) with the last
    /// occurrence winning, then written with latest-wins semantics into
    /// `option_contracts`. With [`RetentionPolicy::History`] each record is
    /// also appended to `option_observations`; re-appending an identical
    /// observation is a no-op. One `ingest_log` row records the attempt.
    ///
    /// On any failure the transaction is rolled back, leaving the ticker's
    /// previously stored rows untouched.
    pub fn upsert_chain(
        &self,
        ticker: &str,
        records: &[ContractRecord],
        retention: RetentionPolicy,
    ) -> Result<UpsertReport, WarehouseError> {
        self.ensure_writable()?;
        let started = Instant::now();
        let connection = self.manager.acquire()?;

        let outcome = dedupe_chain(ticker, records).and_then(|rows| {
            connection.execute_batch("BEGIN TRANSACTION")?;
            let result = write_chain(&connection, ticker, &rows, retention, started);
            finalize_transaction(&connection, result)
        });

        match &outcome {
            Ok(report) => tracing::debug!(
                ticker,
                written = report.written,
                history_appended = report.history_appended,
                retention = %retention,
                "upserted chain"
            ),
            Err(error) => {
                tracing::warn!(ticker, %error, "chain write rolled back");
                let entry = IngestEntry {
                    ticker,
                    source: WRITE_SOURCE,
                    status: "failed",
                    contracts: 0,
                    latency_ms: elapsed_ms(started),
                    message: Some(error.to_string()),
                };
                if let Err(log_error) = insert_ingest_log(&connection, &entry) {
                    tracing::warn!(ticker, error = %log_error, "failed to record ingest failure");
                }
            }
        }

        outcome
    }

    /// Record a failed fetch attempt for `ticker` in `ingest_log`.
    pub fn record_fetch_failure(
        &self,
        ticker: &str,
        source: &str,
        message: &str,
    ) -> Result<(), WarehouseError> {
        self.ensure_writable()?;
        let connection = self.manager.acquire()?;
        insert_ingest_log(
            &connection,
            &IngestEntry {
                ticker,
                source,
                status: "failed",
                contracts: 0,
                latency_ms: 0,
                message: Some(message.to_string()),
            },
        )
    }

    pub fn query_contracts(&self, query: &ContractQuery) -> Result<Vec<ContractRow>, WarehouseError> {
        self.reader.query_contracts(query)
    }

    pub fn tickers(&self) -> Result<Vec<String>, WarehouseError> {
        self.reader.tickers()
    }

    pub fn expiration_bounds(&self) -> Result<Option<ExpirationBounds>, WarehouseError> {
        self.reader.expiration_bounds()
    }

    pub fn premium_bounds(&self) -> Result<Option<PremiumBounds>, WarehouseError> {
        self.reader.premium_bounds()
    }

    pub fn contract_count(&self) -> Result<usize, WarehouseError> {
        self.reader.contract_count()
    }

    fn ensure_writable(&self) -> Result<(), WarehouseError> {
        if self.is_read_only() {
            return Err(WarehouseError::ReadOnly);
        }
        Ok(())
    }
}

/// Read-only view over a warehouse's connection pool.
#[derive(Clone)]
pub struct WarehouseReader {
    manager: DuckDbConnectionManager,
}

impl WarehouseReader {
    /// Run a filtered contract query.
    ///
    /// Rows are ordered by premium descending (contracts without a bid last),
    /// then ticker, expiration and strike ascending.
    pub fn query_contracts(&self, query: &ContractQuery) -> Result<Vec<ContractRow>, WarehouseError> {
        query.validate()?;

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !query.tickers.is_empty() {
            let placeholders = vec!["?"; query.tickers.len()].join(", ");
            clauses.push(format!("ticker IN ({placeholders})"));
            values.extend(query.tickers.iter().cloned().map(Value::Text));
        }
        if let Some(kind) = query.option_type {
            clauses.push(String::from("option_type = ?"));
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(from) = &query.expiration_from {
            clauses.push(String::from("expiration_date >= CAST(? AS DATE)"));
            values.push(Value::Text(from.clone()));
        }
        if let Some(to) = &query.expiration_to {
            clauses.push(String::from("expiration_date <= CAST(? AS DATE)"));
            values.push(Value::Text(to.clone()));
        }
        if let Some(min) = query.min_premium {
            clauses.push(String::from("premium >= ?"));
            values.push(Value::Double(min));
        }
        if let Some(max) = query.max_premium {
            clauses.push(String::from("premium <= ?"));
            values.push(Value::Double(max));
        }
        if let Some(distance) = query.max_strike_distance {
            clauses.push(String::from(
                "strike_distance IS NOT NULL AND strike_distance <= ?",
            ));
            values.push(Value::Double(distance));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {CONTRACT_COLUMNS} FROM vw_contract_metrics {where_clause} \
             ORDER BY premium DESC NULLS LAST, ticker ASC, expiration_date ASC, strike_price ASC \
             LIMIT {limit}",
            limit = query.limit
        );

        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), read_contract_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct tickers present in the store, sorted.
    pub fn tickers(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT DISTINCT ticker FROM option_contracts ORDER BY ticker")?;
        let tickers = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickers)
    }

    pub fn expiration_bounds(&self) -> Result<Option<ExpirationBounds>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let (earliest, latest): (Option<String>, Option<String>) = connection.query_row(
            "SELECT CAST(MIN(expiration_date) AS VARCHAR), CAST(MAX(expiration_date) AS VARCHAR) \
             FROM option_contracts",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(earliest
            .zip(latest)
            .map(|(earliest, latest)| ExpirationBounds { earliest, latest }))
    }

    /// Min and max premium over contracts that have a bid.
    pub fn premium_bounds(&self) -> Result<Option<PremiumBounds>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let (min, max): (Option<f64>, Option<f64>) = connection.query_row(
            "SELECT MIN(bid), MAX(bid) FROM option_contracts WHERE bid IS NOT NULL",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max).map(|(min, max)| PremiumBounds { min, max }))
    }

    pub fn contract_count(&self) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM option_contracts", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Most recent observation timestamp across all contracts.
    pub fn last_observed_at(&self) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let value: Option<String> = connection.query_row(
            "SELECT strftime(MAX(observed_at), '%Y-%m-%d %H:%M:%S') FROM option_contracts",
            [],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    pub fn ingest_summary(&self) -> Result<Vec<IngestSummary>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT ticker, ok_count, failed_count, strftime(last_attempt, '%Y-%m-%d %H:%M:%S') \
             FROM vw_ingest_summary ORDER BY ticker",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok(IngestSummary {
                    ticker: row.get(0)?,
                    ok_count: row.get(1)?,
                    failed_count: row.get(2)?,
                    last_attempt: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

const CONTRACT_COLUMNS: &str = "ticker, contract_symbol, CAST(expiration_date AS VARCHAR), \
     strike_price, option_type, bid, ask, last_price, volume, open_interest, implied_volatility, \
     delta, gamma, theta, vega, underlying_price, strftime(observed_at, '%Y-%m-%d %H:%M:%S'), \
     premium, mid_price, spread, strike_distance";

fn read_contract_row(row: &Row<'_>) -> Result<ContractRow, ::duckdb::Error> {
    Ok(ContractRow {
        ticker: row.get(0)?,
        contract_symbol: row.get(1)?,
        expiration_date: row.get(2)?,
        strike_price: row.get(3)?,
        option_type: row.get(4)?,
        bid: row.get(5)?,
        ask: row.get(6)?,
        last_price: row.get(7)?,
        volume: row.get(8)?,
        open_interest: row.get(9)?,
        implied_volatility: row.get(10)?,
        delta: row.get(11)?,
        gamma: row.get(12)?,
        theta: row.get(13)?,
        vega: row.get(14)?,
        underlying_price: row.get(15)?,
        observed_at: row.get(16)?,
        premium: row.get(17)?,
        mid_price: row.get(18)?,
        spread: row.get(19)?,
        strike_distance: row.get(20)?,
    })
}

impl ToSql for OptionKind {
    fn to_sql(&self) -> ::duckdb::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for OptionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "call" => Ok(Self::Call),
            "put" => Ok(Self::Put),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Validate records and collapse duplicate keys, keeping the last occurrence
/// in its original position. DuckDB rejects touching one primary key twice
/// inside a single transaction.
fn dedupe_chain<'a>(
    ticker: &str,
    records: &'a [ContractRecord],
) -> Result<Vec<&'a ContractRecord>, WarehouseError> {
    let mut positions: HashMap<(String, u64, OptionKind), usize> = HashMap::new();
    let mut rows: Vec<&ContractRecord> = Vec::with_capacity(records.len());

    for record in records {
        record.validate(ticker)?;
        match positions.get(&record.key()) {
            Some(&index) => rows[index] = record,
            None => {
                positions.insert(record.key(), rows.len());
                rows.push(record);
            }
        }
    }

    Ok(rows)
}

fn write_chain(
    connection: &Connection,
    ticker: &str,
    rows: &[&ContractRecord],
    retention: RetentionPolicy,
    started: Instant,
) -> Result<UpsertReport, WarehouseError> {
    let mut report = UpsertReport::default();

    for row in rows {
        let params: [&dyn ToSql; 17] = [
            &row.ticker,
            &row.contract_symbol,
            &row.expiration_date,
            &row.strike_price,
            &row.option_type,
            &row.bid,
            &row.ask,
            &row.last_price,
            &row.volume,
            &row.open_interest,
            &row.implied_volatility,
            &row.delta,
            &row.gamma,
            &row.theta,
            &row.vega,
            &row.underlying_price,
            &row.observed_at,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO option_contracts \
             (ticker, contract_symbol, expiration_date, strike_price, option_type, bid, ask, \
              last_price, volume, open_interest, implied_volatility, delta, gamma, theta, vega, \
              underlying_price, observed_at, updated_at) \
             VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                     CAST(? AS TIMESTAMP), CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        report.written += 1;

        if retention == RetentionPolicy::History {
            report.history_appended += connection.execute(
                "INSERT OR IGNORE INTO option_observations \
                 (ticker, contract_symbol, expiration_date, strike_price, option_type, bid, ask, \
                  last_price, volume, open_interest, implied_volatility, delta, gamma, theta, \
                  vega, underlying_price, observed_at) \
                 VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                         CAST(? AS TIMESTAMP))",
                params.as_slice(),
            )?;
        }
    }

    insert_ingest_log(
        connection,
        &IngestEntry {
            ticker,
            source: WRITE_SOURCE,
            status: "ok",
            contracts: report.written,
            latency_ms: elapsed_ms(started),
            message: None,
        },
    )?;

    Ok(report)
}

struct IngestEntry<'a> {
    ticker: &'a str,
    source: &'a str,
    status: &'a str,
    contracts: usize,
    latency_ms: u64,
    message: Option<String>,
}

fn insert_ingest_log(connection: &Connection, entry: &IngestEntry<'_>) -> Result<(), WarehouseError> {
    let request_id = Uuid::new_v4().to_string();
    let contracts = i64::try_from(entry.contracts).unwrap_or(i64::MAX);
    let latency_ms = i64::try_from(entry.latency_ms).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 7] = [
        &request_id,
        &entry.ticker,
        &entry.source,
        &entry.status,
        &contracts,
        &latency_ms,
        &entry.message,
    ];
    connection.execute(
        "INSERT INTO ingest_log \
         (request_id, ticker, source, status, contracts, latency_ms, message, timestamp) \
         VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}
