//! Behavior-driven tests for the fetch scheduler against a real warehouse
//!
//! The universe and chain provider are scripted; persistence goes through a
//! DuckDB file in a temp directory.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use divopt_core::{
    CalendarDate, ChainSnapshot, ChainSource, ContractQuery, CycleError, Greeks, OptionContract,
    OptionType, RetentionPolicy, Scheduler, SchedulerConfig, SourceError, Symbol, Ticker,
    UniverseSelector, UniverseSource, UtcDateTime, Warehouse, WarehouseConfig,
};
use tempfile::{tempdir, TempDir};

struct FixedUniverse {
    tickers: Vec<Ticker>,
}

impl UniverseSource for FixedUniverse {
    fn id(&self) -> &'static str {
        "fixed"
    }

    fn constituents<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
        let tickers = self.tickers.clone();
        Box::pin(async move { Ok(tickers) })
    }
}

/// Each call for a symbol returns one call contract whose bid and timestamp
/// advance with the number of calls made for that symbol.
#[derive(Default)]
struct RoundChains {
    rounds: Mutex<HashMap<String, u32>>,
    failing: Mutex<HashSet<String>>,
}

impl RoundChains {
    fn fail(&self, symbol: &str) {
        self.failing.lock().expect("failing").insert(symbol.to_string());
    }

    fn recover(&self) {
        self.failing.lock().expect("failing").clear();
    }
}

impl ChainSource for RoundChains {
    fn id(&self) -> &'static str {
        "rounds"
    }

    fn snapshot<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot, SourceError>> + Send + 'a>> {
        let result = if self.failing.lock().expect("failing").contains(symbol.as_str()) {
            Err(SourceError::rate_limited("polygon rate limit exceeded (HTTP 429)"))
        } else {
            let mut rounds = self.rounds.lock().expect("rounds");
            let round = rounds.entry(symbol.to_string()).or_insert(0);
            *round += 1;
            Ok(snapshot(symbol, *round))
        };
        Box::pin(async move { result })
    }
}

fn snapshot(symbol: &Symbol, round: u32) -> ChainSnapshot {
    let observed_at =
        UtcDateTime::parse(&format!("2026-03-02T15:{:02}:00Z", 30 + round)).expect("timestamp");
    ChainSnapshot {
        symbol: symbol.clone(),
        observed_at,
        contracts: vec![OptionContract {
            underlying: symbol.clone(),
            contract_symbol: format!("O:{symbol}260417C00050000"),
            expiration: CalendarDate::parse("2026-04-17").expect("date"),
            strike: 50.0,
            option_type: OptionType::Call,
            bid: Some(f64::from(round)),
            ask: Some(f64::from(round) + 0.1),
            last_price: None,
            volume: None,
            open_interest: None,
            implied_volatility: Some(0.2),
            greeks: Greeks::default(),
            underlying_price: Some(51.0),
            observed_at,
        }],
        skipped: 0,
        pages: 1,
    }
}

fn universe(symbols: &[&str]) -> UniverseSelector {
    let tickers = symbols
        .iter()
        .map(|symbol| Ticker::new(Symbol::parse(symbol).expect("symbol"), 0.04, None).expect("ticker"))
        .collect();
    UniverseSelector::new(Arc::new(FixedUniverse { tickers }))
}

struct Fixture {
    _temp: TempDir,
    warehouse: Warehouse,
    chains: Arc<RoundChains>,
    scheduler: Scheduler,
}

fn fixture(symbols: &[&str], batch_size: usize, retention: RetentionPolicy) -> Fixture {
    let temp = tempdir().expect("tempdir");
    let warehouse = Warehouse::open(WarehouseConfig::new(temp.path().join("options.duckdb")))
        .expect("warehouse");
    let chains = Arc::new(RoundChains::default());
    let scheduler = Scheduler::new(
        universe(symbols),
        chains.clone(),
        Arc::new(warehouse.clone()),
        SchedulerConfig {
            batch_size,
            retention,
            ..SchedulerConfig::default()
        },
    )
    .expect("scheduler");
    Fixture {
        _temp: temp,
        warehouse,
        chains,
        scheduler,
    }
}

fn stored_bid(warehouse: &Warehouse, ticker: &str) -> Option<f64> {
    let rows = warehouse
        .query_contracts(&ContractQuery {
            tickers: vec![ticker.to_string()],
            ..ContractQuery::default()
        })
        .expect("query");
    assert!(rows.len() <= 1, "one contract per ticker");
    rows.first().and_then(|row| row.bid)
}

// =============================================================================
// Scheduler: Failure isolation
// =============================================================================

#[tokio::test]
async fn failed_fetch_keeps_previous_rows_and_later_tickers_proceed() {
    // Given: A first full batch over four tickers
    let mut fx = fixture(&["KO", "MO", "PEP", "T"], 4, RetentionPolicy::Latest);
    let first = fx.scheduler.run_batch().await;
    assert_eq!(first.outcomes.len(), 4);
    assert_eq!(stored_bid(&fx.warehouse, "PEP"), Some(1.0));

    // When: PEP fails during the second batch
    fx.chains.fail("PEP");
    let second = fx.scheduler.run_batch().await;

    // Then: PEP keeps its round-one row, the others move to round two
    assert_eq!(second.outcomes.len(), 3);
    assert_eq!(second.failures.len(), 1);
    assert!(matches!(
        &second.failures[0],
        CycleError::FetchFailed { ticker, .. } if ticker.as_str() == "PEP"
    ));
    assert_eq!(stored_bid(&fx.warehouse, "PEP"), Some(1.0));
    assert_eq!(stored_bid(&fx.warehouse, "T"), Some(2.0));
    assert_eq!(stored_bid(&fx.warehouse, "KO"), Some(2.0));

    // And: The failure is recorded for the dashboard
    let summary = fx.warehouse.reader().ingest_summary().expect("summary");
    let pep = summary
        .iter()
        .find(|entry| entry.ticker == "PEP")
        .expect("pep summary");
    assert_eq!(pep.failed_count, 1);
    assert_eq!(pep.ok_count, 1);
}

#[tokio::test]
async fn ticker_recovers_on_its_next_turn() {
    let mut fx = fixture(&["KO", "PEP"], 2, RetentionPolicy::Latest);
    fx.chains.fail("PEP");
    fx.scheduler.run_batch().await;
    assert_eq!(stored_bid(&fx.warehouse, "PEP"), None);

    fx.chains.recover();
    let report = fx.scheduler.run_batch().await;

    assert!(report.failures.is_empty());
    assert_eq!(stored_bid(&fx.warehouse, "PEP"), Some(1.0));
}

// =============================================================================
// Scheduler: Cycling and retention
// =============================================================================

#[tokio::test(start_paused = true)]
async fn timed_run_cycles_the_universe_and_counts_writes() {
    // Three tickers, two per batch, three batches fit in the budget
    let mut fx = fixture(&["KO", "MO", "PEP"], 2, RetentionPolicy::Latest);

    let summary = fx.scheduler.run(Duration::from_secs(150)).await;

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.steps, 6);
    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.contracts_written, 6);
    // KO, MO, PEP, KO, MO, PEP: each ticker seen twice
    for ticker in ["KO", "MO", "PEP"] {
        assert_eq!(stored_bid(&fx.warehouse, ticker), Some(2.0), "{ticker}");
    }
    assert_eq!(fx.warehouse.contract_count().expect("count"), 3);
}

#[tokio::test]
async fn history_retention_keeps_every_observation() {
    let mut fx = fixture(&["KO"], 1, RetentionPolicy::History);

    let first = fx.scheduler.run_batch().await;
    let second = fx.scheduler.run_batch().await;

    assert_eq!(first.outcomes[0].history_appended, 1);
    assert_eq!(second.outcomes[0].history_appended, 1);
    assert_eq!(fx.warehouse.contract_count().expect("count"), 1);
    assert_eq!(stored_bid(&fx.warehouse, "KO"), Some(2.0));
}
