//! # Cycling Scheduler
//!
//! Walks the working universe `batch_size` tickers per interval, wrapping to
//! the first ticker after the last, until a wall-clock budget runs out. Each
//! ticker's fetch and write is independent: a failure is logged, the ticker is
//! skipped, and it is retried when the cursor comes back around.
//!
//! ```text
//! IDLE -> FETCHING(t_i) -> ... -> SLEEP -> FETCHING(t_{i+1 mod N}) -> ...
//! ```
//!
//! The universe is refreshed before the first fetch and every time the cursor
//! wraps. A failed or empty refresh keeps the previous set.

use std::sync::Arc;
use std::time::Duration;

use divopt_warehouse::{RetentionPolicy, UpsertReport, Warehouse, WarehouseError};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::source::{ChainSource, SourceError};
use crate::universe::{validate_threshold, UniverseSelector, DEFAULT_YIELD_THRESHOLD};
use crate::{ChainSnapshot, Symbol, Ticker, ValidationError};

/// Failure of one scheduler step.
#[derive(Debug, Error)]
pub enum CycleError {
    /// No ticker universe could be obtained; retried on the next cycle.
    #[error("ticker universe unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    /// The chain fetch failed; the ticker is skipped until it comes up again.
    #[error("chain fetch failed for {ticker}: {source}")]
    FetchFailed { ticker: Symbol, source: SourceError },
    /// The chain write was rolled back.
    #[error("persisting chain for {ticker} failed: {source}")]
    Persistence {
        ticker: Symbol,
        source: WarehouseError,
    },
}

impl CycleError {
    pub fn ticker(&self) -> Option<&Symbol> {
        match self {
            Self::SourceUnavailable(_) => None,
            Self::FetchFailed { ticker, .. } | Self::Persistence { ticker, .. } => Some(ticker),
        }
    }
}

/// Destination for fetched chains.
pub trait ContractSink: Send + Sync {
    fn write_chain(
        &self,
        ticker: &Symbol,
        snapshot: &ChainSnapshot,
        retention: RetentionPolicy,
    ) -> Result<UpsertReport, WarehouseError>;

    fn record_failure(&self, ticker: &Symbol, source: &str, message: &str) -> Result<(), WarehouseError>;
}

impl ContractSink for Warehouse {
    fn write_chain(
        &self,
        ticker: &Symbol,
        snapshot: &ChainSnapshot,
        retention: RetentionPolicy,
    ) -> Result<UpsertReport, WarehouseError> {
        self.upsert_chain(ticker.as_str(), &snapshot.records(), retention)
    }

    fn record_failure(&self, ticker: &Symbol, source: &str, message: &str) -> Result<(), WarehouseError> {
        self.record_fetch_failure(ticker.as_str(), source, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Tickers processed per interval.
    pub batch_size: usize,
    pub interval: Duration,
    /// Minimum dividend yield for universe membership.
    pub threshold: f64,
    pub retention: RetentionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            interval: Duration::from_secs(60),
            threshold: DEFAULT_YIELD_THRESHOLD,
            retention: RetentionPolicy::Latest,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::NonPositiveValue { field: "batch_size" });
        }
        if self.interval.is_zero() {
            return Err(ValidationError::NonPositiveValue { field: "interval" });
        }
        validate_threshold(self.threshold)?;
        Ok(())
    }
}

/// Result of one successful fetch-and-persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub ticker: Symbol,
    /// Position of the ticker in the universe.
    pub index: usize,
    pub contracts: usize,
    pub skipped: usize,
    pub written: usize,
    pub history_appended: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<StepOutcome>,
    pub failures: Vec<CycleError>,
    /// Set when the batch stopped early because no universe was available.
    pub universe_unavailable: Option<SourceError>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn contracts_written(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.written).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub batches: usize,
    pub steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub contracts_written: usize,
    pub universe_refreshes: usize,
    pub universe_failures: usize,
}

/// Sequential fetch loop over the working universe.
pub struct Scheduler {
    selector: UniverseSelector,
    chains: Arc<dyn ChainSource>,
    sink: Arc<dyn ContractSink>,
    config: SchedulerConfig,
    tickers: Vec<Ticker>,
    cursor: usize,
    needs_refresh: bool,
    last_universe_error: Option<SourceError>,
    universe_refreshes: usize,
    universe_failures: usize,
}

impl Scheduler {
    pub fn new(
        selector: UniverseSelector,
        chains: Arc<dyn ChainSource>,
        sink: Arc<dyn ContractSink>,
        config: SchedulerConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            selector,
            chains,
            sink,
            config,
            tickers: Vec::new(),
            cursor: 0,
            needs_refresh: true,
            last_universe_error: None,
            universe_refreshes: 0,
            universe_failures: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The current working universe.
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    /// Index of the next ticker to fetch.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Fetch and persist the ticker under the cursor, then advance it.
    pub async fn step(&mut self) -> Result<StepOutcome, CycleError> {
        self.advance(true).await
    }

    /// One step. With `allow_refresh` unset a pending wrap refresh is
    /// dropped and the current universe walked again.
    async fn advance(&mut self, allow_refresh: bool) -> Result<StepOutcome, CycleError> {
        self.ensure_universe(allow_refresh).await?;

        let index = self.cursor;
        let ticker = match self.tickers.get(index) {
            Some(entry) => entry.symbol.clone(),
            None => {
                self.cursor = 0;
                self.needs_refresh = true;
                return Err(CycleError::SourceUnavailable(SourceError::internal(
                    "universe cursor out of range",
                )));
            }
        };
        self.cursor = (index + 1) % self.tickers.len();
        if self.cursor == 0 {
            self.needs_refresh = true;
        }

        let started = Instant::now();
        let snapshot = match self.chains.snapshot(&ticker).await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                tracing::warn!(%ticker, index, error = %source, "chain fetch failed; skipping ticker");
                if let Err(log_error) = self.sink.record_failure(&ticker, self.chains.id(), source.message()) {
                    tracing::warn!(%ticker, error = %log_error, "failed to record fetch failure");
                }
                return Err(CycleError::FetchFailed { ticker, source });
            }
        };

        let report = self
            .sink
            .write_chain(&ticker, &snapshot, self.config.retention)
            .map_err(|source| {
                tracing::warn!(%ticker, index, error = %source, "chain write failed; skipping ticker");
                CycleError::Persistence {
                    ticker: ticker.clone(),
                    source,
                }
            })?;

        let outcome = StepOutcome {
            ticker,
            index,
            contracts: snapshot.contracts.len(),
            skipped: snapshot.skipped,
            written: report.written,
            history_appended: report.history_appended,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            ticker = %outcome.ticker,
            index,
            contracts = outcome.contracts,
            skipped = outcome.skipped,
            written = outcome.written,
            pages = snapshot.pages,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "stored chain snapshot"
        );
        Ok(outcome)
    }

    /// Run `batch_size` steps. Stops early only when no universe is available.
    /// The universe is refreshed at most once per batch, so a universe
    /// smaller than the batch is not re-downloaded on every wrap.
    pub async fn run_batch(&mut self) -> BatchReport {
        let mut report = BatchReport::default();
        let mut refresh_allowed = true;
        for _ in 0..self.config.batch_size {
            let attempts_before = self.refresh_attempts();
            let result = self.advance(refresh_allowed).await;
            if self.refresh_attempts() != attempts_before {
                refresh_allowed = false;
            }
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(CycleError::SourceUnavailable(error)) => {
                    report.universe_unavailable = Some(error);
                    break;
                }
                Err(error) => report.failures.push(error),
            }
        }
        report
    }

    /// Loop batches until `budget` elapses, sleeping out the rest of each
    /// interval. Never sleeps past the deadline.
    pub async fn run(&mut self, budget: Duration) -> RunSummary {
        let deadline = deadline_after(Instant::now(), budget);
        let refreshes_before = self.universe_refreshes;
        let failures_before = self.universe_failures;
        let mut summary = RunSummary::default();

        tracing::info!(
            budget_secs = budget.as_secs(),
            batch_size = self.config.batch_size,
            interval_secs = self.config.interval.as_secs(),
            source = self.chains.id(),
            "fetch loop started"
        );

        while Instant::now() < deadline {
            let batch_started = Instant::now();
            let report = self.run_batch().await;

            summary.batches += 1;
            summary.steps += report.attempted();
            summary.succeeded += report.outcomes.len();
            summary.failed += report.failures.len();
            summary.contracts_written += report.contracts_written();

            if let Some(error) = &report.universe_unavailable {
                if report.attempted() == 0 {
                    tracing::warn!(%error, "no ticker universe available; retrying after the interval");
                }
            }
            tracing::debug!(
                succeeded = report.outcomes.len(),
                failed = report.failures.len(),
                cursor = self.cursor,
                "batch finished"
            );

            let wake_at = batch_started
                .checked_add(self.config.interval)
                .map_or(deadline, |next| next.min(deadline));
            if wake_at > Instant::now() {
                tokio::time::sleep_until(wake_at).await;
            }
        }

        summary.universe_refreshes = self.universe_refreshes - refreshes_before;
        summary.universe_failures = self.universe_failures - failures_before;
        tracing::info!(
            batches = summary.batches,
            succeeded = summary.succeeded,
            failed = summary.failed,
            contracts_written = summary.contracts_written,
            "fetch loop finished"
        );
        summary
    }

    fn refresh_attempts(&self) -> usize {
        self.universe_refreshes + self.universe_failures
    }

    async fn ensure_universe(&mut self, allow_refresh: bool) -> Result<(), CycleError> {
        if self.needs_refresh {
            if allow_refresh || self.tickers.is_empty() {
                self.refresh_universe().await;
            } else {
                tracing::debug!(tickers = self.tickers.len(), "universe already refreshed this batch");
                self.needs_refresh = false;
            }
        }
        if self.tickers.is_empty() {
            let error = self
                .last_universe_error
                .clone()
                .unwrap_or_else(|| SourceError::unavailable("ticker universe is empty"));
            return Err(CycleError::SourceUnavailable(error));
        }
        Ok(())
    }

    async fn refresh_universe(&mut self) {
        match self.selector.select(self.config.threshold).await {
            Ok(tickers) if !tickers.is_empty() => {
                tracing::info!(tickers = tickers.len(), "universe refreshed");
                self.tickers = tickers;
                self.cursor = 0;
                self.needs_refresh = false;
                self.last_universe_error = None;
                self.universe_refreshes += 1;
                return;
            }
            Ok(_) => {
                self.universe_failures += 1;
                self.last_universe_error = Some(SourceError::unavailable(
                    "no constituents meet the dividend yield threshold",
                ));
                tracing::warn!(
                    threshold = self.config.threshold,
                    kept = self.tickers.len(),
                    "universe refresh returned no tickers; keeping previous set"
                );
            }
            Err(error) => {
                self.universe_failures += 1;
                tracing::warn!(%error, kept = self.tickers.len(), "universe refresh failed; keeping previous set");
                self.last_universe_error = Some(error);
            }
        }
        // With a previous set in hand, retry on the next wrap instead of every step.
        if !self.tickers.is_empty() {
            self.needs_refresh = false;
            self.cursor = 0;
        }
    }
}

/// `now + budget`, or a century out when that overflows the clock.
fn deadline_after(now: Instant, budget: Duration) -> Instant {
    now.checked_add(budget)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::source::UniverseSource;
    use crate::{CalendarDate, Greeks, OptionContract, OptionType, UtcDateTime};

    struct ScriptedUniverse {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<Vec<Ticker>, SourceError>>>,
        fallback: Vec<Ticker>,
    }

    impl ScriptedUniverse {
        fn constant(symbols: &[&str]) -> Arc<Self> {
            Self::scripted(Vec::new(), symbols)
        }

        fn scripted(responses: Vec<Result<Vec<Ticker>, SourceError>>, fallback: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses.into_iter().rev().collect()),
                fallback: tickers(fallback),
            })
        }
    }

    impl UniverseSource for ScriptedUniverse {
        fn id(&self) -> &'static str {
            "scripted"
        }

        fn constituents<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .expect("responses")
                .pop()
                .unwrap_or_else(|| Ok(self.fallback.clone()));
            Box::pin(async move { next })
        }
    }

    #[derive(Default)]
    struct ScriptedChains {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedChains {
        fn failing_on(symbols: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: symbols.iter().map(|symbol| symbol.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl ChainSource for ScriptedChains {
        fn id(&self) -> &'static str {
            "scripted"
        }

        fn snapshot<'a>(
            &'a self,
            symbol: &'a Symbol,
        ) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot, SourceError>> + Send + 'a>> {
            self.calls.lock().expect("calls").push(symbol.to_string());
            let result = if self.failing.contains(symbol.as_str()) {
                Err(SourceError::rate_limited("HTTP 429"))
            } else {
                Ok(snapshot(symbol))
            };
            Box::pin(async move { result })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl ContractSink for MemorySink {
        fn write_chain(
            &self,
            ticker: &Symbol,
            snapshot: &ChainSnapshot,
            _retention: RetentionPolicy,
        ) -> Result<UpsertReport, WarehouseError> {
            if ticker.as_str() == "BAD" {
                return Err(WarehouseError::InvalidRecord(String::from("bad row")));
            }
            self.written.lock().expect("written").push(ticker.to_string());
            Ok(UpsertReport {
                written: snapshot.contracts.len(),
                history_appended: 0,
            })
        }

        fn record_failure(&self, ticker: &Symbol, _source: &str, _message: &str) -> Result<(), WarehouseError> {
            self.failures.lock().expect("failures").push(ticker.to_string());
            Ok(())
        }
    }

    fn tickers(symbols: &[&str]) -> Vec<Ticker> {
        symbols
            .iter()
            .map(|symbol| Ticker::new(Symbol::parse(symbol).expect("symbol"), 0.04, None).expect("ticker"))
            .collect()
    }

    fn snapshot(symbol: &Symbol) -> ChainSnapshot {
        let observed_at = UtcDateTime::parse("2026-03-02T15:30:00Z").expect("ts");
        let contract = OptionContract {
            underlying: symbol.clone(),
            contract_symbol: format!("O:{symbol}260417C00050000"),
            expiration: CalendarDate::parse("2026-04-17").expect("date"),
            strike: 50.0,
            option_type: OptionType::Call,
            bid: Some(1.0),
            ask: Some(1.1),
            last_price: None,
            volume: None,
            open_interest: None,
            implied_volatility: None,
            greeks: Greeks::default(),
            underlying_price: Some(51.0),
            observed_at,
        };
        ChainSnapshot {
            symbol: symbol.clone(),
            observed_at,
            contracts: vec![contract],
            skipped: 0,
            pages: 1,
        }
    }

    fn scheduler(
        universe: Arc<ScriptedUniverse>,
        chains: Arc<ScriptedChains>,
        sink: Arc<MemorySink>,
        batch_size: usize,
    ) -> Scheduler {
        Scheduler::new(
            UniverseSelector::new(universe),
            chains,
            sink,
            SchedulerConfig {
                batch_size,
                ..SchedulerConfig::default()
            },
        )
        .expect("scheduler")
    }

    #[tokio::test]
    async fn wraps_to_first_ticker_after_last() {
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(
            ScriptedUniverse::constant(&["A", "B", "C"]),
            chains.clone(),
            Arc::new(MemorySink::default()),
            1,
        );

        for _ in 0..4 {
            scheduler.step().await.expect("step");
        }

        assert_eq!(chains.calls(), vec!["A", "B", "C", "A"]);
        assert_eq!(scheduler.cursor(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped_and_batch_continues() {
        let chains = ScriptedChains::failing_on(&["C"]);
        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            ScriptedUniverse::constant(&["A", "B", "C", "D"]),
            chains.clone(),
            sink.clone(),
            4,
        );

        let report = scheduler.run_batch().await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            CycleError::FetchFailed { ticker, .. } if ticker.as_str() == "C"
        ));
        assert_eq!(*sink.written.lock().expect("written"), vec!["A", "B", "D"]);
        assert_eq!(*sink.failures.lock().expect("failures"), vec!["C"]);
        assert_eq!(chains.calls(), vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_stop_the_batch() {
        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            ScriptedUniverse::constant(&["A", "BAD", "C"]),
            ScriptedChains::failing_on(&[]),
            sink.clone(),
            3,
        );

        let report = scheduler.run_batch().await;

        assert_eq!(report.outcomes.len(), 2);
        assert!(matches!(&report.failures[0], CycleError::Persistence { .. }));
        assert_eq!(*sink.written.lock().expect("written"), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_universe() {
        let universe = ScriptedUniverse::scripted(
            vec![
                Ok(tickers(&["A", "B"])),
                Err(SourceError::unavailable("index down")),
            ],
            &["X"],
        );
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(universe.clone(), chains.clone(), Arc::new(MemorySink::default()), 1);

        for _ in 0..4 {
            scheduler.step().await.expect("step");
        }

        assert_eq!(chains.calls(), vec!["A", "B", "A", "B"]);
        assert_eq!(universe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.tickers().len(), 2);
    }

    #[tokio::test]
    async fn missing_universe_is_source_unavailable() {
        let universe = ScriptedUniverse::scripted(vec![Err(SourceError::unavailable("offline"))], &[]);
        let mut scheduler = scheduler(
            universe,
            ScriptedChains::failing_on(&[]),
            Arc::new(MemorySink::default()),
            4,
        );

        let report = scheduler.run_batch().await;
        assert_eq!(report.attempted(), 0);
        assert_eq!(
            report.universe_unavailable.map(|error| error.code()),
            Some("source.unavailable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_processes_batch_size_per_interval_until_budget() {
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(
            ScriptedUniverse::constant(&["A", "B", "C"]),
            chains.clone(),
            Arc::new(MemorySink::default()),
            2,
        );
        let started = Instant::now();

        let summary = scheduler.run(Duration::from_secs(180)).await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.succeeded, 6);
        assert_eq!(summary.contracts_written, 6);
        assert_eq!(chains.calls(), vec!["A", "B", "C", "A", "B", "C"]);
        assert_eq!(started.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn run_never_sleeps_past_deadline() {
        let mut scheduler = scheduler(
            ScriptedUniverse::constant(&["A"]),
            ScriptedChains::failing_on(&[]),
            Arc::new(MemorySink::default()),
            1,
        );
        let started = Instant::now();

        let summary = scheduler.run(Duration::from_secs(90)).await;

        assert_eq!(summary.batches, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_an_interval_when_no_universe() {
        let universe = ScriptedUniverse::scripted(vec![Err(SourceError::unavailable("offline"))], &["A"]);
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(universe, chains.clone(), Arc::new(MemorySink::default()), 1);

        let summary = scheduler.run(Duration::from_secs(120)).await;

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.universe_failures, 1);
        assert_eq!(summary.universe_refreshes, 1);
        assert_eq!(chains.calls(), vec!["A"]);
    }

    #[tokio::test]
    async fn small_universe_is_refreshed_once_per_batch() {
        let universe = ScriptedUniverse::constant(&["A"]);
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(universe.clone(), chains.clone(), Arc::new(MemorySink::default()), 4);

        let first = scheduler.run_batch().await;
        assert_eq!(first.outcomes.len(), 4);
        assert_eq!(universe.calls.load(Ordering::SeqCst), 1);

        scheduler.run_batch().await;
        assert_eq!(universe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(chains.calls().len(), 8);
    }

    #[tokio::test]
    async fn deferred_refresh_keeps_cycle_order() {
        let universe = ScriptedUniverse::constant(&["A", "B", "C"]);
        let chains = ScriptedChains::failing_on(&[]);
        let mut scheduler = scheduler(universe.clone(), chains.clone(), Arc::new(MemorySink::default()), 4);

        scheduler.run_batch().await;
        scheduler.run_batch().await;

        assert_eq!(chains.calls(), vec!["A", "B", "C", "A", "B", "C", "A", "B"]);
        assert_eq!(universe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn oversized_budget_does_not_overflow_the_clock() {
        let now = Instant::now();
        assert!(deadline_after(now, Duration::MAX) > now);
        assert_eq!(
            deadline_after(now, Duration::from_secs(90)),
            now + Duration::from_secs(90)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_sleeps_only_until_deadline() {
        let mut scheduler = Scheduler::new(
            UniverseSelector::new(ScriptedUniverse::constant(&["A"])),
            ScriptedChains::failing_on(&[]),
            Arc::new(MemorySink::default()),
            SchedulerConfig {
                batch_size: 1,
                interval: Duration::MAX,
                ..SchedulerConfig::default()
            },
        )
        .expect("scheduler");
        let started = Instant::now();

        let summary = scheduler.run(Duration::from_secs(30)).await;

        assert_eq!(summary.batches, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = SchedulerConfig {
            batch_size: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::NonPositiveValue { field: "batch_size" })
        );
    }
}
