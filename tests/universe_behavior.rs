//! Behavior-driven tests for dividend universe selection
//!
//! Ticker files live in temp directories; dividend data and the index
//! constituents download are scripted.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use divopt_core::{
    CalendarDate, DividendSource, FileUniverse, HttpClient, HttpError, HttpRequest, HttpResponse,
    IndexUniverse, SourceError, SourceErrorKind, Symbol, Ticker, UniverseSelector,
    DEFAULT_YIELD_THRESHOLD,
};
use tempfile::tempdir;

/// Dividend lookup over a fixed table; unknown symbols get a zero yield.
struct TableDividends {
    yields: HashMap<&'static str, f64>,
    requested: Mutex<Vec<String>>,
}

impl TableDividends {
    fn new(entries: &[(&'static str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            yields: entries.iter().copied().collect(),
            requested: Mutex::new(Vec::new()),
        })
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("requested").clone()
    }
}

impl DividendSource for TableDividends {
    fn id(&self) -> &'static str {
        "table"
    }

    fn dividends<'a>(
        &'a self,
        symbols: &'a [Symbol],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
        self.requested
            .lock()
            .expect("requested")
            .extend(symbols.iter().map(Symbol::to_string));
        let result = symbols
            .iter()
            .map(|symbol| {
                let dividend_yield = self.yields.get(symbol.as_str()).copied().unwrap_or(0.0);
                Ticker::new(symbol.clone(), dividend_yield, None)
                    .map_err(|error| SourceError::internal(error.to_string()))
            })
            .collect::<Result<Vec<_>, _>>();
        Box::pin(async move { result })
    }
}

struct OneResponse(Result<HttpResponse, HttpError>);

impl HttpClient for OneResponse {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self.0.clone();
        Box::pin(async move { response })
    }
}

fn symbols(tickers: &[Ticker]) -> Vec<&str> {
    tickers.iter().map(|ticker| ticker.symbol.as_str()).collect()
}

// =============================================================================
// Universe: Ticker file
// =============================================================================

#[tokio::test]
async fn ticker_file_mixes_explicit_yields_and_enriched_symbols() {
    // Given: A file with explicit yields, bare symbols and noise
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tickers.txt");
    fs::write(
        &path,
        "# dividend watchlist\n\
         KO,3.1%,2026-03-13\n\
         AAPL,0.004\n\
         PEP\n\
         XOM  # enriched\n\
         not a ticker,??\n\
         \n",
    )
    .expect("write tickers");
    let dividends = TableDividends::new(&[("PEP", 0.036), ("XOM", 0.012)]);
    let source = FileUniverse::new(&path).with_dividends(dividends.clone());

    // When: Selecting at the default 2.5% threshold
    let selected = UniverseSelector::new(Arc::new(source))
        .select(DEFAULT_YIELD_THRESHOLD)
        .await
        .expect("select");

    // Then: Only bare symbols were looked up, and only high yielders remain
    assert_eq!(dividends.requested(), vec!["PEP", "XOM"]);
    assert_eq!(symbols(&selected), vec!["KO", "PEP"]);
    let ko = &selected[0];
    assert!((ko.dividend_yield - 0.031).abs() < 1e-12);
    assert_eq!(
        ko.ex_dividend_date,
        Some(CalendarDate::parse("2026-03-13").expect("date"))
    );
}

#[tokio::test]
async fn zero_threshold_keeps_every_listed_company() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tickers.txt");
    fs::write(&path, "T,0.065\nMSFT,0\nKO,0.031\n").expect("write tickers");

    let selected = UniverseSelector::new(Arc::new(FileUniverse::new(&path)))
        .select(0.0)
        .await
        .expect("select");

    assert_eq!(symbols(&selected), vec!["KO", "MSFT", "T"]);
}

#[tokio::test]
async fn duplicate_entries_collapse_to_the_first() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tickers.txt");
    fs::write(&path, "KO,0.031\nKO,0.05\n").expect("write tickers");

    let selected = UniverseSelector::new(Arc::new(FileUniverse::new(&path)))
        .select(0.01)
        .await
        .expect("select");

    assert_eq!(selected.len(), 1);
    assert!((selected[0].dividend_yield - 0.031).abs() < 1e-12);
}

#[tokio::test]
async fn out_of_range_threshold_is_rejected_before_reading() {
    let temp = tempdir().expect("tempdir");
    let selector = UniverseSelector::new(Arc::new(FileUniverse::new(temp.path().join("absent.txt"))));

    let error = selector.select(1.5).await.expect_err("threshold above 1");

    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
}

// =============================================================================
// Universe: Index constituents
// =============================================================================

#[tokio::test]
async fn index_constituents_are_enriched_and_filtered() {
    let csv = "Symbol,Security,GICS Sector\n\
               KO,Coca-Cola Company (The),Consumer Staples\n\
               MSFT,Microsoft,Information Technology\n\
               \"MO\",\"Altria Group, Inc.\",Consumer Staples\n";
    let http = Arc::new(OneResponse(Ok(HttpResponse::new(200, csv))));
    let dividends = TableDividends::new(&[("KO", 0.031), ("MSFT", 0.007), ("MO", 0.071)]);
    let source = IndexUniverse::new("https://index.test/constituents.csv", http, dividends.clone());

    let selected = UniverseSelector::new(Arc::new(source))
        .select(DEFAULT_YIELD_THRESHOLD)
        .await
        .expect("select");

    assert_eq!(dividends.requested(), vec!["KO", "MSFT", "MO"]);
    assert_eq!(symbols(&selected), vec!["KO", "MO"]);
}

#[tokio::test]
async fn failed_constituents_download_is_unavailable() {
    let http = Arc::new(OneResponse(Ok(HttpResponse::new(502, "bad gateway"))));
    let source = IndexUniverse::new(
        "https://index.test/constituents.csv",
        http,
        TableDividends::new(&[]),
    );

    let error = UniverseSelector::new(Arc::new(source))
        .select(DEFAULT_YIELD_THRESHOLD)
        .await
        .expect_err("502");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(error.retryable());
}
