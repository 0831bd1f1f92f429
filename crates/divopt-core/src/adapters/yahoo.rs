use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::http_client::{HttpClient, HttpRequest};
use crate::source::{DividendSource, SourceError};
use crate::{CalendarDate, Symbol, Ticker};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const QUOTE_FIELDS: &str =
    "trailingAnnualDividendYield,dividendYield,exDividendDate,dividendDate";

/// Symbols per quote request.
pub const MAX_BATCH: usize = 50;

/// Dividend lookup through Yahoo Finance's batch quote endpoint.
///
/// Yahoo requires a session cookie (kept by the HTTP client's cookie store)
/// plus a crumb token passed as a query parameter. The crumb is cached and
/// refreshed once when a request comes back 401/403.
#[derive(Clone)]
pub struct YahooDividendSource {
    http_client: Arc<dyn HttpClient>,
    crumb: Arc<Mutex<Option<String>>>,
    timeout: Duration,
}

impl YahooDividendSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            crumb: Arc::new(Mutex::new(None)),
            timeout: Duration::from_secs(10),
        }
    }

    async fn lookup(&self, symbols: &[Symbol]) -> Result<Vec<Ticker>, SourceError> {
        let mut tickers = Vec::with_capacity(symbols.len());
        for batch in symbols.chunks(MAX_BATCH) {
            let quotes = self.quote_batch(batch).await?;
            tickers.extend(batch.iter().map(|symbol| {
                quotes
                    .iter()
                    .find(|quote| quote.symbol.eq_ignore_ascii_case(&symbol.to_yahoo()))
                    .map(|quote| quote.to_ticker(symbol))
                    .unwrap_or_else(|| Ticker::bare(symbol.clone()))
            }));
        }
        Ok(tickers)
    }

    async fn quote_batch(&self, batch: &[Symbol]) -> Result<Vec<YahooQuote>, SourceError> {
        let symbols = batch
            .iter()
            .map(Symbol::to_yahoo)
            .collect::<Vec<_>>()
            .join(",");

        for refreshed in [false, true] {
            if refreshed {
                self.invalidate_crumb();
            }
            let crumb = self.crumb().await?;
            let request = HttpRequest::get(QUOTE_URL)
                .with_query("symbols", &symbols)
                .with_query("fields", QUOTE_FIELDS)
                .with_query("crumb", &crumb)
                .with_timeout(self.timeout);
            let response = self.http_client.execute(request).await.map_err(|error| {
                SourceError::unavailable(format!("yahoo transport error: {}", error.message()))
            })?;

            match response.status {
                401 | 403 if !refreshed => {
                    tracing::debug!(status = response.status, "yahoo crumb rejected; refreshing");
                    continue;
                }
                429 => return Err(SourceError::rate_limited("yahoo rate limit exceeded (HTTP 429)")),
                status if !(200..300).contains(&status) => {
                    return Err(SourceError::unavailable(format!(
                        "yahoo quote endpoint returned status {status}"
                    )))
                }
                _ => {}
            }

            let envelope: QuoteEnvelope = serde_json::from_str(&response.body).map_err(|error| {
                SourceError::internal(format!("yahoo quote payload is malformed: {error}"))
            })?;
            return Ok(envelope.quote_response.result);
        }

        Err(SourceError::unavailable("yahoo rejected a freshly issued crumb"))
    }

    async fn crumb(&self) -> Result<String, SourceError> {
        if let Some(crumb) = lock(&self.crumb).clone() {
            return Ok(crumb);
        }

        // The cookie response is usually a 404; only the Set-Cookie matters.
        self.http_client
            .execute(HttpRequest::get(COOKIE_URL).with_timeout(self.timeout))
            .await
            .map_err(|error| {
                SourceError::unavailable(format!("failed to fetch yahoo cookie: {}", error.message()))
            })?;

        for url in CRUMB_URLS {
            let request = HttpRequest::get(url).with_timeout(self.timeout);
            let Ok(response) = self.http_client.execute(request).await else {
                continue;
            };
            if response.is_rate_limited() {
                return Err(SourceError::rate_limited("yahoo rate limited the crumb request"));
            }
            let crumb = response.body.trim();
            if response.is_success() && is_plausible_crumb(crumb) {
                *lock(&self.crumb) = Some(crumb.to_string());
                return Ok(crumb.to_string());
            }
        }

        Err(SourceError::unavailable("failed to obtain a yahoo crumb"))
    }

    fn invalidate_crumb(&self) {
        *lock(&self.crumb) = None;
    }
}

impl DividendSource for YahooDividendSource {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn dividends<'a>(
        &'a self,
        symbols: &'a [Symbol],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticker>, SourceError>> + Send + 'a>> {
        Box::pin(self.lookup(symbols))
    }
}

fn lock(mutex: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_plausible_crumb(crumb: &str) -> bool {
    !crumb.is_empty() && crumb.len() <= 64 && !crumb.contains(char::is_whitespace) && !crumb.starts_with('{')
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    trailing_annual_dividend_yield: Option<f64>,
    /// Percent, e.g. `3.1` for 3.1%.
    dividend_yield: Option<f64>,
    ex_dividend_date: Option<Value>,
    dividend_date: Option<Value>,
}

impl YahooQuote {
    fn to_ticker(&self, symbol: &Symbol) -> Ticker {
        let dividend_yield = self
            .trailing_annual_dividend_yield
            .filter(|value| value.is_finite() && *value > 0.0)
            .or_else(|| self.dividend_yield.map(|percent| percent / 100.0))
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(0.0);
        let ex_dividend_date = self
            .ex_dividend_date
            .as_ref()
            .and_then(epoch_date)
            .or_else(|| self.dividend_date.as_ref().and_then(epoch_date));

        Ticker::new(symbol.clone(), dividend_yield, ex_dividend_date)
            .unwrap_or_else(|_| Ticker::bare(symbol.clone()))
    }
}

/// Yahoo reports dates either as epoch seconds or as `{"raw": seconds}`.
fn epoch_date(value: &Value) -> Option<CalendarDate> {
    let seconds = value
        .as_i64()
        .or_else(|| value.get("raw").and_then(Value::as_i64))?;
    CalendarDate::from_unix_seconds(seconds).ok()
}
