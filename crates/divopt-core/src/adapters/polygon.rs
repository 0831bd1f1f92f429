use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::source::{ChainSource, SourceError};
use crate::throttling::{RequestThrottle, ThrottleQuota};
use crate::{
    CalendarDate, ChainSnapshot, Greeks, OptionContract, OptionType, Symbol, UtcDateTime,
};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Settings for the Polygon options snapshot adapter.
#[derive(Clone)]
pub struct PolygonConfig {
    pub base_url: String,
    pub api_key: String,
    /// Contracts requested per page (Polygon caps this at 250).
    pub page_limit: u32,
    /// Pages followed through `next_url` before the snapshot is cut short.
    pub max_pages: usize,
    pub timeout: Duration,
    pub quota: ThrottleQuota,
    pub retry: RetryConfig,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            api_key: api_key.into(),
            page_limit: 250,
            max_pages: 10,
            timeout: Duration::from_secs(20),
            quota: ThrottleQuota::polygon_free_tier(),
            retry: RetryConfig::disabled(),
        }
    }
}

impl Debug for PolygonConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("page_limit", &self.page_limit)
            .field("max_pages", &self.max_pages)
            .field("timeout", &self.timeout)
            .field("quota", &self.quota)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Chain fetcher backed by `GET /v3/snapshot/options/{underlying}`.
#[derive(Clone)]
pub struct PolygonChainSource {
    base_url: String,
    page_limit: u32,
    max_pages: usize,
    timeout: Duration,
    retry: RetryConfig,
    auth: HttpAuth,
    http_client: Arc<dyn HttpClient>,
    throttle: RequestThrottle,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PolygonChainSource {
    pub fn new(config: PolygonConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit.clamp(1, 250),
            max_pages: config.max_pages.max(1),
            timeout: config.timeout,
            retry: config.retry,
            auth: HttpAuth::BearerToken(config.api_key),
            http_client,
            throttle: RequestThrottle::new(config.quota),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Share a throttle with other adapters hitting the same account.
    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<ChainSnapshot, SourceError> {
        let observed_at = UtcDateTime::now();
        let mut url = format!(
            "{}/v3/snapshot/options/{}?limit={}",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            self.page_limit
        );
        let mut snapshot = ChainSnapshot {
            symbol: symbol.clone(),
            observed_at,
            contracts: Vec::new(),
            skipped: 0,
            pages: 0,
        };

        loop {
            let page: SnapshotPage = self.get_json(&url).await?;
            snapshot.pages += 1;

            for result in page.results {
                match normalize_contract(symbol, observed_at, result) {
                    Some(contract) => snapshot.contracts.push(contract),
                    None => snapshot.skipped += 1,
                }
            }

            let Some(next_url) = page.next_url.filter(|next| !next.is_empty()) else {
                break;
            };
            if snapshot.pages >= self.max_pages {
                tracing::warn!(
                    ticker = %symbol,
                    pages = snapshot.pages,
                    "snapshot truncated at page limit"
                );
                break;
            }
            if !same_origin(&self.base_url, &next_url) {
                return Err(SourceError::internal(format!(
                    "polygon next_url points outside {}",
                    self.base_url
                )));
            }
            url = next_url;
        }

        tracing::debug!(
            ticker = %symbol,
            contracts = snapshot.contracts.len(),
            skipped = snapshot.skipped,
            pages = snapshot.pages,
            "fetched options snapshot"
        );
        Ok(snapshot)
    }

    async fn get_json(&self, url: &str) -> Result<SnapshotPage, SourceError> {
        let mut attempt = 0;
        loop {
            let (error, retry) = match self.send(url).await {
                Ok(body) => {
                    return serde_json::from_str(&body).map_err(|error| {
                        SourceError::internal(format!("polygon payload is not a snapshot: {error}"))
                    })
                }
                Err(failure) => failure,
            };

            if !(retry && self.retry.has_budget(attempt)) {
                return Err(error);
            }
            let delay = self.retry.delay_for_attempt(attempt);
            tracing::info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, %error, "retrying polygon request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One throttled request. On failure returns the error and whether the
    /// retry policy covers it.
    async fn send(&self, url: &str) -> Result<String, (SourceError, bool)> {
        if !self.circuit_breaker.allow_request() {
            return Err((
                SourceError::unavailable("polygon circuit breaker is open; skipping upstream call"),
                false,
            ));
        }
        self.throttle.acquire().await;

        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_timeout(self.timeout);
        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                self.circuit_breaker.record_failure();
                let retry = error.timed_out() && self.retry.retry_on_timeout;
                return Err((
                    SourceError::unavailable(format!("polygon transport error: {}", error.message())),
                    retry,
                ));
            }
        };

        if response.is_success() {
            self.circuit_breaker.record_success();
            return Ok(response.body);
        }

        self.circuit_breaker.record_failure();
        let retry = self.retry.should_retry_status(response.status);
        let error = if response.is_rate_limited() {
            SourceError::rate_limited("polygon rate limit exceeded (HTTP 429)")
        } else {
            SourceError::unavailable(format!(
                "polygon upstream returned status {}{}",
                response.status,
                upstream_message(&response.body)
                    .map(|message| format!(": {message}"))
                    .unwrap_or_default()
            ))
        };
        Err((error, retry))
    }
}

impl ChainSource for PolygonChainSource {
    fn id(&self) -> &'static str {
        "polygon"
    }

    fn snapshot<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<ChainSnapshot, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_snapshot(symbol))
    }
}

/// Scheme, host and port must match; the bearer token follows `next_url`.
fn same_origin(base: &str, candidate: &str) -> bool {
    let (Ok(base), Ok(candidate)) = (Url::parse(base), Url::parse(candidate)) else {
        return false;
    };
    base.scheme() == candidate.scheme()
        && base.host_str().is_some()
        && base.host_str() == candidate.host_str()
        && base.port_or_known_default() == candidate.port_or_known_default()
}

fn upstream_message(body: &str) -> Option<String> {
    let payload: ErrorPayload = serde_json::from_str(body).ok()?;
    payload.message.or(payload.error)
}

/// Map one snapshot result to a contract; `None` when a key field is missing
/// or malformed.
fn normalize_contract(
    symbol: &Symbol,
    observed_at: UtcDateTime,
    result: SnapshotResult,
) -> Option<OptionContract> {
    let details = result.details?;
    let expiration = CalendarDate::parse(details.expiration_date.as_deref()?).ok()?;
    let strike = details.strike_price.filter(|strike| strike.is_finite() && *strike > 0.0)?;
    let option_type: OptionType = details.contract_type.as_deref()?.parse().ok()?;
    let contract_symbol = details.ticker.filter(|ticker| !ticker.is_empty())?;

    let day = result.day.unwrap_or_default();
    let last_price = result
        .last_trade
        .and_then(|trade| trade.price)
        .or(day.close)
        .and_then(non_negative);
    let (bid, ask) = result
        .last_quote
        .map(|quote| (quote.bid.and_then(non_negative), quote.ask.and_then(non_negative)))
        .unwrap_or_default();
    let greeks = result
        .greeks
        .map(|greeks| Greeks {
            delta: greeks.delta.filter(|value| value.is_finite()),
            gamma: greeks.gamma.filter(|value| value.is_finite()),
            theta: greeks.theta.filter(|value| value.is_finite()),
            vega: greeks.vega.filter(|value| value.is_finite()),
        })
        .unwrap_or_default();

    Some(OptionContract {
        underlying: symbol.clone(),
        contract_symbol,
        expiration,
        strike,
        option_type,
        bid,
        ask,
        last_price,
        volume: day.volume.and_then(whole_count),
        open_interest: result.open_interest.and_then(whole_count),
        implied_volatility: result.implied_volatility.and_then(non_negative),
        greeks,
        underlying_price: result
            .underlying_asset
            .and_then(|asset| asset.price)
            .filter(|price| price.is_finite() && *price > 0.0),
        observed_at,
    })
}

fn non_negative(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn whole_count(value: f64) -> Option<u64> {
    non_negative(value).map(|value| value.round() as u64)
}

#[derive(Debug, Deserialize)]
struct SnapshotPage {
    #[serde(default)]
    results: Vec<SnapshotResult>,
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResult {
    details: Option<ContractDetails>,
    last_quote: Option<LastQuote>,
    last_trade: Option<LastTrade>,
    day: Option<DayStats>,
    open_interest: Option<f64>,
    implied_volatility: Option<f64>,
    greeks: Option<GreeksPayload>,
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Deserialize)]
struct ContractDetails {
    ticker: Option<String>,
    expiration_date: Option<String>,
    strike_price: Option<f64>,
    contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastQuote {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DayStats {
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GreeksPayload {
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UnderlyingAsset {
    price: Option<f64>,
}
