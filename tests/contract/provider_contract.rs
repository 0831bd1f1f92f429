//! Contract tests for the options-chain provider
//!
//! Every upstream response shape the poller depends on is replayed through a
//! scripted transport, so these run without network access.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use divopt_core::{
    ChainSource, CircuitBreaker, CircuitBreakerConfig, HttpClient, HttpError, HttpRequest,
    HttpResponse, OptionType, PolygonChainSource, PolygonConfig, RequestThrottle, RetryConfig,
    SourceErrorKind, Symbol, ThrottleQuota,
};

const BASE_URL: &str = "https://polygon.test";

/// Replays responses in order and keeps every request it saw.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn replay(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests").clone()
    }
}

impl HttpClient for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests").push(request);
        let next = self
            .responses
            .lock()
            .expect("responses")
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::new("script exhausted")));
        Box::pin(async move { next })
    }
}

fn config() -> PolygonConfig {
    PolygonConfig {
        base_url: String::from(BASE_URL),
        quota: ThrottleQuota::new(1_000, Duration::from_secs(1)),
        ..PolygonConfig::new("test-key")
    }
}

fn ok(body: &str) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::new(200, body))
}

fn status(code: u16, body: &str) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::new(code, body))
}

fn ko() -> Symbol {
    Symbol::parse("KO").expect("symbol")
}

fn result_json(contract: &str, strike: f64, kind: &str, bid: f64) -> String {
    format!(
        r#"{{"details": {{"ticker": "{contract}", "expiration_date": "2026-04-17",
                          "strike_price": {strike}, "contract_type": "{kind}"}},
            "last_quote": {{"bid": {bid}, "ask": {ask}}},
            "implied_volatility": 0.2,
            "underlying_asset": {{"price": 60.4}}}}"#,
        ask = bid + 0.1
    )
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn snapshot_follows_next_url_until_exhausted() {
    let transport = ScriptedTransport::replay(vec![
        ok(&format!(
            r#"{{"results": [{}, {}], "next_url": "{BASE_URL}/v3/snapshot/options/KO?cursor=abc"}}"#,
            result_json("O:KO260417C00060000", 60.0, "call", 1.25),
            result_json("O:KO260417P00055000", 55.0, "put", 0.4),
        )),
        ok(&format!(
            r#"{{"results": [{}], "status": "OK"}}"#,
            result_json("O:KO260417C00065000", 65.0, "call", 0.3),
        )),
    ]);
    let source = PolygonChainSource::new(config(), transport.clone());

    let snapshot = source.snapshot(&ko()).await.expect("snapshot");

    assert_eq!(snapshot.pages, 2);
    assert_eq!(snapshot.contracts.len(), 3);
    assert_eq!(snapshot.skipped, 0);
    assert!(snapshot.contracts.iter().all(|contract| contract.underlying == ko()));
    assert_eq!(snapshot.contracts[1].option_type, OptionType::Put);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0]
        .url
        .starts_with("https://polygon.test/v3/snapshot/options/KO?limit="));
    assert!(requests[1].url.ends_with("cursor=abc"));
    for request in &requests {
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer test-key")
        );
    }
}

#[tokio::test]
async fn snapshot_stops_at_page_limit() {
    let page = format!(
        r#"{{"results": [{}], "next_url": "{BASE_URL}/v3/snapshot/options/KO?cursor=more"}}"#,
        result_json("O:KO260417C00060000", 60.0, "call", 1.25)
    );
    let transport = ScriptedTransport::replay(vec![ok(&page), ok(&page), ok(&page)]);
    let source = PolygonChainSource::new(
        PolygonConfig {
            max_pages: 2,
            ..config()
        },
        transport.clone(),
    );

    let snapshot = source.snapshot(&ko()).await.expect("snapshot");

    assert_eq!(snapshot.pages, 2);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn next_url_on_foreign_host_is_rejected() {
    let transport = ScriptedTransport::replay(vec![ok(
        r#"{"results": [], "next_url": "https://elsewhere.test/v3/snapshot/options/KO?cursor=x"}"#,
    )]);
    let source = PolygonChainSource::new(config(), transport.clone());

    let error = source.snapshot(&ko()).await.expect_err("foreign next_url");

    assert_eq!(error.kind(), SourceErrorKind::Internal);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn next_url_on_lookalike_host_never_receives_the_api_key() {
    let transport = ScriptedTransport::replay(vec![
        ok(&format!(
            r#"{{"results": [{}], "next_url": "https://polygon.test.evil.example/steal?cursor=x"}}"#,
            result_json("O:KO260417C00060000", 60.0, "call", 1.25)
        )),
        ok(r#"{"results": []}"#),
    ]);
    let source = PolygonChainSource::new(config(), transport.clone());

    let error = source.snapshot(&ko()).await.expect_err("lookalike next_url");

    assert_eq!(error.kind(), SourceErrorKind::Internal);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests
        .iter()
        .all(|request| request.url.starts_with("https://polygon.test/")));
}

#[tokio::test]
async fn rows_missing_key_fields_are_counted_not_stored() {
    let transport = ScriptedTransport::replay(vec![ok(&format!(
        r#"{{"results": [{}, {{"details": {{"ticker": "O:BROKEN", "contract_type": "call"}}}}]}}"#,
        result_json("O:KO260417C00060000", 60.0, "call", 1.25)
    ))]);
    let source = PolygonChainSource::new(config(), transport);

    let snapshot = source.snapshot(&ko()).await.expect("snapshot");

    assert_eq!(snapshot.contracts.len(), 1);
    assert_eq!(snapshot.skipped, 1);
}

#[tokio::test]
async fn empty_chain_is_a_valid_snapshot() {
    let transport = ScriptedTransport::replay(vec![ok(r#"{"results": [], "status": "OK"}"#)]);
    let source = PolygonChainSource::new(config(), transport);

    let snapshot = source.snapshot(&ko()).await.expect("snapshot");

    assert!(snapshot.contracts.is_empty());
    assert_eq!(snapshot.pages, 1);
}

// =============================================================================
// Error mapping
// =============================================================================

#[tokio::test]
async fn http_429_maps_to_rate_limited() {
    let transport = ScriptedTransport::replay(vec![status(
        429,
        r#"{"status": "ERROR", "error": "You've exceeded the maximum requests per minute"}"#,
    )]);
    let source = PolygonChainSource::new(config(), transport);

    let error = source.snapshot(&ko()).await.expect_err("429");

    assert_eq!(error.kind(), SourceErrorKind::RateLimited);
    assert_eq!(error.code(), "source.rate_limited");
    assert!(error.retryable());
}

#[tokio::test]
async fn server_errors_map_to_unavailable_with_upstream_message() {
    let transport = ScriptedTransport::replay(vec![status(
        503,
        r#"{"status": "ERROR", "message": "maintenance window"}"#,
    )]);
    let source = PolygonChainSource::new(config(), transport);

    let error = source.snapshot(&ko()).await.expect_err("503");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(error.message().contains("503"));
    assert!(error.message().contains("maintenance window"));
}

#[tokio::test]
async fn malformed_payload_maps_to_internal() {
    let transport = ScriptedTransport::replay(vec![ok("<html>not json</html>")]);
    let source = PolygonChainSource::new(config(), transport);

    let error = source.snapshot(&ko()).await.expect_err("html");

    assert_eq!(error.kind(), SourceErrorKind::Internal);
    assert!(!error.retryable());
}

#[tokio::test]
async fn api_key_never_appears_in_errors() {
    let transport = ScriptedTransport::replay(vec![Err(HttpError::new("connection refused"))]);
    let source = PolygonChainSource::new(config(), transport);

    let error = source.snapshot(&ko()).await.expect_err("transport");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(!error.to_string().contains("test-key"));
}

// =============================================================================
// Resilience
// =============================================================================

#[tokio::test(start_paused = true)]
async fn retry_policy_recovers_from_transient_429() {
    let transport = ScriptedTransport::replay(vec![
        status(429, ""),
        ok(&format!(
            r#"{{"results": [{}]}}"#,
            result_json("O:KO260417C00060000", 60.0, "call", 1.25)
        )),
    ]);
    let source = PolygonChainSource::new(
        PolygonConfig {
            retry: RetryConfig::exponential(2),
            ..config()
        },
        transport.clone(),
    );

    let snapshot = source.snapshot(&ko()).await.expect("snapshot after retry");

    assert_eq!(snapshot.contracts.len(), 1);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_short_circuits_upstream_calls() {
    let transport = ScriptedTransport::replay(vec![
        status(500, ""),
        status(500, ""),
        ok(r#"{"results": []}"#),
    ]);
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        open_timeout: Duration::from_secs(30),
    }));
    let source = PolygonChainSource::new(config(), transport.clone())
        .with_circuit_breaker(Arc::clone(&breaker));

    assert!(source.snapshot(&ko()).await.is_err());
    assert!(source.snapshot(&ko()).await.is_err());
    let error = source.snapshot(&ko()).await.expect_err("circuit open");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(error.message().contains("circuit breaker"));
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn open_circuit_does_not_spend_throttle_budget() {
    let throttle = RequestThrottle::new(ThrottleQuota::new(3, Duration::from_secs(60)));
    let transport = ScriptedTransport::replay(vec![status(500, "")]);
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        open_timeout: Duration::from_secs(30),
    }));
    let source = PolygonChainSource::new(config(), transport.clone())
        .with_circuit_breaker(breaker)
        .with_throttle(throttle.clone());

    assert!(source.snapshot(&ko()).await.is_err());
    for _ in 0..2 {
        let error = source.snapshot(&ko()).await.expect_err("circuit open");
        assert!(error.message().contains("circuit breaker"));
    }

    assert_eq!(transport.requests().len(), 1);
    // Only the request that reached the transport was charged.
    assert!(throttle.try_acquire().is_ok());
    assert!(throttle.try_acquire().is_ok());
}
