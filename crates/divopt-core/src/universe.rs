//! Working-universe selection.

use std::sync::Arc;

use crate::source::{DividendSource, SourceError, UniverseSource};
use crate::{Symbol, Ticker, ValidationError};

/// Default minimum trailing dividend yield (2.5%).
pub const DEFAULT_YIELD_THRESHOLD: f64 = 0.025;

/// Check that a yield threshold is a fraction in `[0, 1]`.
pub fn validate_threshold(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidThreshold {
            value: value.to_string(),
        })
    }
}

/// Keep tickers yielding at least `threshold`, sorted by symbol with
/// duplicates removed (first occurrence wins).
pub fn filter_by_yield(mut tickers: Vec<Ticker>, threshold: f64) -> Vec<Ticker> {
    tickers.retain(|ticker| ticker.dividend_yield >= threshold);
    tickers.sort_by(|left, right| left.symbol.cmp(&right.symbol));
    tickers.dedup_by(|later, earlier| later.symbol == earlier.symbol);
    tickers
}

/// Produces the working ticker set from a [`UniverseSource`].
#[derive(Clone)]
pub struct UniverseSelector {
    source: Arc<dyn UniverseSource>,
}

impl UniverseSelector {
    pub fn new(source: Arc<dyn UniverseSource>) -> Self {
        Self { source }
    }

    pub fn source_id(&self) -> &'static str {
        self.source.id()
    }

    /// Fetch constituents and keep those with `dividend_yield >= threshold`.
    pub async fn select(&self, threshold: f64) -> Result<Vec<Ticker>, SourceError> {
        let threshold = validate_threshold(threshold)
            .map_err(|error| SourceError::invalid_request(error.to_string()))?;
        let constituents = self.source.constituents().await?;
        let total = constituents.len();
        let selected = filter_by_yield(constituents, threshold);

        tracing::info!(
            source = self.source.id(),
            constituents = total,
            selected = selected.len(),
            threshold,
            "selected dividend universe"
        );
        Ok(selected)
    }
}

/// Attach dividend data to symbols that arrived without it.
pub(crate) async fn enrich(
    symbols: Vec<Symbol>,
    dividends: Option<&dyn DividendSource>,
) -> Result<Vec<Ticker>, SourceError> {
    if symbols.is_empty() {
        return Ok(Vec::new());
    }
    match dividends {
        Some(source) => {
            let tickers = source.dividends(&symbols).await?;
            tracing::debug!(source = source.id(), symbols = symbols.len(), "enriched dividend data");
            Ok(tickers)
        }
        None => {
            tracing::warn!(
                symbols = symbols.len(),
                "no dividend source configured; bare symbols get a zero yield"
            );
            Ok(symbols.into_iter().map(Ticker::bare).collect())
        }
    }
}
