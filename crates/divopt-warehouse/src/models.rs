use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::WarehouseError;

/// Default row cap applied to contract queries.
pub const DEFAULT_QUERY_LIMIT: usize = 500;

/// Contract side as stored in the `option_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

impl Display for OptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKind {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(Self::Call),
            "put" | "p" => Ok(Self::Put),
            other => Err(WarehouseError::InvalidRecord(format!(
                "unknown option type '{other}'"
            ))),
        }
    }
}

/// How observations are kept across fetch cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Only the most recent observation per contract key.
    #[default]
    Latest,
    /// Latest row plus an append-only observation history.
    History,
}

impl RetentionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::History => "history",
        }
    }
}

impl Display for RetentionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionPolicy {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "history" => Ok(Self::History),
            other => Err(WarehouseError::QueryRejected(format!(
                "unknown retention policy '{other}' (expected 'latest' or 'history')"
            ))),
        }
    }
}

/// A flat contract row ready for insertion.
///
/// Dates travel as `YYYY-MM-DD` and timestamps as `YYYY-MM-DD HH:MM:SS` (UTC);
/// both are cast by the database on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub ticker: String,
    pub contract_symbol: String,
    pub expiration_date: String,
    pub strike_price: f64,
    pub option_type: OptionKind,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub implied_volatility: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub underlying_price: Option<f64>,
    pub observed_at: String,
}

impl ContractRecord {
    /// Upsert key: (expiration, strike, type). The ticker is implied by the
    /// chain being written.
    pub(crate) fn key(&self) -> (String, u64, OptionKind) {
        (
            self.expiration_date.clone(),
            self.strike_price.to_bits(),
            self.option_type,
        )
    }

    pub(crate) fn validate(&self, ticker: &str) -> Result<(), WarehouseError> {
        if self.ticker != ticker {
            return Err(WarehouseError::InvalidRecord(format!(
                "record for '{}' found in chain for '{ticker}'",
                self.ticker
            )));
        }
        if !is_iso_date(self.expiration_date.as_str()) {
            return Err(WarehouseError::InvalidRecord(format!(
                "expiration '{}' is not YYYY-MM-DD",
                self.expiration_date
            )));
        }
        if !self.strike_price.is_finite() || self.strike_price <= 0.0 {
            return Err(WarehouseError::InvalidRecord(format!(
                "strike {} must be a positive number",
                self.strike_price
            )));
        }
        if !self.observed_at.get(..10).is_some_and(is_iso_date) {
            return Err(WarehouseError::InvalidRecord(format!(
                "observed_at '{}' is not a timestamp",
                self.observed_at
            )));
        }
        Ok(())
    }
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

/// Outcome of writing one ticker's chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    /// Rows written to `option_contracts` after de-duplication.
    pub written: usize,
    /// New rows appended to `option_observations`.
    pub history_appended: usize,
}

/// Filters for reading contracts back out of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractQuery {
    pub tickers: Vec<String>,
    pub option_type: Option<OptionKind>,
    /// Inclusive lower expiration bound, `YYYY-MM-DD`.
    pub expiration_from: Option<String>,
    /// Inclusive upper expiration bound, `YYYY-MM-DD`.
    pub expiration_to: Option<String>,
    pub min_premium: Option<f64>,
    pub max_premium: Option<f64>,
    /// Maximum `|strike - spot| / spot`; rows without a spot price are
    /// excluded when set.
    pub max_strike_distance: Option<f64>,
    pub limit: usize,
}

impl Default for ContractQuery {
    fn default() -> Self {
        Self {
            tickers: Vec::new(),
            option_type: None,
            expiration_from: None,
            expiration_to: None,
            min_premium: None,
            max_premium: None,
            max_strike_distance: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl ContractQuery {
    /// Reject filters that cannot match anything or are malformed.
    pub fn validate(&self) -> Result<(), WarehouseError> {
        if self.limit == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "limit must be greater than zero",
            )));
        }
        for bound in [&self.expiration_from, &self.expiration_to]
            .into_iter()
            .flatten()
        {
            if !is_iso_date(bound) {
                return Err(WarehouseError::QueryRejected(format!(
                    "expiration bound '{bound}' is not YYYY-MM-DD"
                )));
            }
        }
        if let (Some(from), Some(to)) = (&self.expiration_from, &self.expiration_to) {
            if from > to {
                return Err(WarehouseError::QueryRejected(format!(
                    "expiration range starts after it ends ({from} > {to})"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_premium, self.max_premium) {
            if min > max {
                return Err(WarehouseError::QueryRejected(format!(
                    "min premium {min} exceeds max premium {max}"
                )));
            }
        }
        if self.max_strike_distance.is_some_and(|value| value < 0.0) {
            return Err(WarehouseError::QueryRejected(String::from(
                "max strike distance must not be negative",
            )));
        }
        Ok(())
    }
}

/// A contract row as returned by [`crate::Warehouse::query_contracts`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractRow {
    pub ticker: String,
    pub contract_symbol: String,
    pub expiration_date: String,
    pub strike_price: f64,
    pub option_type: OptionKind,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub implied_volatility: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub underlying_price: Option<f64>,
    pub observed_at: String,
    pub premium: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread: Option<f64>,
    pub strike_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpirationBounds {
    pub earliest: String,
    pub latest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumBounds {
    pub min: f64,
    pub max: f64,
}

/// Per-ticker ingest counters from `vw_ingest_summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ticker: String,
    pub ok_count: i64,
    pub failed_count: i64,
    pub last_attempt: Option<String>,
}
