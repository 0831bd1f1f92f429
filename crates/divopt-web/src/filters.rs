//! Query-string filters shared by the HTML page and the JSON API.

use divopt_warehouse::{ContractQuery, OptionKind, DEFAULT_QUERY_LIMIT};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Upper bound on rows a single request may ask for.
pub const MAX_LIMIT: usize = 5_000;

/// Raw filter values as submitted by the dashboard form.
///
/// Every field is a string so that empty form inputs (`min_premium=`) mean
/// "no filter" instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFilters {
    /// Comma- or space-separated ticker list.
    pub tickers: Option<String>,
    /// `call`, `put`, or `both`.
    #[serde(rename = "type")]
    pub option_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub min_premium: Option<String>,
    pub max_premium: Option<String>,
    pub max_strike_distance: Option<String>,
    pub limit: Option<String>,
}

impl ContractFilters {
    pub fn to_query(&self) -> Result<ContractQuery, ApiError> {
        let tickers = present(&self.tickers)
            .map(|raw| {
                raw.split(|ch: char| ch == ',' || ch.is_whitespace())
                    .filter(|ticker| !ticker.is_empty())
                    .map(str::to_ascii_uppercase)
                    .collect()
            })
            .unwrap_or_default();

        let option_type = match present(&self.option_type) {
            None => None,
            Some(raw) if raw.eq_ignore_ascii_case("both") || raw.eq_ignore_ascii_case("all") => None,
            Some(raw) => Some(
                raw.parse::<OptionKind>()
                    .map_err(|error| ApiError::InvalidRequest(error.to_string()))?,
            ),
        };

        let limit = match present(&self.limit) {
            None => DEFAULT_QUERY_LIMIT,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ApiError::InvalidRequest(format!("limit must be a positive integer, got '{raw}'")))?
                .min(MAX_LIMIT),
        };

        let query = ContractQuery {
            tickers,
            option_type,
            expiration_from: present(&self.from).map(str::to_string),
            expiration_to: present(&self.to).map(str::to_string),
            min_premium: number("min_premium", &self.min_premium)?,
            max_premium: number("max_premium", &self.max_premium)?,
            max_strike_distance: number("max_strike_distance", &self.max_strike_distance)?,
            limit,
        };
        query
            .validate()
            .map_err(|error| ApiError::InvalidRequest(error.to_string()))?;
        Ok(query)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn number(field: &str, value: &Option<String>) -> Result<Option<f64>, ApiError> {
    present(value)
        .map(|raw| match raw.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(parsed),
            _ => Err(ApiError::InvalidRequest(format!("{field} must be a number, got '{raw}'"))),
        })
        .transpose()
}
