
use divopt_warehouse::ContractRecord;
use serde::{Deserialize, Serialize};

use crate::{CalendarDate, Symbol, UtcDateTime, ValidationError};

/// A dividend-paying company in the working universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    /// Trailing annual dividend yield as a fraction (`0.03` is 3%).
    pub dividend_yield: f64,
    pub ex_dividend_date: Option<CalendarDate>,
}

impl Ticker {
    pub fn new(
        symbol: Symbol,
        dividend_yield: f64,
        ex_dividend_date: Option<CalendarDate>,
    ) -> Result<Self, ValidationError> {
        let dividend_yield = ValidationError::require_finite("dividend_yield", dividend_yield)?;
        if dividend_yield < 0.0 {
            return Err(ValidationError::NegativeValue {
                field: "dividend_yield",
            });
        }
        Ok(Self {
            symbol,
            dividend_yield,
            ex_dividend_date,
        })
    }

    /// A ticker whose dividend data is not known yet.
    pub fn bare(symbol: Symbol) -> Self {
        Self {
            symbol,
            dividend_yield: 0.0,
            ex_dividend_date: None,
        }
    }
}

/// Contract side; the same type the warehouse stores.
pub use divopt_warehouse::OptionKind as OptionType;

/// Option sensitivities. `None` means the provider did not report the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

/// One listed option contract as observed in a chain snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: Symbol,
    /// Provider identifier, e.g. `O:KO260417C00060000`.
    pub contract_symbol: String,
    pub expiration: CalendarDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    pub implied_volatility: Option<f64>,
    pub greeks: Greeks,
    pub underlying_price: Option<f64>,
    pub observed_at: UtcDateTime,
}

impl OptionContract {
    /// Premium collected when writing the contract: the bid.
    pub fn premium(&self) -> Option<f64> {
        self.bid
    }

    /// Flatten into the row shape the warehouse stores.
    pub fn to_record(&self) -> ContractRecord {
        ContractRecord {
            ticker: self.underlying.to_string(),
            contract_symbol: self.contract_symbol.clone(),
            expiration_date: self.expiration.to_string(),
            strike_price: self.strike,
            option_type: self.option_type,
            bid: self.bid,
            ask: self.ask,
            last_price: self.last_price,
            volume: self.volume.map(saturating_i64),
            open_interest: self.open_interest.map(saturating_i64),
            implied_volatility: self.implied_volatility,
            delta: self.greeks.delta,
            gamma: self.greeks.gamma,
            theta: self.greeks.theta,
            vega: self.greeks.vega,
            underlying_price: self.underlying_price,
            observed_at: self.observed_at.to_storage_string(),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Every live contract for one underlying at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSnapshot {
    pub symbol: Symbol,
    pub observed_at: UtcDateTime,
    pub contracts: Vec<OptionContract>,
    /// Provider rows dropped for missing or malformed key fields.
    pub skipped: usize,
    pub pages: usize,
}

impl ChainSnapshot {
    pub fn records(&self) -> Vec<ContractRecord> {
        self.contracts.iter().map(OptionContract::to_record).collect()
    }
}
