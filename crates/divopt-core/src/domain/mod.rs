//! # Domain Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, upper-cased ticker |
//! | [`Ticker`] | Universe member with dividend yield and ex-dividend date |
//! | [`OptionContract`] | One normalized contract from a chain snapshot |
//! | [`ChainSnapshot`] | All contracts observed for an underlying at one instant |
//! | [`Greeks`] | Delta, gamma, theta, vega; each independently optional |
//! | [`UtcDateTime`] / [`CalendarDate`] | Timestamps and plain dates |

mod models;
mod symbol;
mod timestamp;

pub use models::{ChainSnapshot, Greeks, OptionContract, OptionType, Ticker};
pub use symbol::Symbol;
pub use timestamp::{CalendarDate, UtcDateTime};
