//! Upstream adapters.
//!
//! | Adapter | Trait | Upstream |
//! |---------|-------|----------|
//! | [`PolygonChainSource`] | [`crate::ChainSource`] | Polygon options chain snapshot |
//! | [`YahooDividendSource`] | [`crate::DividendSource`] | Yahoo Finance batch quotes |
//! | [`FileUniverse`] | [`crate::UniverseSource`] | Local ticker file |
//! | [`IndexUniverse`] | [`crate::UniverseSource`] | Index constituents CSV |

mod file;
mod index;
pub mod polygon;
pub mod yahoo;

pub use file::FileUniverse;
pub use index::{IndexUniverse, DEFAULT_CONSTITUENTS_URL};
pub use polygon::{PolygonChainSource, PolygonConfig};
pub use yahoo::YahooDividendSource;
