use divopt_core::{Ticker, UniverseSelector};
use serde::Serialize;

use crate::cli::UniverseArgs;
use crate::config::AppConfig;
use crate::error::CliError;

use super::{http_client, print_json, threshold, universe_source};

#[derive(Debug, Serialize)]
struct UniverseOutput {
    source: &'static str,
    threshold: f64,
    count: usize,
    tickers: Vec<Ticker>,
}

pub async fn run(args: &UniverseArgs, config: &AppConfig) -> Result<(), CliError> {
    let threshold = threshold(&args.universe, config)?;
    let selector = UniverseSelector::new(universe_source(&args.universe, config, http_client()?));
    let tickers = selector.select(threshold).await?;

    print_json(
        &UniverseOutput {
            source: selector.source_id(),
            threshold,
            count: tickers.len(),
            tickers,
        },
        args.pretty,
    )
}
