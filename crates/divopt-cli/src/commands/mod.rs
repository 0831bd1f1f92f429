mod dashboard;
mod fetch;
mod init;
mod query;
mod universe;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use divopt_core::{
    DividendSource, FileUniverse, HttpClient, IndexUniverse, ReqwestHttpClient, UniverseSource,
    YahooDividendSource,
};
use serde::Serialize;

use crate::cli::{Cli, Command, DbArgs, UniverseFlags};
use crate::config::AppConfig;
use crate::error::CliError;

pub async fn run(cli: &Cli, config: &AppConfig) -> Result<(), CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(args, config, &cli.secrets).await,
        Command::Universe(args) => universe::run(args, config).await,
        Command::Query(args) => query::run(args, config).await,
        Command::Dashboard(args) => dashboard::run(args, config).await,
        Command::Init(args) => init::run(args, config),
    }
}

/// Database path from the flag or `DIVOPT_DB`, else the config file.
fn db_path(args: &DbArgs, config: &AppConfig) -> PathBuf {
    args.db.clone().unwrap_or_else(|| config.fetch.db_path.clone())
}

fn threshold(flags: &UniverseFlags, config: &AppConfig) -> Result<f64, CliError> {
    let value = flags.threshold.unwrap_or(config.universe.threshold);
    Ok(divopt_core::validate_threshold(value)?)
}

/// Ticker file when one is configured, otherwise the index constituents list.
/// Both are enriched with dividend data from Yahoo Finance.
fn universe_source(
    flags: &UniverseFlags,
    config: &AppConfig,
    http: Arc<dyn HttpClient>,
) -> Arc<dyn UniverseSource> {
    let dividends: Arc<dyn DividendSource> = Arc::new(YahooDividendSource::new(Arc::clone(&http)));
    let tickers_file = flags
        .tickers_file
        .clone()
        .or_else(|| config.universe.tickers_file.clone());

    match tickers_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "using ticker file universe");
            Arc::new(FileUniverse::new(path).with_dividends(dividends))
        }
        None => {
            tracing::info!(url = %config.universe.constituents_url, "using index constituents universe");
            Arc::new(IndexUniverse::new(
                config.universe.constituents_url.clone(),
                http,
                dividends,
            ))
        }
    }
}

fn http_client() -> Result<Arc<dyn HttpClient>, CliError> {
    Ok(Arc::new(ReqwestHttpClient::new()?))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}
