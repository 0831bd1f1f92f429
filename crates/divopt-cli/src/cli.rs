//! CLI argument definitions for divopt.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Run the cycling options-chain fetch loop |
//! | `universe` | Print the dividend-filtered ticker universe |
//! | `query` | Query stored contracts |
//! | `dashboard` | Serve the read-only dashboard |
//! | `init` | Create the warehouse schema |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | TOML configuration file |
//! | `--secrets` | `.divopt/secrets.toml` | File holding `polygon_api_key` |
//! | `--log-level` | `info` | Log filter when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! # Walk the universe four tickers a minute for two hours
//! divopt fetch --db data/options.duckdb --interval 1 --run-for 120
//!
//! # Same, with the dashboard served from the fetch process
//! divopt fetch --serve 127.0.0.1:8501
//!
//! # Puts on KO expiring before June paying at least $0.50
//! divopt query --ticker KO --type put --to 2026-06-30 --min-premium 0.5
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use divopt_warehouse::{OptionKind, RetentionPolicy};

/// Options-chain poller and premium dashboard for dividend stocks.
#[derive(Debug, Parser)]
#[command(
    name = "divopt",
    author,
    version,
    about = "Options-chain poller and premium dashboard for dividend stocks",
    long_about = "divopt polls options-chain snapshots for dividend-paying index constituents \
on a fixed cadence, stores them in a local DuckDB file, and serves a read-only dashboard \
for finding attractive premiums.\n\
\n\
Use 'divopt <command> --help' for command-specific help."
)]
pub struct Cli {
    /// TOML configuration file with [fetch], [universe], [polygon] and [dashboard] sections.
    #[arg(long, global = true, env = "DIVOPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Secrets file holding `polygon_api_key`. `POLYGON_API_KEY` takes precedence.
    #[arg(long, global = true, default_value = ".divopt/secrets.toml")]
    pub secrets: PathBuf,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`, `divopt_core=trace`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the cycling fetch loop.
    ///
    /// Processes `--batch-size` tickers per `--interval`, wrapping to the
    /// first ticker after the last, until `--run-for` elapses or Ctrl-C.
    ///
    /// # Examples
    ///
    ///   divopt fetch --interval 1 --batch-size 4
    ///   divopt fetch --tickers-file tickers.txt --retention history --run-for 60
    Fetch(FetchArgs),

    /// Print the dividend-filtered ticker universe as JSON.
    Universe(UniverseArgs),

    /// Print stored contracts matching the filters as JSON.
    ///
    /// Rows are ordered by premium (bid) descending.
    Query(QueryArgs),

    /// Serve the read-only dashboard.
    ///
    /// Opens the database read-only, so it cannot run against a file a
    /// fetch process currently holds. Use `divopt fetch --serve` for that.
    Dashboard(DashboardArgs),

    /// Create the warehouse schema. Safe to run repeatedly.
    Init(InitArgs),
}

/// Database location shared by every command.
#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    /// DuckDB database file.
    #[arg(long, env = "DIVOPT_DB")]
    pub db: Option<PathBuf>,
}

/// Universe selection flags shared by `fetch` and `universe`.
#[derive(Debug, Clone, Args)]
pub struct UniverseFlags {
    /// Minimum trailing dividend yield as a fraction (0.025 = 2.5%).
    #[arg(long, env = "DIVOPT_THRESHOLD")]
    pub threshold: Option<f64>,

    /// Ticker file used instead of downloading index constituents.
    #[arg(long, env = "DIVOPT_TICKERS_FILE")]
    pub tickers_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub db: DbArgs,

    #[command(flatten)]
    pub universe: UniverseFlags,

    /// Minutes between batch starts.
    #[arg(long)]
    pub interval: Option<f64>,

    /// Tickers fetched per interval.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Wall-clock budget in minutes. Runs until interrupted when omitted.
    #[arg(long)]
    pub run_for: Option<f64>,

    /// Keep only the latest observation, or also append every observation.
    #[arg(long, value_enum)]
    pub retention: Option<RetentionArg>,

    /// Also serve the dashboard from this process on the given address.
    #[arg(long)]
    pub serve: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct UniverseArgs {
    #[command(flatten)]
    pub universe: UniverseFlags,

    /// Pretty-print JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Restrict to a ticker. Repeat for several.
    #[arg(long = "ticker")]
    pub tickers: Vec<String>,

    #[arg(long = "type", value_enum)]
    pub option_type: Option<OptionTypeArg>,

    /// Earliest expiration (YYYY-MM-DD, inclusive).
    #[arg(long)]
    pub from: Option<String>,

    /// Latest expiration (YYYY-MM-DD, inclusive).
    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub min_premium: Option<f64>,

    #[arg(long)]
    pub max_premium: Option<f64>,

    /// Maximum |strike - spot| / spot.
    #[arg(long)]
    pub max_strike_distance: Option<f64>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Pretty-print JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Listen address.
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// Page auto-refresh period in seconds (0 disables).
    #[arg(long)]
    pub refresh_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetentionArg {
    Latest,
    History,
}

impl From<RetentionArg> for RetentionPolicy {
    fn from(value: RetentionArg) -> Self {
        match value {
            RetentionArg::Latest => Self::Latest,
            RetentionArg::History => Self::History,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptionTypeArg {
    Call,
    Put,
}

impl From<OptionTypeArg> for OptionKind {
    fn from(value: OptionTypeArg) -> Self {
        match value {
            OptionTypeArg::Call => Self::Call,
            OptionTypeArg::Put => Self::Put,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "divopt",
            "fetch",
            "--db",
            "/tmp/options.duckdb",
            "--interval",
            "1",
            "--batch-size",
            "4",
            "--run-for",
            "30",
            "--retention",
            "history",
            "--serve",
            "127.0.0.1:8501",
        ])
        .expect("parse");

        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.db.db, Some(PathBuf::from("/tmp/options.duckdb")));
        assert_eq!(args.batch_size, Some(4));
        assert_eq!(args.retention, Some(RetentionArg::History));
        assert_eq!(args.serve.map(|addr| addr.port()), Some(8501));
        assert_eq!(cli.secrets, PathBuf::from(".divopt/secrets.toml"));
    }

    #[test]
    fn parses_repeated_query_tickers() {
        let cli = Cli::try_parse_from([
            "divopt", "query", "--ticker", "KO", "--ticker", "PEP", "--type", "put",
        ])
        .expect("parse");

        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.tickers, vec!["KO", "PEP"]);
        assert_eq!(args.option_type, Some(OptionTypeArg::Put));
    }
}
