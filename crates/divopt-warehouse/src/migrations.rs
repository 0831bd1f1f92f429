use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_option_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS option_contracts (
    ticker TEXT NOT NULL,
    contract_symbol TEXT NOT NULL,
    expiration_date DATE NOT NULL,
    strike_price DOUBLE NOT NULL,
    option_type TEXT NOT NULL CHECK (option_type IN ('call', 'put')),
    bid DOUBLE,
    ask DOUBLE,
    last_price DOUBLE,
    volume BIGINT,
    open_interest BIGINT,
    implied_volatility DOUBLE,
    delta DOUBLE,
    gamma DOUBLE,
    theta DOUBLE,
    vega DOUBLE,
    underlying_price DOUBLE,
    observed_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(ticker, expiration_date, strike_price, option_type)
);

CREATE TABLE IF NOT EXISTS option_observations (
    ticker TEXT NOT NULL,
    contract_symbol TEXT NOT NULL,
    expiration_date DATE NOT NULL,
    strike_price DOUBLE NOT NULL,
    option_type TEXT NOT NULL CHECK (option_type IN ('call', 'put')),
    bid DOUBLE,
    ask DOUBLE,
    last_price DOUBLE,
    volume BIGINT,
    open_interest BIGINT,
    implied_volatility DOUBLE,
    delta DOUBLE,
    gamma DOUBLE,
    theta DOUBLE,
    vega DOUBLE,
    underlying_price DOUBLE,
    observed_at TIMESTAMP NOT NULL,
    PRIMARY KEY(ticker, expiration_date, strike_price, option_type, observed_at)
);

CREATE TABLE IF NOT EXISTS ingest_log (
    request_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    contracts BIGINT,
    latency_ms BIGINT,
    message TEXT,
    timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    // option_contracts carries no secondary index: DuckDB refuses INSERT OR
    // REPLACE on columns referenced by one.
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_option_observations_ticker_ts ON option_observations(ticker, observed_at);
CREATE INDEX IF NOT EXISTS idx_ingest_log_ticker_ts ON ingest_log(ticker, timestamp);
"#,
    },
];

/// Version of the newest migration; a read-only open checks for it.
pub const LATEST_MIGRATION: &str = "0002_indexes";

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        if is_applied(connection, migration.version)? {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [migration.version],
        )?;
        tracing::debug!(version = migration.version, "applied warehouse migration");
    }

    Ok(())
}

/// Whether a migration version has been recorded. Returns `false` when the
/// bookkeeping table itself does not exist yet.
pub fn is_applied(connection: &Connection, version: &str) -> Result<bool, ::duckdb::Error> {
    let table_count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'schema_migrations'",
        [],
        |row| row.get(0),
    )?;
    if table_count == 0 {
        return Ok(false);
    }

    let applied: i64 = connection.query_row(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
        [version],
        |row| row.get(0),
    )?;
    Ok(applied > 0)
}
