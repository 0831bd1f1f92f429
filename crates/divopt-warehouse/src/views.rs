//! Database views for the read side.

use ::duckdb::Connection;

/// Create database views used by contract queries.
///
/// Creates the following views:
/// - `vw_contract_metrics`: latest contracts with mid price, spread, and
///   relative strike distance from the underlying spot price
/// - `vw_ingest_summary`: per-ticker ingest success counts and last attempt
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_contract_metrics AS
SELECT
    *,
    bid AS premium,
    CASE
        WHEN bid IS NULL OR ask IS NULL THEN NULL
        ELSE (bid + ask) / 2.0
    END AS mid_price,
    CASE
        WHEN bid IS NULL OR ask IS NULL THEN NULL
        ELSE ask - bid
    END AS spread,
    CASE
        WHEN underlying_price IS NULL OR underlying_price <= 0 THEN NULL
        ELSE ABS(strike_price - underlying_price) / underlying_price
    END AS strike_distance
FROM option_contracts;

CREATE OR REPLACE VIEW vw_ingest_summary AS
SELECT
    ticker,
    COUNT(*) FILTER (WHERE status = 'ok') AS ok_count,
    COUNT(*) FILTER (WHERE status <> 'ok') AS failed_count,
    MAX(timestamp) AS last_attempt
FROM ingest_log
GROUP BY ticker;
",
    )?;

    Ok(())
}
