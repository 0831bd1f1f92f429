use divopt_warehouse::{ContractQuery, ContractRow, Warehouse, DEFAULT_QUERY_LIMIT};
use serde::Serialize;

use crate::cli::QueryArgs;
use crate::config::AppConfig;
use crate::error::CliError;

use super::{db_path, print_json};

#[derive(Debug, Serialize)]
struct QueryOutput {
    count: usize,
    contracts: Vec<ContractRow>,
}

pub async fn run(args: &QueryArgs, config: &AppConfig) -> Result<(), CliError> {
    let warehouse = Warehouse::open_read_only(db_path(&args.db, config))?;
    let contracts = warehouse.query_contracts(&contract_query(args))?;

    print_json(
        &QueryOutput {
            count: contracts.len(),
            contracts,
        },
        args.pretty,
    )
}

fn contract_query(args: &QueryArgs) -> ContractQuery {
    ContractQuery {
        tickers: args
            .tickers
            .iter()
            .map(|ticker| ticker.trim().to_ascii_uppercase())
            .filter(|ticker| !ticker.is_empty())
            .collect(),
        option_type: args.option_type.map(Into::into),
        expiration_from: args.from.clone(),
        expiration_to: args.to.clone(),
        min_premium: args.min_premium,
        max_premium: args.max_premium,
        max_strike_distance: args.max_strike_distance,
        limit: args.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
    }
}
