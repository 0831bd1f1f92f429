use std::path::PathBuf;

use divopt_warehouse::migrations::LATEST_MIGRATION;
use divopt_warehouse::{Warehouse, WarehouseConfig};
use serde::Serialize;

use crate::cli::InitArgs;
use crate::config::AppConfig;
use crate::error::CliError;

use super::{db_path, print_json};

#[derive(Debug, Serialize)]
struct InitOutput {
    db_path: PathBuf,
    schema_version: &'static str,
    contracts: usize,
}

pub fn run(args: &InitArgs, config: &AppConfig) -> Result<(), CliError> {
    let db = db_path(&args.db, config);
    let warehouse = Warehouse::open(WarehouseConfig::new(&db))?;
    let contracts = warehouse.contract_count()?;
    tracing::info!(db = %db.display(), schema = LATEST_MIGRATION, "warehouse ready");

    print_json(
        &InitOutput {
            db_path: db,
            schema_version: LATEST_MIGRATION,
            contracts,
        },
        false,
    )
}
