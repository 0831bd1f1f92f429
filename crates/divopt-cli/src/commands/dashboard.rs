use divopt_warehouse::Warehouse;
use divopt_web::AppState;
use tokio::net::TcpListener;

use crate::cli::DashboardArgs;
use crate::config::AppConfig;
use crate::error::CliError;

use super::db_path;

pub async fn run(args: &DashboardArgs, config: &AppConfig) -> Result<(), CliError> {
    let db = db_path(&args.db, config);
    // Fail fast on a missing or uninitialized file, then release it for writers.
    drop(Warehouse::open_read_only(&db)?);
    let addr = args.addr.unwrap_or(config.dashboard.addr);
    let refresh_secs = args.refresh_secs.unwrap_or(config.dashboard.refresh_secs);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(db = %db.display(), url = %format!("http://{addr}/"), "serving dashboard");

    let state = AppState::per_request(&db).with_refresh_secs(refresh_secs);
    divopt_web::serve(listener, state, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await?;
    Ok(())
}
