use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use divopt_core::{
    PolygonChainSource, PolygonConfig, RetryConfig, Scheduler, SchedulerConfig, ThrottleQuota,
    UniverseSelector, Warehouse, WarehouseConfig,
};
use divopt_web::AppState;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::cli::FetchArgs;
use crate::config::{self, AppConfig, PolygonSection};
use crate::error::CliError;

use super::{db_path, http_client, print_json, threshold, universe_source};

/// Budget used when neither `--run-for` nor `fetch.run_for_minutes` is set.
const UNBOUNDED: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub async fn run(args: &FetchArgs, config: &AppConfig, secrets: &Path) -> Result<(), CliError> {
    let api_key = config::api_key(secrets)?;
    let db = db_path(&args.db, config);
    let interval = config::minutes(
        "interval",
        args.interval.unwrap_or(config.fetch.interval_minutes),
    )?;
    let budget = match args.run_for.or(config.fetch.run_for_minutes) {
        Some(minutes) => config::minutes("run-for", minutes)?,
        None => UNBOUNDED,
    };
    let scheduler_config = SchedulerConfig {
        batch_size: args.batch_size.unwrap_or(config.fetch.batch_size),
        interval,
        threshold: threshold(&args.universe, config)?,
        retention: args.retention.map(Into::into).unwrap_or(config.fetch.retention),
    };
    scheduler_config.validate()?;

    let warehouse = Warehouse::open(WarehouseConfig::new(&db))?;
    let http = http_client()?;
    let chains = PolygonChainSource::new(polygon_config(api_key, &config.polygon), Arc::clone(&http));
    let selector = UniverseSelector::new(universe_source(&args.universe, config, http));
    let mut scheduler = Scheduler::new(
        selector,
        Arc::new(chains),
        Arc::new(warehouse.clone()),
        scheduler_config,
    )?;

    let dashboard = match args.serve {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            let state = AppState::new(warehouse.reader()).with_refresh_secs(config.dashboard.refresh_secs);
            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(divopt_web::serve(listener, state, async move {
                let _ = stopped.await;
            }));
            Some((stop, handle))
        }
        None => None,
    };

    tracing::info!(
        db = %db.display(),
        batch_size = scheduler_config.batch_size,
        interval_secs = interval.as_secs_f64(),
        retention = %scheduler_config.retention,
        "starting fetch loop"
    );
    let summary = tokio::select! {
        summary = scheduler.run(budget) => Some(summary),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; stopping fetch loop");
            None
        }
    };

    if let Some((stop, handle)) = dashboard {
        let _ = stop.send(());
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(%error, "dashboard server failed"),
            Err(error) => tracing::warn!(%error, "dashboard task panicked"),
        }
    }

    match summary {
        Some(summary) => print_json(&summary, false),
        None => Ok(()),
    }
}

fn polygon_config(api_key: String, section: &PolygonSection) -> PolygonConfig {
    PolygonConfig {
        base_url: section.base_url.clone(),
        page_limit: section.page_limit,
        max_pages: section.max_pages,
        timeout: Duration::from_secs(section.timeout_secs.max(1)),
        quota: ThrottleQuota::new(section.requests_per_minute, Duration::from_secs(60)),
        retry: RetryConfig::exponential(section.max_retries),
        ..PolygonConfig::new(api_key)
    }
}
