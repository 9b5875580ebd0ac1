//! MGNREGA Dash - district employment statistics for the dashboard
//!
//! Serves district-wise MGNREGA performance from data.gov.in through a local
//! SQLite cache that keeps answering when the upstream API does not.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mgnrega_dash::cache::{stale_cutoff, CacheStore};
use mgnrega_dash::cli::{Cli, Command};
use mgnrega_dash::config::Config;
use mgnrega_dash::data::{DistrictId, MetricsSource, UpstreamClient};
use mgnrega_dash::resolver::{ResolveError, Resolver};
use mgnrega_dash::server::{build_router, AppState};

/// Exit status for `resolve` when nothing can be served
const EXIT_NO_DATA: u8 = 2;

/// Logs go to stderr so `resolve` output stays machine-readable
fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn serve(
    config: &Config,
    resolver: Arc<Resolver>,
    upstream: Arc<UpstreamClient>,
) -> Result<(), Box<dyn Error>> {
    let state = AppState {
        resolver,
        upstream,
        catalog_path: config.catalog_path.clone(),
    };
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn resolve_once(
    resolver: &Resolver,
    district: &DistrictId,
) -> Result<ExitCode, Box<dyn Error>> {
    match resolver.resolve(district).await {
        Ok(resolution) => {
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ ResolveError::NoDataAvailable { .. }) => {
            eprintln!("{e}");
            Ok(ExitCode::from(EXIT_NO_DATA))
        }
        Err(e) => Err(e.into()),
    }
}

async fn list_stale(store: &CacheStore, window: Duration) -> Result<(), Box<dyn Error>> {
    let cutoff = stale_cutoff(Utc::now(), window);
    for (district, last_updated) in store.stale_districts(cutoff).await? {
        println!("{district}\t{}", last_updated.to_rfc3339());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.apply(Config::from_env());
    init_tracing(config.log_json);

    if !config.has_api_key() {
        info!("DATA_GOV_API_KEY not set, fetches will serve synthetic data");
    }

    let store = CacheStore::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "cache opened");

    let upstream = Arc::new(UpstreamClient::new(&config)?);
    let source: Arc<dyn MetricsSource> = upstream.clone();
    let resolver = Arc::new(Resolver::new(&config, store.clone(), source));

    match cli.command() {
        Command::Serve => {
            serve(&config, resolver, upstream).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Resolve { district } => resolve_once(&resolver, &district).await,
        Command::Stale { older_than_hours } => {
            let window = older_than_hours
                .map(|h| Duration::hours(i64::from(h)))
                .unwrap_or(config.freshness_window);
            list_stale(&store, window).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
