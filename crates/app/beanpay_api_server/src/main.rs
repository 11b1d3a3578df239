//! Beanpay API server binary.
//!
//! Connects to Postgres, applies migrations and serves the REST API until
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use beanpay_api::AppState;
use beanpay_api::config::ApiConfig;
use beanpay_core::auth::Authenticator;
use beanpay_core::clock::SystemClock;
use beanpay_core::store::PgStore;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "beanpay_api_server", about = "Beanpay API server")]
struct Args {
    /// Port to listen on. Overrides the port of `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "POSTGRES_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Browser origin allowed by CORS.
    #[arg(long, env = "APP_URL")]
    app_url: Option<String>,
}

/// How often abandoned refresh chains are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically delete refresh chains that are past the refresh window.
/// The task runs until the Tokio runtime shuts down.
fn spawn_chain_pruner(authenticator: Arc<Authenticator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(PRUNE_INTERVAL).await;
            if let Err(e) = authenticator.prune_expired_chains().await {
                error!(error = %e, "failed to prune expired refresh chains");
            }
        }
    })
}

/// Resolves on Ctrl-C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,beanpay_api=debug,beanpay_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(app_url) = args.app_url {
        config.app_url = app_url;
    }
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }

    info!(bind_addr = %config.bind_addr, app_url = %config.app_url, "starting beanpay_api_server");
    info!(max_connections = args.max_connections, "configuring connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    beanpay_api::migrate(&pool).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(Arc::new(PgStore::new(pool)), Arc::new(SystemClock), config);
    spawn_chain_pruner(state.authenticator.clone());
    let app = beanpay_api::router(state);

    info!(addr = %local_addr, "REST API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}
