use anyhow::Context;
use log::{error, info};
use std::sync::Arc;
use temperature_timescale::api::{self, AppState};
use temperature_timescale::config::Config;
use temperature_timescale::db::migrations;
use temperature_timescale::db::store::{PgStore, StoreError};
use temperature_timescale::{env_file, logging, shutdown};

async fn run() -> anyhow::Result<()> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (app_name={}, debug={}, alignment_interval={}min, timezone={}, pool_size={})",
        cfg.app_name, cfg.debug, cfg.alignment_interval, cfg.timezone, cfg.database_pool_size
    );

    // 2) Connect DB and apply pending migrations
    let database_url = cfg.database_url.clone();
    let pool_size = cfg.database_pool_size;
    let store = tokio::task::spawn_blocking(move || -> Result<PgStore, StoreError> {
        let store = PgStore::connect(&database_url, pool_size)?;
        let mut conn = store.pool().get()?;
        migrations::apply(&mut conn)?;
        Ok(store)
    })
    .await?
    .context("database setup failed")?;
    info!("Connected to database");

    // 3) Serve until SIGINT/SIGTERM
    let listener = tokio::net::TcpListener::bind(&cfg.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_address))?;
    info!("Starting IoT temperature service on {}", listener.local_addr()?);

    let app = api::router(AppState::new(Arc::new(cfg), Arc::new(store)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    info!("Shutting down IoT temperature service");
    Ok(())
}

#[tokio::main]
async fn main() {
    let loaded_env = match env_file::load_from_args(std::env::args_os()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    logging::init("temperature-timescale", loaded_env.as_ref());

    if let Err(e) = run().await {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}
