use log::{error, info};
use std::sync::Arc;
use temperature_timescale::config::Config;
use temperature_timescale::simulation::driver::run_simulation;
use temperature_timescale::simulation::generator::GeneratorSettings;
use temperature_timescale::simulation::sender::UreqTransport;
use temperature_timescale::{env_file, logging, shutdown};
use tokio_util::sync::CancellationToken;

async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    info!(
        "Simulating {} room(s): target={}, interval={}s, retries={}, backoff_base={}",
        cfg.rooms.len(),
        cfg.api_url,
        cfg.data_interval.as_secs(),
        cfg.send_max_retries,
        cfg.send_backoff_base
    );

    let cancel = CancellationToken::new();
    shutdown::cancel_on_signal(cancel.clone());

    let transport = Arc::new(UreqTransport::new(cfg.send_timeout));
    let settings = GeneratorSettings::from_config(&cfg, None);
    let finished = run_simulation(transport, &cfg.rooms, settings, cancel).await;

    let total: u64 = finished.iter().map(|(_, sent)| sent).sum();
    info!("Simulation stopped after {} reading(s)", total);
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

    logging::init("temperature-simulator", loaded_env.as_ref());

    if let Err(e) = run().await {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}
