use clap::Parser;
use pinhole_generator::HashGenerator;
use pinhole_shortener::{Shortener, ShortenerService, CLI};
use pinhole_storage::factory;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CLI::try_parse()?;
    pinhole_telemetry::init(config.log_format)?;

    let backend_config = config.backend();
    info!(
        backend = %backend_config,
        sweep_interval_ms = config.sweep_interval_ms,
        "starting pinhole storage engine"
    );

    let backend = factory::open(&backend_config).await?;
    let service = ShortenerService::new(backend.store(), HashGenerator::default());
    service.ping().await?;

    let sweeper = backend.spawn_sweeper(config.sweeper_settings());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    Ok(())
}
