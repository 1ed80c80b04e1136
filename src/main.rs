mod config;
mod control;
mod delivery;
mod publisher;
mod shutdown;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, PublisherConfig};
use control::{ControlChannel, RuntimeControl};
use delivery::DeliveryClient;
use publisher::PublisherLoop;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensorflow_shared::{PayloadCodec, SensorModel};
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = PublisherConfig::from_args(&args).context("Invalid configuration")?;

    info!("Sensor device starting: {}", config.identity.device_id);
    info!(
        "  Location: {}, {}",
        config.identity.coordinates.lat, config.identity.coordinates.lon
    );
    info!(
        "  Sensors: {}",
        config
            .sensors
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("  Tick interval: {:?}", config.timing.tick_interval);

    let (trigger, shutdown) = shutdown::channel();
    let _signal_handle = trigger.on_ctrl_c();

    // Control channel is the only writer of the runtime state
    let control = ControlChannel::new(Arc::new(RuntimeControl::new()));

    let transport = transport::connect(&config.transport, &config.identity.device_id, control.clone())
        .context("Failed to create transport")?;
    let delivery = DeliveryClient::new(transport, config.retry, config.probe, shutdown);

    let mut rng = match config.seed {
        Some(seed) => {
            info!("  RNG seed: {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };
    let models = config
        .sensors
        .iter()
        .cloned()
        .map(|spec| SensorModel::new(spec, config.strategy, &mut rng))
        .collect();

    let publisher = PublisherLoop::new(
        config.identity.clone(),
        models,
        rng,
        PayloadCodec::new(config.codec.clone()),
        delivery,
        control,
        config.timing,
    );

    match publisher.run().await {
        Ok(summary) => {
            info!("Sensor device stopped ({} messages published)", summary.published);
            Ok(())
        }
        Err(e) => {
            error!("Sensor device stopped: {}", e);
            Err(e)
        }
    }
}
