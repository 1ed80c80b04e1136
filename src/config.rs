//! Command-line and environment configuration
//!
//! Every flag can also be set through a `SENSORFLOW_*` environment variable.
//! All inputs are validated into a [`PublisherConfig`] before any network
//! activity starts.

use crate::delivery::{ProbePolicy, RetryPolicy};
use crate::publisher::{DeviceIdentity, LoopTiming};
use crate::transport::{HttpConfig, MqttConfig, TransportConfig};
use clap::{Parser, ValueEnum};
use sensorflow_shared::{
    timing, CipherKey, CodecMode, ConfigError, Coordinates, DeviceProfile, EvolutionStrategy,
    SensorSpec,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Mqtt,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Bounded random walk
    Walk,
    /// Exponential smoothing of uniform draws
    Smoothed,
    /// Fresh uniform draw every tick
    Uniform,
}

/// Simulated IoT sensor device
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Built-in device profile (rpi1, rpi2, rpi3, rpi4)
    #[arg(long, env = "SENSORFLOW_PROFILE", default_value = "rpi1")]
    pub profile: DeviceProfile,

    /// Override the profile's device id
    #[arg(long, env = "SENSORFLOW_DEVICE_ID")]
    pub device_id: Option<String>,

    /// Override the profile's latitude
    #[arg(long, env = "SENSORFLOW_LAT", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Override the profile's longitude
    #[arg(long, env = "SENSORFLOW_LON", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// TOML sensor catalog replacing the profile's sensors
    #[arg(long, env = "SENSORFLOW_SENSORS")]
    pub sensors_file: Option<PathBuf>,

    /// Delivery backend
    #[arg(long, env = "SENSORFLOW_TRANSPORT", value_enum, default_value = "mqtt")]
    pub transport: TransportKind,

    #[arg(long, env = "SENSORFLOW_BROKER_HOST", default_value = "broker.hivemq.com")]
    pub broker_host: String,

    #[arg(long, env = "SENSORFLOW_BROKER_PORT", default_value = "1883")]
    pub broker_port: u16,

    /// Topic prefix for data and control topics
    #[arg(long, env = "SENSORFLOW_BASE_TOPIC", default_value = "sensorflow/demo")]
    pub base_topic: String,

    /// MQTT client id (defaults to sensorflow-<device id>)
    #[arg(long, env = "SENSORFLOW_CLIENT_ID")]
    pub client_id: Option<String>,

    /// HTTP ingestion endpoint
    #[arg(
        long,
        env = "SENSORFLOW_API_ENDPOINT",
        default_value = "http://localhost:9003/api/sensor-data"
    )]
    pub api_endpoint: String,

    /// API root for device state polling (e.g. http://localhost:9003/api)
    #[arg(long, env = "SENSORFLOW_API_BASE")]
    pub api_base: Option<String>,

    #[arg(long, env = "SENSORFLOW_API_USER")]
    pub api_user: Option<String>,

    #[arg(long, env = "SENSORFLOW_API_PASSWORD", hide_env_values = true)]
    pub api_password: Option<String>,

    /// Encrypt payloads with AES-256-CBC
    #[arg(long, env = "SENSORFLOW_ENCRYPT")]
    pub encrypt: bool,

    /// 32-byte encryption key
    #[arg(long, env = "SENSORFLOW_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// 16-byte initialization vector
    #[arg(long, env = "SENSORFLOW_IV", hide_env_values = true)]
    pub iv: Option<String>,

    /// Value evolution strategy
    #[arg(long, env = "SENSORFLOW_STRATEGY", value_enum, default_value = "walk")]
    pub strategy: StrategyKind,

    /// Largest random-walk step per tick
    #[arg(long, env = "SENSORFLOW_STEP", default_value_t = timing::WALK_STEP)]
    pub step: f64,

    /// Exponential smoothing factor for the smoothed strategy
    #[arg(long, env = "SENSORFLOW_ALPHA", default_value = "0.1")]
    pub alpha: f64,

    /// Moving-average window applied after exponential smoothing
    #[arg(long, env = "SENSORFLOW_WINDOW")]
    pub window: Option<usize>,

    /// Override the profile's tick interval in milliseconds
    #[arg(long, env = "SENSORFLOW_TICK_MS")]
    pub tick_ms: Option<u64>,

    /// RNG seed for reproducible runs
    #[arg(long, env = "SENSORFLOW_SEED")]
    pub seed: Option<u64>,

    /// Availability checks before giving up
    #[arg(long, env = "SENSORFLOW_PROBE_ATTEMPTS", default_value_t = timing::PROBE_MAX_ATTEMPTS)]
    pub probe_attempts: u32,

    /// Total HTTP delivery attempts per message
    #[arg(long, env = "SENSORFLOW_RETRY_ATTEMPTS", default_value_t = timing::HTTP_MAX_ATTEMPTS)]
    pub retry_attempts: u32,
}

/// Sensor catalog file layout
#[derive(Debug, Deserialize)]
struct SensorCatalog {
    #[serde(rename = "sensor", default)]
    sensors: Vec<SensorSpec>,
}

/// Validated publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub identity: DeviceIdentity,
    pub sensors: Vec<SensorSpec>,
    pub strategy: EvolutionStrategy,
    pub codec: CodecMode,
    pub transport: TransportConfig,
    pub timing: LoopTiming,
    pub retry: RetryPolicy,
    pub probe: ProbePolicy,
    pub seed: Option<u64>,
}

impl PublisherConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let profile = args.profile;
        let device_id = args
            .device_id
            .clone()
            .unwrap_or_else(|| profile.device_id().to_string());
        if device_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting("device_id"));
        }

        let defaults = profile.coordinates();
        let coordinates = Coordinates::new(
            args.lat.unwrap_or(defaults.lat),
            args.lon.unwrap_or(defaults.lon),
        );
        validate_coordinates(coordinates)?;

        let sensors = match &args.sensors_file {
            Some(path) => load_catalog(path)?,
            None => profile.sensors(),
        };
        validate_sensors(&sensors)?;

        let strategy = match args.strategy {
            StrategyKind::Walk => EvolutionStrategy::RandomWalk { step: args.step },
            StrategyKind::Smoothed => EvolutionStrategy::Smoothed {
                alpha: args.alpha,
                window: args.window,
            },
            StrategyKind::Uniform => EvolutionStrategy::Uniform,
        };
        strategy.validate()?;

        let codec = if args.encrypt {
            let key = args.key.as_deref().ok_or(ConfigError::MissingSetting("key"))?;
            let iv = args.iv.as_deref().ok_or(ConfigError::MissingSetting("iv"))?;
            CodecMode::Encrypted(CipherKey::from_slices(key.as_bytes(), iv.as_bytes())?)
        } else {
            CodecMode::Plain
        };

        let tick_interval = match args.tick_ms {
            Some(0) => {
                return Err(ConfigError::InvalidSetting {
                    name: "tick_ms",
                    reason: "tick interval must be positive".into(),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => profile.tick_interval(),
        };

        if args.probe_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "probe_attempts",
                reason: "at least one availability check is required".into(),
            });
        }
        if args.retry_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "retry_attempts",
                reason: "at least one delivery attempt is required".into(),
            });
        }

        let (transport, retry) = match args.transport {
            TransportKind::Mqtt => {
                if args.base_topic.trim().is_empty() {
                    return Err(ConfigError::MissingSetting("base_topic"));
                }
                let mqtt = MqttConfig {
                    host: args.broker_host.clone(),
                    port: args.broker_port,
                    client_id: args
                        .client_id
                        .clone()
                        .unwrap_or_else(|| format!("sensorflow-{}", device_id)),
                    base_topic: args.base_topic.trim_end_matches('/').to_string(),
                    ..Default::default()
                };
                (TransportConfig::Mqtt(mqtt), RetryPolicy::fire_and_forget())
            }
            TransportKind::Http => {
                if args.api_endpoint.trim().is_empty() {
                    return Err(ConfigError::MissingSetting("api_endpoint"));
                }
                let http = HttpConfig {
                    endpoint: args.api_endpoint.clone(),
                    api_base: args.api_base.clone(),
                    username: args.api_user.clone(),
                    password: args.api_password.clone(),
                    ..Default::default()
                };
                let retry = RetryPolicy {
                    max_attempts: args.retry_attempts,
                    ..RetryPolicy::http()
                };
                (TransportConfig::Http(http), retry)
            }
        };

        Ok(Self {
            identity: DeviceIdentity {
                device_id,
                coordinates,
            },
            sensors,
            strategy,
            codec,
            transport,
            timing: LoopTiming::new(tick_interval),
            retry,
            probe: ProbePolicy {
                max_attempts: args.probe_attempts,
                ..ProbePolicy::default()
            },
            seed: args.seed,
        })
    }
}

/// Load a `[[sensor]]` catalog from a TOML file
pub fn load_catalog(path: &Path) -> Result<Vec<SensorSpec>, ConfigError> {
    let catalog_error = |reason: String| ConfigError::Catalog {
        path: path.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| catalog_error(e.to_string()))?;
    let catalog: SensorCatalog = toml::from_str(&text).map_err(|e| catalog_error(e.to_string()))?;
    Ok(catalog.sensors)
}

fn validate_sensors(sensors: &[SensorSpec]) -> Result<(), ConfigError> {
    if sensors.is_empty() {
        return Err(ConfigError::NoSensors);
    }

    let mut seen = HashSet::new();
    for spec in sensors {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateSensor(spec.name.clone()));
        }
    }
    Ok(())
}

fn validate_coordinates(coordinates: Coordinates) -> Result<(), ConfigError> {
    if !(-90.0..=90.0).contains(&coordinates.lat) {
        return Err(ConfigError::InvalidSetting {
            name: "lat",
            reason: format!("latitude {} out of range", coordinates.lat),
        });
    }
    if !(-180.0..=180.0).contains(&coordinates.lon) {
        return Err(ConfigError::InvalidSetting {
            name: "lon",
            reason: format!("longitude {} out of range", coordinates.lon),
        });
    }
    Ok(())
}
