//! SensorFlow Shared Types
//!
//! This crate provides the transport-independent core of the device
//! simulator: sensor catalog types, signal evolution, the payload codec and
//! the publisher state machine.

pub mod codec;
pub mod profile;
pub mod sensor;
pub mod state_machine;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use codec::{CipherKey, CodecError, CodecMode, EncodedMessage, PayloadCodec};
pub use profile::DeviceProfile;
pub use sensor::{EvolutionStrategy, Sample, SensorModel, SensorSpec, SensorState, SignalSmoother};
pub use state_machine::{PublisherEvent, PublisherState, PublisherStateMachine, TransitionResult};

/// Current UTC time as an RFC 3339 timestamp with microsecond precision
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Round a value to two decimal places for publishing
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Timing parameters for the publisher
pub mod timing {
    /// Number of burst iterations published on cold start
    pub const BURST_ITERATIONS: u32 = 5;

    /// Delay between burst iterations in milliseconds
    pub const BURST_INTERVAL_MS: u64 = 200;

    /// Control re-check interval while publishing is paused
    pub const PAUSE_POLL_MS: u64 = 200;

    /// Delay between server availability checks
    pub const PROBE_INTERVAL_MS: u64 = 2000;

    /// Availability checks before the publisher gives up
    pub const PROBE_MAX_ATTEMPTS: u32 = 5;

    /// Socket timeout for a single availability check
    pub const PROBE_SOCKET_TIMEOUT_MS: u64 = 2000;

    /// HTTP request timeout
    pub const HTTP_TIMEOUT_MS: u64 = 5000;

    /// First retry backoff, doubled on every further attempt
    pub const RETRY_INITIAL_BACKOFF_MS: u64 = 1000;

    /// Total HTTP delivery attempts (first try plus three retries)
    pub const HTTP_MAX_ATTEMPTS: u32 = 4;

    /// Largest per-tick step of the bounded random walk
    pub const WALK_STEP: f64 = 0.5;

    /// Bounds of the per-tick energy increment (before scaling)
    pub const ENERGY_STEP_MIN: f64 = 0.1;
    pub const ENERGY_STEP_MAX: f64 = 1.0;
}

/// Configuration problems detected before the publisher starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Sensor name must not be empty")]
    EmptySensorName,

    #[error("Duplicate sensor name: {0}")]
    DuplicateSensor(String),

    #[error("No sensors configured")]
    NoSensors,

    #[error("Invalid range for sensor {name}: min {min} must be below max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("Encryption key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Initialization vector must be {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Failed to load sensor catalog {path}: {reason}")]
    Catalog { path: String, reason: String },

    #[error("Unknown device profile: {0}")]
    UnknownProfile(String),
}

/// Geographic position reported with every reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single published data point: a sensor value or its paired energy counter
///
/// Serialized field order is part of the wire format; the sensor name is
/// carried by the topic, not the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(skip)]
    pub sensor: String,
    pub value: f64,
    pub timestamp: String,
    pub unit: String,
    pub device: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Unit of every energy reading
pub const ENERGY_UNIT: &str = "kWh";

impl Reading {
    /// Create the reading for a sensor's (already scaled) value
    pub fn sensor(
        spec: &SensorSpec,
        device: &str,
        coordinates: Coordinates,
        value: f64,
        timestamp: String,
    ) -> Self {
        Self {
            sensor: spec.name.clone(),
            value: round2(value),
            timestamp,
            unit: spec.unit.clone(),
            device: device.to_string(),
            coordinates,
            threshold: spec.threshold,
        }
    }

    /// Create the energy reading paired with a sensor
    pub fn energy(
        spec: &SensorSpec,
        device: &str,
        coordinates: Coordinates,
        energy: f64,
        timestamp: String,
    ) -> Self {
        Self {
            sensor: format!("{}/energy", spec.name),
            value: round2(energy),
            timestamp,
            unit: ENERGY_UNIT.to_string(),
            device: device.to_string(),
            coordinates,
            threshold: None,
        }
    }

    /// Whether this is an energy reading
    pub fn is_energy(&self) -> bool {
        self.sensor.ends_with("/energy")
    }

    /// Topic this reading is published on under `base_topic`
    pub fn topic(&self, base_topic: &str) -> String {
        format!("{}/{}", base_topic, self.sensor)
    }
}

/// Body of one HTTP ingestion request: a sensor reading with its energy value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    pub sensor_name: String,
    pub value: f64,
    pub timestamp: String,
    pub unit: String,
    pub device: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub energy: f64,
}

impl IngestRecord {
    /// Combine a sensor reading and its energy reading into one record
    pub fn new(reading: &Reading, energy: &Reading) -> Self {
        Self {
            sensor_name: reading.sensor.clone(),
            value: reading.value,
            timestamp: reading.timestamp.clone(),
            unit: reading.unit.clone(),
            device: reading.device.clone(),
            coordinates: reading.coordinates,
            threshold: reading.threshold,
            energy: energy.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature() -> SensorSpec {
        SensorSpec::new("temperature", "°C", 20.0, 30.0).with_threshold(25.0)
    }

    #[test]
    fn test_sensor_reading_creation() {
        let coords = Coordinates::new(12.9716, 77.5946);
        let reading = Reading::sensor(&temperature(), "rpi1", coords, 24.4567, now_iso());
        assert_eq!(reading.sensor, "temperature");
        assert_eq!(reading.value, 24.46);
        assert_eq!(reading.threshold, Some(25.0));
        assert!(!reading.is_energy());
        assert_eq!(reading.topic("sensorflow/demo"), "sensorflow/demo/temperature");
    }

    #[test]
    fn test_energy_reading_creation() {
        let coords = Coordinates::new(12.9716, 77.5946);
        let energy = Reading::energy(&temperature(), "rpi1", coords, 3.14159, now_iso());
        assert_eq!(energy.unit, ENERGY_UNIT);
        assert_eq!(energy.value, 3.14);
        assert!(energy.threshold.is_none());
        assert!(energy.is_energy());
        assert_eq!(
            energy.topic("sensorflow/demo"),
            "sensorflow/demo/temperature/energy"
        );
    }

    #[test]
    fn test_ingest_record_field_names() {
        let coords = Coordinates::new(19.076, 72.8777);
        let spec = temperature();
        let reading = Reading::sensor(&spec, "rpi3", coords, 22.0, "t".into());
        let energy = Reading::energy(&spec, "rpi3", coords, 1.5, "t".into());

        let json = serde_json::to_value(IngestRecord::new(&reading, &energy)).unwrap();
        assert_eq!(json["sensorName"], "temperature");
        assert_eq!(json["energy"], 1.5);
        assert_eq!(json["threshold"], 25.0);
        assert_eq!(json["coordinates"]["lat"], 19.076);
    }

    #[test]
    fn test_timestamp_is_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
