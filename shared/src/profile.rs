//! Built-in device profiles
//!
//! Each profile reproduces one of the simulated devices of the demo fleet:
//! its identity, location, sensor catalog and publishing cadence.

use crate::{ConfigError, Coordinates, SensorSpec};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Simulated device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// Bengaluru, three sensors with thresholds, 1 s ticks
    #[default]
    Rpi1,
    /// Delhi, five sensors without thresholds, 1.5 s ticks
    Rpi2,
    /// Mumbai, five sensors with thresholds, 2 s ticks
    Rpi3,
    /// Mumbai, same catalog as rpi3 with its own sensor names
    Rpi4,
}

impl DeviceProfile {
    pub fn device_id(&self) -> &'static str {
        match self {
            Self::Rpi1 => "rpi1",
            Self::Rpi2 => "rpi2",
            Self::Rpi3 => "rpi3",
            Self::Rpi4 => "rpi4",
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        match self {
            Self::Rpi1 => Coordinates::new(12.9716, 77.5946),
            Self::Rpi2 => Coordinates::new(28.7041, 77.1025),
            Self::Rpi3 | Self::Rpi4 => Coordinates::new(19.0760, 72.8777),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        match self {
            Self::Rpi1 => Duration::from_millis(1000),
            Self::Rpi2 => Duration::from_millis(1500),
            Self::Rpi3 | Self::Rpi4 => Duration::from_millis(2000),
        }
    }

    /// Sensor catalog of this device
    pub fn sensors(&self) -> Vec<SensorSpec> {
        match self {
            Self::Rpi1 => vec![
                SensorSpec::new("temperature", "°C", 20.0, 30.0).with_threshold(25.0),
                SensorSpec::new("humidity", "%", 40.0, 60.0).with_threshold(50.0),
                SensorSpec::new("pressure", "hPa", 980.0, 1020.0).with_threshold(1000.0),
            ],
            Self::Rpi2 => vec![
                SensorSpec::new("temperature2", "°C", 15.0, 35.0),
                SensorSpec::new("humidity2", "%", 30.0, 80.0),
                SensorSpec::new("pressure2", "hPa", 950.0, 1050.0),
                SensorSpec::new("light", "lux", 0.0, 1000.0),
                SensorSpec::new("co2", "ppm", 400.0, 2000.0),
            ],
            Self::Rpi3 => wide_catalog("3"),
            Self::Rpi4 => wide_catalog("4"),
        }
    }
}

fn wide_catalog(suffix: &str) -> Vec<SensorSpec> {
    vec![
        SensorSpec::new(format!("temperature{suffix}"), "°C", 18.0, 32.0).with_threshold(25.0),
        SensorSpec::new(format!("humidity{suffix}"), "%", 35.0, 75.0).with_threshold(55.0),
        SensorSpec::new(format!("pressure{suffix}"), "hPa", 960.0, 1040.0).with_threshold(1000.0),
        SensorSpec::new(format!("light{suffix}"), "lux", 0.0, 1200.0).with_threshold(600.0),
        SensorSpec::new(format!("co2{suffix}"), "ppm", 350.0, 2500.0).with_threshold(1200.0),
    ]
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.device_id())
    }
}

impl FromStr for DeviceProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rpi1" => Ok(Self::Rpi1),
            "rpi2" => Ok(Self::Rpi2),
            "rpi3" => Ok(Self::Rpi3),
            "rpi4" => Ok(Self::Rpi4),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}
