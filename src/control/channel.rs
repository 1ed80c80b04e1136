//! Control channel - parses remote commands and applies them

use super::runtime::{ControlSnapshot, RuntimeControl};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// A remote control command; absent fields leave the current value untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ControlCommand {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Reasons a control payload is discarded
#[derive(Error, Debug)]
pub enum ControlParseError {
    #[error("Invalid control payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scale factor must be finite and non-negative, got {0}")]
    InvalidScale(f64),
}

impl ControlCommand {
    /// Parse a JSON control payload; unknown fields are ignored
    pub fn parse(payload: &[u8]) -> Result<Self, ControlParseError> {
        let command: ControlCommand = serde_json::from_slice(payload)?;
        if let Some(scale) = command.scale {
            if !scale.is_finite() || scale < 0.0 {
                return Err(ControlParseError::InvalidScale(scale));
            }
        }
        Ok(command)
    }
}

/// Applies remote commands to the shared [`RuntimeControl`]
#[derive(Debug, Clone)]
pub struct ControlChannel {
    control: Arc<RuntimeControl>,
}

impl ControlChannel {
    /// Create a control channel writing to `control`
    pub fn new(control: Arc<RuntimeControl>) -> Self {
        Self { control }
    }

    /// The state this channel writes
    pub fn runtime(&self) -> Arc<RuntimeControl> {
        self.control.clone()
    }

    /// Apply a raw payload; malformed payloads are logged and ignored
    pub fn apply(&self, payload: &[u8]) -> Option<ControlSnapshot> {
        match ControlCommand::parse(payload) {
            Ok(command) => Some(self.apply_command(&command)),
            Err(e) => {
                warn!(
                    "[CONTROL] Ignoring control message: {} (payload: {})",
                    e,
                    String::from_utf8_lossy(payload)
                );
                None
            }
        }
    }

    /// Apply a parsed command and return the resulting state
    pub fn apply_command(&self, command: &ControlCommand) -> ControlSnapshot {
        if let Some(enabled) = command.enabled {
            let previous = self.control.set_enabled(enabled);
            if previous != enabled {
                info!(
                    "[CONTROL] Publishing {} via control channel",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
        }

        if let Some(scale) = command.scale {
            let previous = self.control.set_scale(scale);
            if previous != scale {
                info!("[CONTROL] Scale factor changed: {} -> {}", previous, scale);
            }
        }

        self.control.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ControlChannel {
        ControlChannel::new(Arc::new(RuntimeControl::new()))
    }

    #[test]
    fn test_parse_full_command() {
        let command = ControlCommand::parse(br#"{"enabled": false, "scale": 2.5}"#).unwrap();
        assert_eq!(
            command,
            ControlCommand {
                enabled: Some(false),
                scale: Some(2.5)
            }
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let command = ControlCommand::parse(br#"{"scale": 3, "mode": "turbo"}"#).unwrap();
        assert_eq!(command.scale, Some(3.0));
        assert_eq!(command.enabled, None);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(ControlCommand::parse(b"not json").is_err());
        assert!(ControlCommand::parse(br#"{"enabled": "yes"}"#).is_err());
        assert!(ControlCommand::parse(br#"{"scale": "2"}"#).is_err());
        assert!(ControlCommand::parse(br#"[true]"#).is_err());
        assert!(matches!(
            ControlCommand::parse(br#"{"scale": -1.0}"#),
            Err(ControlParseError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_apply_updates_runtime_state() {
        let channel = channel();
        let runtime = channel.runtime();

        let snapshot = channel.apply(br#"{"enabled": false}"#).unwrap();
        assert!(!snapshot.enabled);
        assert!(!runtime.is_enabled());
        assert_eq!(runtime.scale(), 1.0);

        channel.apply(br#"{"scale": 0.5}"#);
        assert_eq!(runtime.scale(), 0.5);
        assert!(!runtime.is_enabled());
    }

    #[test]
    fn test_bad_payload_leaves_state_untouched() {
        let channel = channel();
        channel.apply(br#"{"enabled": false, "scale": 4.0}"#);

        assert!(channel.apply(br#"{"enabled": 1}"#).is_none());
        assert!(channel.apply(b"{").is_none());

        let snapshot = channel.runtime().snapshot();
        assert!(!snapshot.enabled);
        assert_eq!(snapshot.scale, 4.0);
    }
}
