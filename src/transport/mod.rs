pub mod error;
pub mod http;
pub mod mqtt;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use error::DeliveryError;
pub use self::http::HttpConfig;
pub use mqtt::MqttConfig;
pub use traits::{Ack, TransportClient, WireLayout};

use self::http::HttpTransport;
use crate::control::ControlChannel;
use anyhow::Result;
use mqtt::MqttTransport;
use std::sync::Arc;
use tracing::info;

/// Which delivery backend to publish through
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Mqtt(MqttConfig),
    Http(HttpConfig),
}

/// Build the configured transport
///
/// Pushed control payloads (MQTT only) are applied through `control`.
pub fn connect(
    config: &TransportConfig,
    device_id: &str,
    control: ControlChannel,
) -> Result<Arc<dyn TransportClient>> {
    let transport: Arc<dyn TransportClient> = match config {
        TransportConfig::Mqtt(mqtt) => Arc::new(MqttTransport::connect(mqtt, device_id, control)),
        TransportConfig::Http(http) => {
            let transport = HttpTransport::new(http, device_id)?;
            info!("[HTTP] Posting records to {}", http.endpoint);
            if let Some(url) = transport.state_url() {
                info!("[HTTP] Polling device state from {}", url);
            }
            Arc::new(transport)
        }
    };
    Ok(transport)
}
