//! TCP reachability probe

use reqwest::Url;
use sensorflow_shared::timing;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Checks whether a host accepts TCP connections
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe for `host:port`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_millis(timing::PROBE_SOCKET_TIMEOUT_MS),
        }
    }

    /// Create a probe for the host and port of an HTTP URL
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(format!("{}:{}", host, port)))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Attempt one connection within the socket timeout
    pub async fn check(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("[PROBE] {} refused: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("[PROBE] {} timed out after {:?}", self.address, self.timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_check_target_from_url() {
        let url = Url::parse("http://localhost:9003/api/sensor-data").unwrap();
        assert_eq!(TcpProbe::from_url(&url).unwrap().address(), "localhost:9003");

        let url = Url::parse("https://example.com/ingest").unwrap();
        assert_eq!(TcpProbe::from_url(&url).unwrap().address(), "example.com:443");
    }

    #[tokio::test]
    async fn test_check_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(TcpProbe::new(addr.to_string()).check().await);

        drop(listener);
        assert!(!TcpProbe::new(addr.to_string()).check().await);
    }
}
