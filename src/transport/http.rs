//! HTTP transport: one POST per sensor record, device state pulled per tick

use super::error::DeliveryError;
use super::tcp::TcpProbe;
use super::traits::{Ack, TransportClient, WireLayout};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Url};
use sensorflow_shared::{timing, EncodedMessage};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Ingestion API settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Ingestion endpoint receiving one record per POST
    pub endpoint: String,
    /// API root serving `/device/{id}/state`; no state pull when absent
    pub api_base: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9003/api/sensor-data".into(),
            api_base: None,
            username: None,
            password: None,
            timeout: Duration::from_millis(timing::HTTP_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: Option<String>,
}

/// Body returned by the ingestion endpoint
#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    success: Option<bool>,
}

/// Posts records to an HTTP ingestion API
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    state_url: Option<String>,
    auth: Option<BasicAuth>,
    probe: TcpProbe,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig, device_id: &str) -> Result<Self> {
        let url = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", config.endpoint))?;
        let probe = TcpProbe::from_url(&url)
            .ok_or_else(|| anyhow!("API endpoint has no host: {}", config.endpoint))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let state_url = config.api_base.as_ref().map(|base| {
            format!("{}/device/{}/state", base.trim_end_matches('/'), device_id)
        });

        let auth = config.username.as_ref().map(|username| BasicAuth {
            username: username.clone(),
            password: config.password.clone(),
        });

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            state_url,
            auth,
            probe,
        })
    }

    pub fn state_url(&self) -> Option<&str> {
        self.state_url.as_deref()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => request.basic_auth(&auth.username, auth.password.as_ref()),
            None => request,
        }
    }
}

fn request_error(e: reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout
    } else if e.is_connect() {
        DeliveryError::Connect(e.to_string())
    } else {
        DeliveryError::Request(e.to_string())
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn publish(&self, target: &str, message: &EncodedMessage) -> Result<Ack, DeliveryError> {
        let request = self
            .client
            .post(target)
            .header(CONTENT_TYPE, message.content_type())
            .body(message.as_bytes().to_vec());

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DeliveryError::Server {
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        match serde_json::from_slice::<IngestResponse>(&body) {
            Ok(IngestResponse {
                success: Some(false),
            }) => {
                warn!(
                    "[HTTP] Server did not accept record: {}",
                    String::from_utf8_lossy(&body)
                );
            }
            Ok(_) => {}
            Err(e) => debug!("[HTTP] Unparsed response body: {}", e),
        }

        Ok(Ack::Accepted {
            status: status.as_u16(),
        })
    }

    async fn is_available(&self) -> bool {
        self.probe.check().await
    }

    async fn pull_control(&self) -> Option<Bytes> {
        let url = self.state_url.as_ref()?;
        let response = match self.authorize(self.client.get(url)).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("[HTTP] Device state fetch failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("[HTTP] Device state fetch returned {}", response.status());
            return None;
        }

        match response.bytes().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("[HTTP] Device state body unreadable: {}", e);
                None
            }
        }
    }

    fn layout(&self) -> WireLayout {
        WireLayout::Ingest {
            endpoint: self.endpoint.clone(),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
