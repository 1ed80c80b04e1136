//! Delivery client wrapping a transport with probe and retry policies

use crate::shutdown::Shutdown;
use crate::transport::{Ack, DeliveryError, TransportClient, WireLayout};
use bytes::Bytes;
use sensorflow_shared::{timing, EncodedMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry budget for a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Policy for the HTTP ingestion API
    pub fn http() -> Self {
        Self {
            max_attempts: timing::HTTP_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(timing::RETRY_INITIAL_BACKOFF_MS),
        }
    }

    /// Single attempt, for transports with their own delivery queue
    pub fn fire_and_forget() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(timing::RETRY_INITIAL_BACKOFF_MS),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff * 2u32.pow(exponent)
    }
}

/// Availability probing budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(timing::PROBE_INTERVAL_MS),
            max_attempts: timing::PROBE_MAX_ATTEMPTS,
        }
    }
}

/// Sends encoded messages with retry, backoff and availability probing
pub struct DeliveryClient {
    transport: Arc<dyn TransportClient>,
    retry: RetryPolicy,
    probe: ProbePolicy,
    shutdown: Shutdown,
}

impl DeliveryClient {
    pub fn new(
        transport: Arc<dyn TransportClient>,
        retry: RetryPolicy,
        probe: ProbePolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            transport,
            retry,
            probe,
            shutdown,
        }
    }

    pub fn layout(&self) -> WireLayout {
        self.transport.layout()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Shutdown signal shared with the publisher
    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Latest pulled control payload, if the transport has one
    pub async fn pull_control(&self) -> Option<Bytes> {
        self.transport.pull_control().await
    }

    /// Poll the target until it answers or the probe budget runs out
    ///
    /// Returns the number of checks performed.
    pub async fn wait_for_server(&self) -> Result<u32, DeliveryError> {
        let max = self.probe.max_attempts;

        for attempt in 1..=max {
            if self.transport.is_available().await {
                info!(
                    "[DELIVERY] {} target available (check {}/{})",
                    self.transport.name(),
                    attempt,
                    max
                );
                return Ok(attempt);
            }

            if attempt < max {
                warn!(
                    "[DELIVERY] Target not available (check {}/{}), retrying in {:?}",
                    attempt, max, self.probe.interval
                );
                if !self.shutdown.sleep(self.probe.interval).await {
                    return Err(DeliveryError::Interrupted);
                }
            }
        }

        error!("[DELIVERY] Target unreachable after {} checks", max);
        Err(DeliveryError::Unreachable { attempts: max })
    }

    /// Deliver one message, retrying per policy
    ///
    /// A connection failure that survives all retries triggers an inline
    /// availability probe: if the target is back the message is dropped
    /// with the connection error, otherwise `Unreachable` is returned.
    /// A pending transport call is abandoned as soon as shutdown is requested.
    pub async fn send(&self, target: &str, message: &EncodedMessage) -> Result<Ack, DeliveryError> {
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Err(DeliveryError::Interrupted),
                result = self.transport.publish(target, message) => result,
            };

            match outcome {
                Ok(ack) => {
                    debug!("[DELIVERY] {} <- {} bytes ({:?})", target, message.len(), ack);
                    return Ok(ack);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "[DELIVERY] Attempt {}/{} to {} failed: {}, retrying in {:?}",
                        attempt, self.retry.max_attempts, target, e, delay
                    );
                    if !self.shutdown.sleep(delay).await {
                        return Err(DeliveryError::Interrupted);
                    }
                    attempt += 1;
                }
                Err(DeliveryError::Connect(reason)) => {
                    warn!(
                        "[DELIVERY] Connection to {} failed: {}, checking availability",
                        target, reason
                    );
                    self.wait_for_server().await?;
                    return Err(DeliveryError::Connect(reason));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release transport resources
    pub async fn shutdown(&self) {
        if let Err(e) = self.transport.shutdown().await {
            warn!("[DELIVERY] {} shutdown failed: {}", self.transport.name(), e);
        }
    }
}
