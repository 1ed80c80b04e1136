//! Transport trait abstraction for pluggable delivery backends

use super::error::DeliveryError;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use sensorflow_shared::EncodedMessage;

/// How readings are framed for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireLayout {
    /// One message per reading, addressed by `<base_topic>/<sensor>[/energy]`
    Topics { base_topic: String },
    /// One record per sensor carrying its energy value, posted to `endpoint`
    Ingest { endpoint: String },
}

/// Acknowledgement of a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Handed to the transport's outgoing queue
    Queued,
    /// Accepted by the server with the given status
    Accepted { status: u16 },
}

/// A delivery backend that can publish encoded messages
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Deliver one message to `target` (a topic or a URL)
    async fn publish(&self, target: &str, message: &EncodedMessage) -> Result<Ack, DeliveryError>;

    /// Single availability check of the delivery target
    async fn is_available(&self) -> bool;

    /// Fetch the latest control payload, for transports without a push channel
    async fn pull_control(&self) -> Option<Bytes> {
        None
    }

    /// Message framing this transport expects
    fn layout(&self) -> WireLayout;

    /// Release network resources
    async fn shutdown(&self) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
