//! Delivery error taxonomy

use thiserror::Error;

/// Errors that can occur while delivering one message
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Delivery rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Delivery target unreachable after {attempts} availability checks")]
    Unreachable { attempts: u32 },

    #[error("Interrupted by shutdown")]
    Interrupted,
}

impl DeliveryError {
    /// Transport-level failures and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Server { .. })
    }

    /// Whether publishing cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
