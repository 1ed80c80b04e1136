//! Resilient delivery over any transport
//!
//! This module handles:
//! - Pre-flight availability probing of the delivery target
//! - Retry with exponential backoff for retryable failures
//! - Re-probing inline when the connection drops mid-run

mod client;

pub use client::{DeliveryClient, ProbePolicy, RetryPolicy};
