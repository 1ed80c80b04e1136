//! The publishing loop
//!
//! This module handles:
//! - Driving the Starting/Bursting/Steady/Paused lifecycle
//! - Advancing sensor models and framing readings for the transport
//! - Absorbing per-message failures so the simulation keeps running

mod frame;
mod runner;

pub use runner::{DeviceIdentity, LoopTiming, PublisherLoop};
