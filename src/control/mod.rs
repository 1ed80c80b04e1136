//! Remote runtime control for the publisher
//!
//! This module handles:
//! - The shared enabled/scale state read by the publishing loop
//! - Parsing control commands pushed over the message bus or pulled over HTTP
//! - Applying them as the single writer of that state

mod channel;
mod runtime;

pub use channel::ControlChannel;
pub use runtime::RuntimeControl;
