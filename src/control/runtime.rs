//! Shared runtime control state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Point-in-time copy of the control state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    pub enabled: bool,
    pub scale: f64,
}

/// Process-wide publishing switch and value multiplier
///
/// Each field is replaced atomically and independently, so a reader never
/// needs a lock. Only [`ControlChannel`](super::ControlChannel) writes.
#[derive(Debug)]
pub struct RuntimeControl {
    enabled: AtomicBool,
    scale_bits: AtomicU64,
}

impl Default for RuntimeControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeControl {
    /// Enabled, with a scale of 1.0
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            scale_bits: AtomicU64::new(1.0f64.to_bits()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn scale(&self) -> f64 {
        f64::from_bits(self.scale_bits.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            enabled: self.is_enabled(),
            scale: self.scale(),
        }
    }

    pub(super) fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }

    pub(super) fn set_scale(&self, scale: f64) -> f64 {
        f64::from_bits(self.scale_bits.swap(scale.to_bits(), Ordering::AcqRel))
    }
}
