//! Shutdown signalling
//!
//! Every wait in the publisher (tick sleep, probe interval, retry backoff)
//! goes through [`Shutdown::sleep`] so an interrupt unblocks it promptly.

use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Sending half, owned by whoever observes the interrupt
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, cloned into every component that waits
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/listener pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Trigger shutdown on the first Ctrl-C
    pub fn on_ctrl_c(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("[SHUTDOWN] Interrupt received, stopping publisher...");
                self.trigger();
            }
        })
    }
}

impl Shutdown {
    /// Check if shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration` unless shutdown is requested first
    ///
    /// Returns `true` if the full duration elapsed, `false` if interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }

    /// Wait until shutdown is requested
    ///
    /// Never completes if the trigger is dropped without firing.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
