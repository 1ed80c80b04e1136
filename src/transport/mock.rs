//! In-memory transport used by tests

use super::error::DeliveryError;
use super::traits::{Ack, TransportClient, WireLayout};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use sensorflow_shared::EncodedMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// Records every publish and plays back scripted failures
pub struct FakeTransport {
    layout: WireLayout,
    /// Availability check number (1-based) from which the target answers
    available_from: Option<u32>,
    /// Last availability check that still answers
    available_until: Option<u32>,
    /// Publishes never complete
    stalled: bool,
    checks: AtomicU32,
    attempts: AtomicU32,
    failures: Mutex<VecDeque<DeliveryError>>,
    control: Mutex<VecDeque<Bytes>>,
    published: Mutex<Vec<(String, EncodedMessage)>>,
    closed: AtomicBool,
}

impl FakeTransport {
    pub fn topics(base_topic: &str) -> Self {
        Self::with_layout(WireLayout::Topics {
            base_topic: base_topic.into(),
        })
    }

    pub fn ingest(endpoint: &str) -> Self {
        Self::with_layout(WireLayout::Ingest {
            endpoint: endpoint.into(),
        })
    }

    fn with_layout(layout: WireLayout) -> Self {
        Self {
            layout,
            available_from: Some(1),
            available_until: None,
            stalled: false,
            checks: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            failures: Mutex::new(VecDeque::new()),
            control: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Answer availability checks from the `n`th one on
    pub fn available_from(mut self, n: u32) -> Self {
        self.available_from = Some(n);
        self
    }

    /// Stop answering availability checks after the `n`th one
    pub fn available_until(mut self, n: u32) -> Self {
        self.available_until = Some(n);
        self
    }

    /// Make every publish hang
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Never answer availability checks
    pub fn unavailable(mut self) -> Self {
        self.available_from = None;
        self
    }

    /// Fail the next publishes with these errors, in order
    pub fn fail_with(self, errors: impl IntoIterator<Item = DeliveryError>) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    /// Queue a payload for the next `pull_control`
    pub fn push_control(&self, payload: &'static [u8]) {
        self.control
            .lock()
            .unwrap()
            .push_back(Bytes::from_static(payload));
    }

    pub fn published(&self) -> Vec<(String, EncodedMessage)> {
        self.published.lock().unwrap().clone()
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportClient for FakeTransport {
    async fn publish(&self, target: &str, message: &EncodedMessage) -> Result<Ack, DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.published
            .lock()
            .unwrap()
            .push((target.to_string(), message.clone()));
        Ok(Ack::Queued)
    }

    async fn is_available(&self) -> bool {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        let started = self.available_from.map_or(false, |from| n >= from);
        started && self.available_until.map_or(true, |until| n <= until)
    }

    async fn pull_control(&self) -> Option<Bytes> {
        self.control.lock().unwrap().pop_front()
    }

    fn layout(&self) -> WireLayout {
        self.layout.clone()
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Fake"
    }
}
