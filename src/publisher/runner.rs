//! Publisher loop driving the lifecycle state machine

use super::frame::{frame, Outbound};
use crate::control::ControlChannel;
use crate::delivery::DeliveryClient;
use crate::shutdown::Shutdown;
use crate::transport::{DeliveryError, WireLayout};
use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use sensorflow_shared::state_machine::is_valid_transition;
use sensorflow_shared::{
    now_iso, timing, Coordinates, PayloadCodec, PublisherEvent, PublisherState,
    PublisherStateMachine, Reading, SensorModel, TransitionResult,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Identity stamped on every reading
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub coordinates: Coordinates,
}

/// Cadence of the publishing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub burst_iterations: u32,
    pub burst_interval: Duration,
    pub pause_poll: Duration,
    pub tick_interval: Duration,
}

impl LoopTiming {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            burst_iterations: timing::BURST_ITERATIONS,
            burst_interval: Duration::from_millis(timing::BURST_INTERVAL_MS),
            pause_poll: Duration::from_millis(timing::PAUSE_POLL_MS),
            tick_interval,
        }
    }
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Publishing rounds, burst iterations included
    pub ticks: u64,
    pub published: u64,
    pub encode_failures: u64,
    pub rejected: u64,
    pub failed: u64,
}

/// Generates readings for every sensor and hands them to the delivery client
pub struct PublisherLoop {
    identity: DeviceIdentity,
    models: Vec<SensorModel>,
    rng: StdRng,
    codec: PayloadCodec,
    delivery: DeliveryClient,
    control: ControlChannel,
    timing: LoopTiming,
    layout: WireLayout,
    shutdown: Shutdown,
    fsm: PublisherStateMachine,
    summary: RunSummary,
}

impl PublisherLoop {
    pub fn new(
        identity: DeviceIdentity,
        models: Vec<SensorModel>,
        rng: StdRng,
        codec: PayloadCodec,
        delivery: DeliveryClient,
        control: ControlChannel,
        timing: LoopTiming,
    ) -> Self {
        let layout = delivery.layout();
        let shutdown = delivery.shutdown_signal().clone();
        Self {
            identity,
            models,
            rng,
            codec,
            delivery,
            control,
            timing,
            layout,
            shutdown,
            fsm: PublisherStateMachine::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Run until interrupted or the delivery target is lost
    ///
    /// Transport resources are released on every exit path.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(
            "[PUBLISHER] {} publishing {} sensors via {} ({} payloads)",
            self.identity.device_id,
            self.models.len(),
            self.delivery.transport_name(),
            if self.codec.is_encrypted() { "encrypted" } else { "plain" }
        );

        let mut result = Ok(());
        while !self.fsm.is_stopped() {
            if let Err(e) = self.step().await {
                result = Err(e);
                break;
            }
        }

        self.delivery.shutdown().await;
        let summary = self.summary;
        info!(
            "[PUBLISHER] Stopped after {} rounds: {} published, {} encode failures, {} rejected, {} failed",
            summary.ticks, summary.published, summary.encode_failures, summary.rejected, summary.failed
        );

        result.map(|_| summary)
    }

    /// Run one phase of the current state and apply the resulting transition
    pub async fn step(&mut self) -> Result<PublisherState> {
        let event = if self.shutdown.is_triggered() {
            Some(PublisherEvent::Interrupted)
        } else {
            match self.fsm.state() {
                PublisherState::Starting => Some(self.start().await),
                PublisherState::Bursting => self.burst().await,
                PublisherState::Steady => self.tick().await,
                PublisherState::Paused => self.pause().await,
                PublisherState::Stopping => None,
            }
        };

        if let Some(event) = event {
            self.transition(event)?;
        }
        Ok(self.fsm.state())
    }

    fn transition(&mut self, event: PublisherEvent) -> Result<()> {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug_assert!(
                    is_valid_transition(from, to),
                    "state machine produced {} -> {}",
                    from,
                    to
                );
                if from != to {
                    info!("[PUBLISHER] {} -> {}", from, to);
                }
                Ok(())
            }
            TransitionResult::Invalid { from, event } => {
                debug!("[PUBLISHER] Ignoring {:?} while {}", event, from);
                Ok(())
            }
            TransitionResult::Fatal { reason } => {
                error!("[PUBLISHER] {}", reason);
                Err(anyhow!(reason))
            }
        }
    }

    async fn start(&mut self) -> PublisherEvent {
        match self.delivery.wait_for_server().await {
            Ok(_) => PublisherEvent::ServerAvailable,
            Err(DeliveryError::Interrupted) => PublisherEvent::Interrupted,
            Err(_) => PublisherEvent::ServerUnavailable,
        }
    }

    async fn burst(&mut self) -> Option<PublisherEvent> {
        info!(
            "[PUBLISHER] Initial burst of {} rounds",
            self.timing.burst_iterations
        );

        for _ in 0..self.timing.burst_iterations {
            let scale = self.control.runtime().scale();
            if let Some(event) = self.publish_round(scale).await {
                return Some(event);
            }
            if !self.shutdown.sleep(self.timing.burst_interval).await {
                return Some(PublisherEvent::Interrupted);
            }
        }
        Some(PublisherEvent::BurstComplete)
    }

    async fn tick(&mut self) -> Option<PublisherEvent> {
        self.sync_control().await;

        let snapshot = self.control.runtime().snapshot();
        if !snapshot.enabled {
            return Some(PublisherEvent::Disabled);
        }

        if let Some(event) = self.publish_round(snapshot.scale).await {
            return Some(event);
        }
        self.idle(self.timing.tick_interval).await
    }

    async fn pause(&mut self) -> Option<PublisherEvent> {
        self.sync_control().await;

        if self.control.runtime().is_enabled() {
            return Some(PublisherEvent::Enabled);
        }
        if !self.shutdown.sleep(self.timing.pause_poll).await {
            return Some(PublisherEvent::Interrupted);
        }
        None
    }

    /// Wait out the tick interval, waking early on disable or shutdown
    async fn idle(&self, duration: Duration) -> Option<PublisherEvent> {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = (deadline - now).min(self.timing.pause_poll);
            if !self.shutdown.sleep(slice).await {
                return Some(PublisherEvent::Interrupted);
            }
            if !self.control.runtime().is_enabled() {
                return Some(PublisherEvent::Disabled);
            }
        }
    }

    async fn sync_control(&self) {
        if let Some(payload) = self.delivery.pull_control().await {
            self.control.apply(&payload);
        }
    }

    /// Advance every model once and deliver the resulting readings in order
    async fn publish_round(&mut self, scale: f64) -> Option<PublisherEvent> {
        self.summary.ticks += 1;
        let timestamp = now_iso();

        let mut outbound = Vec::with_capacity(self.models.len() * 2);
        for model in &mut self.models {
            let sample = model.advance(&mut self.rng, scale);
            let spec = model.spec();
            let reading = Reading::sensor(
                spec,
                &self.identity.device_id,
                self.identity.coordinates,
                sample.value,
                timestamp.clone(),
            );
            let energy = Reading::energy(
                spec,
                &self.identity.device_id,
                self.identity.coordinates,
                sample.energy,
                timestamp.clone(),
            );
            outbound.extend(frame(&self.layout, &self.codec, &reading, &energy));
        }

        for message in outbound {
            if let Some(event) = self.dispatch(message).await {
                return Some(event);
            }
        }
        None
    }

    async fn dispatch(&mut self, outbound: Outbound) -> Option<PublisherEvent> {
        let message = match outbound.payload {
            Ok(message) => message,
            Err(e) => {
                warn!("[PUBLISHER] Encoding failed for {}: {}", outbound.target, e);
                self.summary.encode_failures += 1;
                return None;
            }
        };

        match self.delivery.send(&outbound.target, &message).await {
            Ok(_) => {
                self.summary.published += 1;
                None
            }
            Err(DeliveryError::Interrupted) => Some(PublisherEvent::Interrupted),
            Err(e) if e.is_fatal() => Some(PublisherEvent::TransportLost),
            Err(e @ DeliveryError::Rejected { .. }) => {
                warn!("[PUBLISHER] {} rejected: {}", outbound.target, e);
                self.summary.rejected += 1;
                None
            }
            Err(e) => {
                warn!("[PUBLISHER] Dropping message for {}: {}", outbound.target, e);
                self.summary.failed += 1;
                None
            }
        }
    }
}
