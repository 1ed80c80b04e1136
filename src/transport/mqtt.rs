//! MQTT transport: fire-and-forget publishing plus the pushed control topic

use super::error::DeliveryError;
use super::tcp::TcpProbe;
use super::traits::{Ack, TransportClient, WireLayout};
use crate::control::ControlChannel;
use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use sensorflow_shared::EncodedMessage;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub base_topic: String,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".into(),
            port: 1883,
            client_id: "sensorflow-rpi1".into(),
            base_topic: "sensorflow/demo".into(),
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Topic on which a device receives control commands
pub fn control_topic(base_topic: &str, device_id: &str) -> String {
    format!("{}/{}/control", base_topic, device_id)
}

/// Publishes over MQTT at QoS 0
pub struct MqttTransport {
    client: AsyncClient,
    base_topic: String,
    probe: TcpProbe,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Create the client and spawn its event loop
    ///
    /// Payloads arriving on the device's control topic are applied through
    /// `control` as they arrive. The event loop reconnects on its own and
    /// re-subscribes on every `ConnAck`.
    pub fn connect(config: &MqttConfig, device_id: &str, control: ControlChannel) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let topic = control_topic(&config.base_topic, device_id);

        info!(
            "[MQTT] Connecting to {}:{} as {}",
            config.host, config.port, config.client_id
        );

        let task_client = client.clone();
        let event_task = tokio::spawn(async move {
            run_event_loop(eventloop, task_client, topic, control).await;
        });

        Self {
            client,
            base_topic: config.base_topic.clone(),
            probe: TcpProbe::new(format!("{}:{}", config.host, config.port)),
            event_task: Mutex::new(Some(event_task)),
        }
    }
}

/// Requests buffered while the broker is unreachable
const REQUEST_QUEUE_CAPACITY: usize = 100;

/// Drive the MQTT connection until a disconnect is sent
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    control_topic: String,
    control: ControlChannel,
) {
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                if !handle_event(event, &client, &control_topic, &control) {
                    break;
                }
            }
            Err(e) => {
                warn!("[MQTT] Connection error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// React to one event loop notification; returns `false` once disconnected
fn handle_event(
    event: Event,
    client: &AsyncClient,
    control_topic: &str,
    control: &ControlChannel,
) -> bool {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => {
            info!("[MQTT] Connected, subscribing to {}", control_topic);
            if let Err(e) = client.try_subscribe(control_topic, QoS::AtMostOnce) {
                warn!("[MQTT] Subscribe to {} failed: {}", control_topic, e);
            }
        }
        Event::Incoming(Packet::Publish(publish)) => {
            if publish.topic == control_topic {
                control.apply(&publish.payload);
            } else {
                debug!("[MQTT] Ignoring message on {}", publish.topic);
            }
        }
        Event::Incoming(Packet::SubAck(_)) => {
            debug!("[MQTT] Subscription acknowledged");
        }
        Event::Outgoing(Outgoing::Publish(pkid)) => {
            debug!("[MQTT] Publish written to broker (pkid {})", pkid);
        }
        Event::Outgoing(Outgoing::Disconnect) => {
            info!("[MQTT] Disconnected");
            return false;
        }
        _ => {}
    }
    true
}

#[async_trait]
impl TransportClient for MqttTransport {
    /// Queue a QoS 0 publish; a full or closed request queue means the
    /// broker has stopped draining it
    async fn publish(&self, target: &str, message: &EncodedMessage) -> Result<Ack, DeliveryError> {
        self.client
            .try_publish(target, QoS::AtMostOnce, false, message.as_bytes().to_vec())
            .map_err(|e| DeliveryError::Connect(format!("request queue unavailable: {}", e)))?;
        Ok(Ack::Queued)
    }

    async fn is_available(&self) -> bool {
        self.probe.check().await
    }

    fn layout(&self) -> WireLayout {
        WireLayout::Topics {
            base_topic: self.base_topic.clone(),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            warn!("[MQTT] Disconnect failed: {}", e);
        }

        let task = self.event_task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(mut task) = task {
            if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
                debug!("[MQTT] Event loop did not stop in time, aborting");
                task.abort();
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RuntimeControl;
    use crate::delivery::{DeliveryClient, ProbePolicy, RetryPolicy};
    use crate::shutdown;
    use bytes::Bytes;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn control() -> ControlChannel {
        ControlChannel::new(Arc::new(RuntimeControl::new()))
    }

    fn config_for(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".into(),
            port,
            base_topic: "sensorflow/test".into(),
            ..Default::default()
        }
    }

    /// Port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Read one MQTT packet, returning its first header byte and body
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut length = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            length |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    /// Accept a client, answer its CONNECT and return its SUBSCRIBE body
    async fn accept_and_expect_subscribe(listener: &TcpListener) -> (TcpStream, Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (header, _) = read_packet(&mut stream).await;
        assert_eq!(header, 0x10, "expected CONNECT");
        stream.write_all(&CONNACK).await.unwrap();

        let (header, body) = read_packet(&mut stream).await;
        assert_eq!(header, 0x82, "expected SUBSCRIBE");
        (stream, body)
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x30, (2 + topic.len() + payload.len()) as u8];
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_control_topic() {
        assert_eq!(
            control_topic("sensorflow/demo", "rpi1"),
            "sensorflow/demo/rpi1/control"
        );
    }

    #[tokio::test]
    async fn test_transport_layout() {
        let transport = MqttTransport::connect(&config_for(closed_port().await), "rpi1", control());

        assert_eq!(transport.name(), "MQTT");
        assert_eq!(
            transport.layout(),
            WireLayout::Topics {
                base_topic: "sensorflow/test".into()
            }
        );
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_control_publish_is_applied() {
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("t", "127.0.0.1", 1), 10);
        let control = control();
        let topic = control_topic("sensorflow/test", "rpi1");

        let event = Event::Incoming(Packet::Publish(Publish::new(
            topic.as_str(),
            QoS::AtMostOnce,
            br#"{"enabled": false, "scale": 1.5}"#.to_vec(),
        )));
        assert!(handle_event(event, &client, &topic, &control));
        assert!(!control.runtime().is_enabled());
        assert_eq!(control.runtime().scale(), 1.5);

        let other = Event::Incoming(Packet::Publish(Publish::new(
            "sensorflow/test/rpi2/control",
            QoS::AtMostOnce,
            br#"{"enabled": true}"#.to_vec(),
        )));
        assert!(handle_event(other, &client, &topic, &control));
        assert!(!control.runtime().is_enabled());

        let connack = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert!(handle_event(connack, &client, &topic, &control));
        assert!(!handle_event(
            Event::Outgoing(Outgoing::Disconnect),
            &client,
            &topic,
            &control
        ));
    }

    #[tokio::test]
    async fn test_control_burst_keeps_latest_command() {
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("t", "127.0.0.1", 1), 10);
        let control = control();
        let topic = control_topic("sensorflow/test", "rpi1");

        for i in 1..=40 {
            let payload = format!(r#"{{"enabled": {}, "scale": {}}}"#, i % 2 == 0, i);
            let event = Event::Incoming(Packet::Publish(Publish::new(
                topic.as_str(),
                QoS::AtMostOnce,
                payload.into_bytes(),
            )));
            assert!(handle_event(event, &client, &topic, &control));
        }

        let snapshot = control.runtime().snapshot();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.scale, 40.0);
    }

    #[tokio::test]
    async fn test_resubscribes_after_every_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let control = control();
        let runtime = control.runtime();
        let transport = MqttTransport::connect(&config_for(port), "rpi1", control);
        let topic = control_topic("sensorflow/test", "rpi1");

        timeout(Duration::from_secs(10), async {
            let (mut stream, subscribe) = accept_and_expect_subscribe(&listener).await;
            assert!(contains(&subscribe, topic.as_bytes()));

            stream
                .write_all(&publish_packet(&topic, br#"{"enabled":false,"scale":3.0}"#))
                .await
                .unwrap();
            while runtime.is_enabled() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(runtime.scale(), 3.0);

            // Broker drops the connection; the client comes back and subscribes again
            drop(stream);
            let (_stream, subscribe) = accept_and_expect_subscribe(&listener).await;
            assert!(contains(&subscribe, topic.as_bytes()));
        })
        .await
        .expect("client did not reconnect and resubscribe");

        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_broker_never_blocks_publishing() {
        let transport = Arc::new(MqttTransport::connect(
            &config_for(closed_port().await),
            "rpi1",
            control(),
        ));
        let message = EncodedMessage::Json(Bytes::from_static(b"{}"));

        let failures = timeout(Duration::from_secs(5), async {
            let mut failures = 0;
            for _ in 0..300 {
                if let Err(e) = transport.publish("sensorflow/test/temperature", &message).await {
                    assert!(e.is_retryable());
                    failures += 1;
                }
            }
            failures
        })
        .await
        .expect("publish blocked on a full request queue");
        assert!(failures >= 300 - REQUEST_QUEUE_CAPACITY);

        // The delivery client turns the full queue into a failed re-check and a fatal error
        let (_trigger, shutdown) = shutdown::channel();
        let delivery = DeliveryClient::new(
            transport.clone(),
            RetryPolicy::fire_and_forget(),
            ProbePolicy {
                interval: Duration::from_millis(10),
                max_attempts: 2,
            },
            shutdown,
        );
        let result = timeout(
            Duration::from_secs(5),
            delivery.send("sensorflow/test/temperature", &message),
        )
        .await
        .expect("send blocked on a full request queue");
        assert_eq!(result, Err(DeliveryError::Unreachable { attempts: 2 }));

        timeout(Duration::from_secs(5), transport.shutdown())
            .await
            .expect("shutdown blocked")
            .unwrap();
    }
}
