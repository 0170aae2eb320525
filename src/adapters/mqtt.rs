//! ESP-IDF MQTT transport.
//!
//! Owns the `EspMqttClient`. A dedicated poll thread drains the client's
//! event connection: connection events flip the shared flag, completed
//! messages are decoded by the ThingsBoard codec and pushed onto the
//! [`Inbox`] for the session loop. Messages that arrive while it is full
//! are dropped and counted; a shed RPC is answered `{"error":"busy"}` on
//! the next poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration, QoS,
};
use log::{debug, info, warn};

use crate::adapters::thingsboard;
use crate::app::commands::Inbound;
use crate::app::events::Outbound;
use crate::app::ports::{CloudTransport, Subscription};
use crate::config::BrokerConfig;
use crate::error::TransportError;
use crate::sync::channels::Inbox;
use crate::sync::rpc::RpcFault;

/// Slack on top of one firmware chunk for topic and MQTT framing.
const BUFFER_HEADROOM: usize = 512;
const CONNECT_POLL: Duration = Duration::from_millis(50);
const POLL_STACK_SIZE: usize = 6 * 1024;

pub struct MqttTransport {
    client_id: String,
    buffer_size: usize,
    connect_timeout: Duration,
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
    inbound: Arc<Inbox>,
}

impl MqttTransport {
    pub fn new(client_id: String, chunk_size: u16, connect_timeout_ms: u32) -> Self {
        Self {
            client_id,
            buffer_size: usize::from(chunk_size) + BUFFER_HEADROOM,
            connect_timeout: Duration::from_millis(u64::from(connect_timeout_ms)),
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
            inbound: Arc::new(Inbox::new()),
        }
    }

    fn spawn_poller(
        mut conn: EspMqttConnection,
        connected: Arc<AtomicBool>,
        inbound: Arc<Inbox>,
    ) -> Result<(), TransportError> {
        std::thread::Builder::new()
            .name("mqtt-poll".into())
            .stack_size(POLL_STACK_SIZE)
            .spawn(move || {
                while let Ok(event) = conn.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => connected.store(true, Ordering::Release),
                        EventPayload::Disconnected => connected.store(false, Ordering::Release),
                        EventPayload::Received {
                            topic: Some(topic),
                            data,
                            details: Details::Complete,
                            ..
                        } => deliver(&inbound, topic, data),
                        EventPayload::Received { .. } => {
                            debug!("MQTT: fragmented message dropped");
                        }
                        EventPayload::Error(e) => warn!("MQTT: {:?}", e),
                        _ => {}
                    }
                }
                connected.store(false, Ordering::Release);
                debug!("MQTT: event connection closed");
            })
            .map(|_| ())
            .map_err(|_| TransportError::ConnectFailed)
    }
}

fn deliver(inbound: &Inbox, topic: &str, data: &[u8]) {
    if let Some(message) = thingsboard::decode(topic, data) {
        inbound.push(message);
    }
}

impl CloudTransport for MqttTransport {
    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        // A stale client would keep reconnecting in the background.
        self.client = None;

        let url = broker.url();
        let conf = MqttClientConfiguration {
            client_id: Some(self.client_id.as_str()),
            username: Some(broker.token.as_str()),
            buffer_size: self.buffer_size,
            out_buffer_size: self.buffer_size,
            ..Default::default()
        };
        let (client, conn) = EspMqttClient::new(&url, &conf).map_err(|e| {
            warn!("MQTT: client init failed: {}", e);
            TransportError::ConnectFailed
        })?;

        let connected = Arc::new(AtomicBool::new(false));
        Self::spawn_poller(conn, Arc::clone(&connected), Arc::clone(&self.inbound))?;

        let mut waited = Duration::ZERO;
        while !connected.load(Ordering::Acquire) {
            if waited >= self.connect_timeout {
                return Err(TransportError::ConnectFailed);
            }
            std::thread::sleep(CONNECT_POLL);
            waited += CONNECT_POLL;
        }

        info!("MQTT: connected to {}", url);
        self.connected = connected;
        self.client = Some(client);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, subscription: Subscription) -> Result<(), TransportError> {
        let client = self.client.as_mut().ok_or(TransportError::Unavailable)?;
        let filter = thingsboard::subscription_filter(subscription);
        client
            .subscribe(filter, QoS::AtLeastOnce)
            .map(|_| debug!("MQTT: subscribed {}", filter))
            .map_err(|_| TransportError::SubscribeFailed)
    }

    fn send(&mut self, message: &Outbound) -> Result<(), TransportError> {
        let client = self.client.as_mut().ok_or(TransportError::Unavailable)?;
        let publication = thingsboard::encode(message)?;
        client
            .enqueue(&publication.topic, QoS::AtMostOnce, false, &publication.payload)
            .map(|_| ())
            .map_err(|_| TransportError::PublishFailed)
    }

    fn poll(&mut self) -> Option<Inbound> {
        while let Some(request_id) = self.inbound.take_shed_rpc() {
            let busy = Outbound::RpcResponse {
                request_id,
                body: RpcFault::Busy.into(),
            };
            if let Err(e) = self.send(&busy) {
                warn!("MQTT: busy reply to rpc {} failed: {}", request_id, e);
            }
        }
        self.inbound.pop()
    }
}
