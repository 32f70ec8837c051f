//! Inbound half of the MQTT connection.
//!
//! Drives the rumqttc event loop, (re)subscribes to every device state topic
//! on connection, asks devices to report their state, and routes incoming
//! publishes to [`Device::handle_state`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use glowhub_app::device::Device;
use glowhub_app::isolate::isolate;
use glowhub_app::registry::Registry;
use rumqttc::{Event, EventLoop, Packet, QoS, SubscribeFilter};
use tracing::{debug, info, warn};

use crate::transport::MqttTransport;

/// Pause before polling again after a connection error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Devices listening on each state topic.
pub type Routes = BTreeMap<String, Vec<Arc<dyn Device>>>;

/// Index the registry by state topic. Devices without one are left out.
#[must_use]
pub fn routes(registry: &Registry) -> Routes {
    let mut routes = Routes::new();
    for device in registry.devices() {
        if let Some(topic) = device.state_topic() {
            routes
                .entry(topic.to_string())
                .or_default()
                .push(device.clone());
        }
    }
    routes
}

/// Hand `payload` to every device listening on `topic`. Returns how many
/// devices received it.
pub fn route(routes: &Routes, topic: &str, payload: &[u8]) -> usize {
    let Some(devices) = routes.get(topic) else {
        debug!(topic, "no device listens on topic");
        return 0;
    };
    for device in devices {
        isolate("handle_state", device.name(), || device.handle_state(payload));
    }
    devices.len()
}

pub struct Inbound {
    event_loop: EventLoop,
    transport: MqttTransport,
}

impl Inbound {
    #[must_use]
    pub fn new(event_loop: EventLoop, transport: MqttTransport) -> Self {
        Self {
            event_loop,
            transport,
        }
    }

    /// Run forever. Connection errors are logged and retried after
    /// [`RECONNECT_DELAY`].
    pub async fn run(mut self, registry: Arc<Registry>) {
        let routes = routes(&registry);
        info!(topics = routes.len(), "mqtt inbound started");
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    info!(code = ?connack.code, "connected to broker");
                    Self::on_connected(&self.transport, &routes).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "state received");
                    route(&routes, &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("broker closed the connection");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "mqtt connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn on_connected(transport: &MqttTransport, routes: &Routes) {
        if routes.is_empty() {
            return;
        }
        let filters = routes
            .keys()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtMostOnce));
        if let Err(err) = transport.client().subscribe_many(filters).await {
            warn!(error = %err, "subscribing to state topics failed");
            return;
        }
        for device in routes.values().flatten() {
            match isolate("poll_value", device.name(), || device.poll_value(transport)) {
                Some(Err(err)) => warn!(device = %device.name(), error = %err, "poll failed"),
                Some(Ok(())) | None => {}
            }
        }
    }
}
