//! [`Transport`] implementation over a rumqttc client.

use glowhub_app::ports::{Transport, TransportError};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::trace;

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::inbound::Inbound;

/// Publishing half of the MQTT connection. Cheap to clone.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    #[must_use]
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    pub(crate) fn client(&self) -> &AsyncClient {
        &self.client
    }
}

impl Transport for MqttTransport {
    /// Messages are fire and forget: QoS 0, never retained.
    fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        trace!(topic, payload, "publishing");
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|err| MqttError::from(err).into_transport(topic))
    }
}

/// Create the client and its event loop. Nothing touches the network until
/// the returned [`Inbound`] runs.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttTransport, Inbound) {
    let (client, event_loop) = AsyncClient::new(options(config), config.request_capacity.max(1));
    let transport = MqttTransport::new(client);
    let inbound = Inbound::new(event_loop, transport.clone());
    (transport, inbound)
}

fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    options
}
