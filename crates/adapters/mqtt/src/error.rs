//! MQTT adapter error types.

use glowhub_app::ports::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("invalid MQTT configuration: {0}")]
    InvalidConfig(&'static str),

    /// The rumqttc request queue rejected the message.
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),
}

impl MqttError {
    /// Convert into a [`TransportError`] for the message sent on `topic`.
    #[must_use]
    pub fn into_transport(self, topic: &str) -> TransportError {
        TransportError::Publish {
            topic: topic.to_string(),
            source: Box::new(self),
        }
    }
}
