//! Outbound transport port.

use tracing::debug;

/// Publish-only view of the device transport (typically an MQTT client).
///
/// Publishing is fire-and-forget: a successful return means the message was
/// handed to the transport, not that a device received it.
pub trait Transport: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message could not be queued.
    fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError>;
}

/// Failure to hand a message to the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("failed to publish on `{topic}`")]
    Publish {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Transport used when no broker is configured: messages are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        debug!(topic, payload, "no transport configured, message dropped");
        Ok(())
    }
}
