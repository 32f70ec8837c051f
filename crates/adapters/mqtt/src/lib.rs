//! # glowhub-adapter-mqtt
//!
//! MQTT adapter: bridges zigbee2mqtt style devices into glowhub via rumqttc.
//!
//! ## Responsibilities
//! - Implement the [`Transport`](glowhub_app::ports::Transport) port so the
//!   scheduler can publish device commands
//! - Subscribe to every device state topic and ask devices to report their
//!   state once connected
//! - Route inbound state messages to the owning devices
//!
//! ## Dependency rule
//! Same as other adapters: depends on `glowhub-app` only.

pub mod config;
pub mod error;
pub mod inbound;
pub mod transport;

pub use config::MqttConfig;
pub use error::MqttError;
pub use inbound::Inbound;
pub use transport::{MqttTransport, connect};
