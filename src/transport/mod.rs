//! Pub/sub transport seam.
//!
//! The gateway publishes and subscribes through [`Transport`] and consumes
//! everything that comes back as [`TransportEvent`]s on an mpsc channel. The
//! broker itself is out of scope: [`MqttTransport`] talks to an external MQTT
//! broker, while a broker embedding the gateway can feed connection notices
//! straight into the same channel.

mod mqtt;

pub use mqtt::*;

#[cfg(test)]
mod mqtt_test;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message { topic: String, payload: Bytes },
    ClientConnected { client_id: String },
    ClientDisconnected { client_id: String },
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        payload: Bytes,
    ) -> Result<()>;

    async fn subscribe(
        &self,
        topic: &str,
        qos: u8,
    ) -> Result<()>;

    async fn unsubscribe(
        &self,
        topic: &str,
    ) -> Result<()>;

    /// Stops delivering events and releases the connection.
    async fn shutdown(&self) -> Result<()>;
}
