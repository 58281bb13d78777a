//! Gateway Error Hierarchy
//!
//! Defines the error types surfaced by the gateway, categorized by the layer
//! that produces them. Protocol-level outcomes that a device can observe
//! (`NotFound`, `BadRequest`, ...) are not errors here: they travel back to the
//! device as response codes. The variants below are what reaches Rust callers.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Protocol layer failures (addressing, decoding, correlation)
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Device record persistence failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Pub/sub transport failures
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed `oid/iid/rid` address string
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No response arrived before the request deadline
    #[error("Request {trans_id} to {client_id} timed out after {duration:?}")]
    Timeout {
        client_id: String,
        trans_id: u32,
        duration: Duration,
    },

    /// Payload failed structural decode on a channel that requires one
    #[error("Bad message on channel {channel} from {client_id}: {reason}")]
    BadMessage {
        channel: String,
        client_id: String,
        reason: String,
    },

    /// A (client id, transaction id) pair is already in flight
    #[error("Transaction {trans_id} for {client_id} is still pending")]
    DuplicateTransaction { client_id: String, trans_id: u32 },

    /// Every transaction id is currently in flight
    #[error("Transaction id space exhausted")]
    TransIdExhausted,

    /// The completion handle was dropped without a verdict
    #[error("Request {trans_id} to {client_id} was cancelled")]
    Cancelled { client_id: String, trans_id: u32 },

    /// Request arguments rejected before anything was published
    #[error("Invalid request argument: {0}")]
    InvalidArgument(String),

    /// Payload (de)serialization failures
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Embedded database errors
    #[error(transparent)]
    SledError(#[from] sled::Error),

    /// Persisted record could not be decoded
    #[error("Corrupted device record for {client_id}: {source}")]
    Corrupted {
        client_id: String,
        source: serde_json::Error,
    },

    /// Record could not be encoded for persistence
    #[error(transparent)]
    Encode(#[from] serde_json::Error),

    /// No record stored under the key
    #[error("Device record not found: {0}")]
    RecordNotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// MQTT client request queue failures
    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),

    /// MQTT connection failures while polling the event loop
    #[error(transparent)]
    Connection(#[from] rumqttc::ConnectionError),

    /// The transport event pump is gone
    #[error("Transport channel closed: {0}")]
    ChannelClosed(String),

    /// Self-test did not observe every echo in time
    #[error("Pub/sub self-test timed out after {0:?}")]
    SelfTestTimeout(Duration),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

impl Error {
    /// True when the error is a request deadline expiry, as opposed to a
    /// response the device actually sent.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::Timeout { .. }))
    }
}
