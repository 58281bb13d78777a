use bytes::Bytes;
use serde_json::Value;

use crate::DeviceAttrs;
use crate::DeviceStatus;

/// Internal notices fed back into the gateway event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A life checker deadline elapsed. `epoch` identifies the arming it
    /// belongs to.
    LifetimeExpired { client_id: String, epoch: u64 },
}

/// What the gateway tells the application.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Startup finished and the self-test passed.
    Ready,

    /// Join window countdown; `0` means the window closed.
    PermitJoining { remaining_secs: u64 },

    /// The transport reported a client connection.
    Connected { client_id: String },
    Disconnected { client_id: String },

    Registered { client_id: String },
    Deregistered { client_id: String },

    StatusChanged { client_id: String, status: DeviceStatus },

    /// Shadow changed under `path`; `data` holds only the changed leaves.
    ResourceUpdated { client_id: String, path: String, data: Value },

    /// Device attributes changed; only changed fields are set.
    DeviceUpdated { client_id: String, diff: DeviceAttrs },

    /// Observation report as the device sent it.
    Notified { client_id: String, path: String, data: Value },

    RequestTimedOut { client_id: String, trans_id: u32 },

    MalformedMessage { channel: String, client_id: String, reason: String },

    LastWill { client_id: String, data: Value },

    /// Traffic on a topic that no channel handler owns.
    UnhandledTopic { topic: String, payload: Bytes },
}
