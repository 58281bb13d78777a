use std::time::Duration;

// -
// Channels

pub const REGISTER: &str = "register";
pub const DEREGISTER: &str = "deregister";
pub const SCHEDULE: &str = "schedule";
pub const NOTIFY: &str = "notify";
pub const UPDATE: &str = "update";
pub const RESPONSE: &str = "response";
pub const PING: &str = "ping";
pub const LWT: &str = "lwt";
pub const REQUEST: &str = "request";
pub const ANNOUNCE: &str = "announce";

/// Client id that can never belong to a device: it routes gateway replies.
pub const RESERVED_CLIENT_ID: &str = RESPONSE;

/// Wildcard subscriptions that stay for the gateway's whole life, with QoS.
pub(crate) const CHANNEL_TOPICS: [(&str, u8); 8] = [
    ("register/#", 0),
    ("deregister/#", 0),
    ("schedule/#", 0),
    ("notify/#", 1),
    ("update/#", 1),
    ("response/#", 1),
    ("ping/#", 0),
    ("lwt/#", 0),
];

/// Only needed while the startup self-test runs.
pub(crate) const SELF_TEST_TOPICS: [(&str, u8); 2] = [("request/#", 0), ("announce/#", 0)];

pub(crate) const SELF_TEST_CHANNELS: [&str; 10] = [
    REGISTER, DEREGISTER, SCHEDULE, UPDATE, NOTIFY, RESPONSE, PING, REQUEST, ANNOUNCE, LWT,
];

pub(crate) const SELF_TEST_MESSAGE: &str = r#"{"test":"testme"}"#;

// -
// Transaction ids

/// Transaction ids wrap back to 1 after this value.
pub(crate) const MAX_TRANS_ID: u32 = 255;

// -
// Deadlines

/// Longest deadline a life checker will arm. Device lifetimes beyond it are
/// clamped.
pub(crate) const MAX_DEADLINE: Duration = Duration::from_secs(86400 * 365 * 30);

// -
// Database namespaces

/// Sled tree holding one JSON document per device
pub(crate) const DEVICE_TREE: &str = "_shepherd_devices";
