use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::constants::RESERVED_CLIENT_ID;
use crate::Account;
use crate::Result;

/// Gateway identity and protocol timing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Client id the gateway uses on the transport; also its display name
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// How long a request waits for its response
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bound on the application's incoming device decision
    #[serde(default = "default_device_acceptance_timeout_ms")]
    pub device_acceptance_timeout_ms: u64,

    /// Bound on the startup pub/sub self-test
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Join window opened when the gateway becomes ready; 0 keeps it closed
    #[serde(default = "default_join_window_secs")]
    pub join_window_secs: u64,

    /// Slack added to a declared sleep duration before the device counts as offline
    #[serde(default = "default_sleep_grace_secs")]
    pub sleep_grace_secs: u64,

    /// Delay before a reconnecting known device is pinged and refreshed
    #[serde(default = "default_reconnect_maintain_delay_ms")]
    pub reconnect_maintain_delay_ms: u64,

    /// Capacity of the outward event broadcast
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Optional account every client may authenticate with
    #[serde(default)]
    pub default_account: Option<Account>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            request_timeout_ms: default_request_timeout_ms(),
            device_acceptance_timeout_ms: default_device_acceptance_timeout_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            join_window_secs: default_join_window_secs(),
            sleep_grace_secs: default_sleep_grace_secs(),
            reconnect_maintain_delay_ms: default_reconnect_maintain_delay_ms(),
            event_capacity: default_event_capacity(),
            default_account: None,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(invalid("gateway.client_id cannot be empty"));
        }
        if self.client_id == RESERVED_CLIENT_ID {
            return Err(invalid(format!(
                "gateway.client_id cannot be the reserved id '{RESERVED_CLIENT_ID}'"
            )));
        }
        if self.client_id.contains(['/', '+', '#']) {
            return Err(invalid(format!(
                "gateway.client_id '{}' must not contain topic separators or wildcards",
                self.client_id
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("gateway.request_timeout_ms must be > 0"));
        }
        if self.device_acceptance_timeout_ms == 0 {
            return Err(invalid("gateway.device_acceptance_timeout_ms must be > 0"));
        }
        if self.init_timeout_ms == 0 {
            return Err(invalid("gateway.init_timeout_ms must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("gateway.event_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn device_acceptance_timeout(&self) -> Duration {
        Duration::from_millis(self.device_acceptance_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn sleep_grace(&self) -> Duration {
        Duration::from_secs(self.sleep_grace_secs)
    }

    pub fn reconnect_maintain_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_maintain_delay_ms)
    }
}

fn default_client_id() -> String {
    "mqtt-shepherd".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_device_acceptance_timeout_ms() -> u64 {
    60_000
}
fn default_init_timeout_ms() -> u64 {
    100_000
}
fn default_join_window_secs() -> u64 {
    180
}
fn default_sleep_grace_secs() -> u64 {
    10
}
fn default_reconnect_maintain_delay_ms() -> u64 {
    2_000
}
fn default_event_capacity() -> usize {
    1024
}
