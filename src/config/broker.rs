use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Connection to the MQTT broker carrying device traffic.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Request queue size of the MQTT client and the inbound event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Pause between reconnect attempts after a connection error
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keep_alive_secs: default_keep_alive_secs(),
            clean_session: default_clean_session(),
            username: None,
            password: None,
            channel_capacity: default_channel_capacity(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(invalid("broker.host cannot be empty"));
        }
        if self.port == 0 {
            return Err(invalid("broker.port cannot be 0"));
        }
        // rumqttc rejects keep-alive intervals below 5 seconds
        if self.keep_alive_secs != 0 && self.keep_alive_secs < 5 {
            return Err(invalid(format!(
                "broker.keep_alive_secs {} must be 0 or at least 5",
                self.keep_alive_secs
            )));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("broker.channel_capacity must be > 0"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(invalid("broker.password requires broker.username"));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    1883
}
fn default_keep_alive_secs() -> u64 {
    10
}
fn default_clean_session() -> bool {
    true
}
fn default_channel_capacity() -> usize {
    100
}
fn default_reconnect_backoff_ms() -> u64 {
    1_000
}
