use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::BrokerConfig;
use crate::Result;

/// Prometheus exporter served by the gateway process itself.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Where `/metrics` is served, e.g. `0.0.0.0:9464`.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl MonitoringConfig {
    /// The exporter must get a fixed port and must not collide with a broker
    /// running on the same host.
    pub fn validate(
        &self,
        broker: &BrokerConfig,
    ) -> Result<()> {
        if !self.metrics_enabled {
            return Ok(());
        }

        let port = self.metrics_addr.port();
        if port == 0 {
            return Err(invalid("metrics_addr needs an explicit port"));
        }
        if port == broker.port && is_local_host(&broker.host) {
            return Err(invalid(format!(
                "metrics_addr port {port} is taken by the local broker"
            )));
        }

        #[cfg(not(test))]
        {
            use std::net::TcpListener;
            if let Err(e) = TcpListener::bind(self.metrics_addr) {
                return Err(invalid(format!("metrics_addr {} unavailable: {}", self.metrics_addr, e)));
            }
        }

        Ok(())
    }
}

fn is_local_host(host: &str) -> bool {
    host == "localhost"
        || host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback() || ip.is_unspecified())
            .unwrap_or(false)
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}
