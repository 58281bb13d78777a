use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::warn;

use super::JoinWindow;
use crate::codec::Command;
use crate::codec::ResourceAddress;
use crate::codec::RspCode;
use crate::constants::REQUEST;
use crate::dispatch::ReplyMsg;
use crate::dispatch::RequestMsg;
use crate::utils::scoped_timer::ScopedTimer;
use crate::Correlator;
use crate::Crypto;
use crate::DeviceAcceptor;
use crate::DeviceDirectory;
use crate::DeviceResponse;
use crate::GatewayConfig;
use crate::GatewayEvent;
use crate::ProtocolError;
use crate::Result;
use crate::Transport;

/// State shared by the event loop, the channel handlers and the public
/// gateway API.
pub struct GatewayContext {
    pub(crate) config: GatewayConfig,
    pub(crate) directory: Arc<DeviceDirectory>,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) crypto: Arc<dyn Crypto>,
    pub(crate) acceptor: Arc<dyn DeviceAcceptor>,
    pub(crate) events: broadcast::Sender<GatewayEvent>,
    pub(crate) join: JoinWindow,
    pub(crate) enabled: AtomicBool,
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("client_id", &self.config.client_id)
            .field("directory", &self.directory)
            .finish()
    }
}

impl GatewayContext {
    pub(crate) fn gateway_id(&self) -> &str {
        &self.config.client_id
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(
        &self,
        enabled: bool,
    ) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn emit(
        &self,
        event: GatewayEvent,
    ) {
        let _ = self.events.send(event);
    }

    /// JSON-encodes, encrypts for `client_id`, publishes.
    pub(crate) async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        qos: u8,
        client_id: &str,
        message: &T,
    ) -> Result<()> {
        let encoded = serde_json::to_vec(message).map_err(ProtocolError::Json)?;
        let payload = self.crypto.encrypt(client_id, Bytes::from(encoded))?;
        self.transport.publish(topic, qos, payload).await
    }

    /// Publishes `{transId, status}` on `<channel>/response/<clientId>`.
    pub(crate) async fn reply(
        &self,
        channel: &str,
        client_id: &str,
        trans_id: Option<u32>,
        status: RspCode,
    ) -> Result<()> {
        let topic = format!("{channel}/response/{client_id}");
        debug!(%client_id, %topic, status = status.code(), "reply");
        self.publish_json(
            &topic,
            0,
            client_id,
            &ReplyMsg {
                trans_id,
                status: status.code(),
            },
        )
        .await
    }

    /// Sends one correlated request to `request/<clientId>` and waits for the
    /// matching response.
    pub(crate) async fn request(
        &self,
        client_id: &str,
        cmd: Command,
        addr: Option<&ResourceAddress>,
        data: Option<Value>,
    ) -> Result<DeviceResponse> {
        let _timer = ScopedTimer::new(cmd.name(), client_id);

        let trans_id = self.correlator.allocate()?;
        let pending = self
            .correlator
            .send(client_id, trans_id, cmd, self.config.request_timeout())?;

        let message = RequestMsg {
            trans_id,
            cmd_id: cmd,
            oid: addr.map(|a| a.oid.clone()),
            iid: addr.and_then(|a| a.iid.clone()),
            rid: addr.and_then(|a| a.rid.clone()),
            data,
        };
        let topic = format!("{REQUEST}/{client_id}");
        if let Err(e) = self.publish_json(&topic, 0, client_id, &message).await {
            self.correlator.cancel(client_id, trans_id);
            return Err(e);
        }

        match pending.await {
            Err(e) if e.is_timeout() => {
                warn!(%client_id, trans_id, %cmd, "no response before deadline");
                self.emit(GatewayEvent::RequestTimedOut {
                    client_id: client_id.to_string(),
                    trans_id,
                });
                Err(e)
            }
            other => other,
        }
    }
}
