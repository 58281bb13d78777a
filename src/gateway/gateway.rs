//! Assembly and event loop of a running gateway.
//!
//! [`GatewayBuilder`] wires the directory, the correlator and the hooks into
//! a [`GatewayNode`]. The node owns every inbound stream and drives them from
//! one `select!` loop; [`Gateway`] is the cheap cloneable handle the
//! application talks to.
//!
//! ## Example
//! ```ignore
//! let (event_tx, event_rx) = mpsc::channel(config.broker.channel_capacity);
//! let transport = Arc::new(MqttTransport::connect(&config.gateway.client_id, &config.broker, event_tx));
//! let mut node = GatewayBuilder::new(config.gateway, transport, event_rx)
//!     .store(Arc::new(SledDeviceStore::open(&config.storage.db_path)?))
//!     .build();
//! node.start().await?;
//! let gateway = node.gateway();
//! tokio::spawn(async move { node.run(shutdown_rx).await });
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::GatewayContext;
use super::JoinWindow;
use crate::constants::CHANNEL_TOPICS;
use crate::constants::SELF_TEST_CHANNELS;
use crate::constants::SELF_TEST_MESSAGE;
use crate::constants::SELF_TEST_TOPICS;
use crate::utils::async_task::spawn_task;
use crate::AcceptAll;
use crate::Correlator;
use crate::Crypto;
use crate::DeviceAcceptor;
use crate::DeviceDirectory;
use crate::DeviceRecord;
use crate::DeviceResponse;
use crate::DeviceStatus;
use crate::DeviceStore;
use crate::Dispatcher;
use crate::GatewayConfig;
use crate::GatewayEvent;
use crate::IdentityCrypto;
use crate::LifecycleEvent;
use crate::MemDeviceStore;
use crate::OfflineOutcome;
use crate::Result;
use crate::RspCode;
use crate::Transport;
use crate::TransportError;
use crate::TransportEvent;

/// Snapshot returned by [`Gateway::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub name: String,
    pub enabled: bool,
    pub dev_num: usize,
    pub join_time_left: u64,
}

/// Application-facing handle.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub(crate) ctx: Arc<GatewayContext>,
}

impl Gateway {
    pub fn id(&self) -> &str {
        self.ctx.gateway_id()
    }

    pub fn info(&self) -> GatewayInfo {
        GatewayInfo {
            name: self.ctx.gateway_id().to_string(),
            enabled: self.ctx.is_enabled(),
            dev_num: self.ctx.directory.len(),
            join_time_left: self.ctx.join.remaining_secs(),
        }
    }

    /// Opens the join window for `secs` seconds, `0` closes it. Refused
    /// while the gateway is not running.
    pub fn permit_join(
        &self,
        secs: u64,
    ) -> bool {
        if !self.ctx.is_enabled() {
            warn!("permit_join refused: gateway not enabled");
            return false;
        }
        self.ctx.join.open(secs, self.ctx.events.clone());
        true
    }

    pub fn list(&self) -> Vec<DeviceRecord> {
        self.ctx.directory.list()
    }

    pub fn find(
        &self,
        client_id: &str,
    ) -> Option<DeviceRecord> {
        self.ctx.directory.lookup(client_id)
    }

    pub fn find_by_mac(
        &self,
        mac: &str,
    ) -> Vec<DeviceRecord> {
        self.ctx.directory.lookup_by_mac(mac)
    }

    /// Forgets a device as if it had deregistered.
    pub fn remove(
        &self,
        client_id: &str,
    ) -> Result<bool> {
        let removed = self.ctx.directory.remove(client_id)?.is_some();
        if removed {
            self.ctx.emit(GatewayEvent::Deregistered {
                client_id: client_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Drops every in-memory record and reloads from persistence; `hard`
    /// wipes persistence first.
    pub fn reset(
        &self,
        hard: bool,
    ) -> Result<usize> {
        info!(hard, "resetting device directory");
        self.ctx.correlator.cancel_all();
        self.ctx.directory.clear();
        if hard {
            self.ctx.directory.store().clear()?;
        }
        self.ctx.directory.load_from_store()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.ctx.events.subscribe()
    }

    pub async fn read_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        self.ctx.read_req(client_id, path).await
    }

    pub async fn write_req(
        &self,
        client_id: &str,
        path: &str,
        value: Value,
    ) -> Result<DeviceResponse> {
        self.ctx.write_req(client_id, path, value).await
    }

    pub async fn write_attrs_req(
        &self,
        client_id: &str,
        path: &str,
        attrs: Value,
    ) -> Result<DeviceResponse> {
        self.ctx.write_attrs_req(client_id, path, attrs).await
    }

    pub async fn discover_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        self.ctx.discover_req(client_id, path).await
    }

    pub async fn execute_req(
        &self,
        client_id: &str,
        path: &str,
        args: Option<Value>,
    ) -> Result<DeviceResponse> {
        self.ctx.execute_req(client_id, path, args).await
    }

    pub async fn observe_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        self.ctx.observe_req(client_id, path).await
    }

    pub async fn ping_req(
        &self,
        client_id: &str,
    ) -> Result<DeviceResponse> {
        self.ctx.ping_req(client_id).await
    }

    pub async fn identify_req(
        &self,
        client_id: &str,
    ) -> Result<DeviceResponse> {
        self.ctx.identify_req(client_id).await
    }

    pub async fn announce(
        &self,
        message: &str,
    ) -> Result<()> {
        self.ctx.announce(message).await
    }
}

/// Builds a [`GatewayNode`]. Store, crypto and acceptor default to
/// [`MemDeviceStore`], [`IdentityCrypto`] and [`AcceptAll`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Arc<dyn Transport>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    store: Option<Arc<dyn DeviceStore>>,
    crypto: Option<Arc<dyn Crypto>>,
    acceptor: Option<Arc<dyn DeviceAcceptor>>,
}

impl GatewayBuilder {
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            config,
            transport,
            transport_rx,
            store: None,
            crypto: None,
            acceptor: None,
        }
    }

    pub fn store(
        mut self,
        store: Arc<dyn DeviceStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn crypto(
        mut self,
        crypto: Arc<dyn Crypto>,
    ) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn acceptor(
        mut self,
        acceptor: Arc<dyn DeviceAcceptor>,
    ) -> Self {
        self.acceptor = Some(acceptor);
        self
    }

    pub fn build(self) -> GatewayNode {
        let store = self.store.unwrap_or_else(|| Arc::new(MemDeviceStore::new()));
        let crypto = self.crypto.unwrap_or_else(|| Arc::new(IdentityCrypto));
        let acceptor = self.acceptor.unwrap_or_else(|| Arc::new(AcceptAll));

        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_capacity);
        let directory = Arc::new(DeviceDirectory::new(
            store,
            lifecycle_tx,
            events.clone(),
            self.config.sleep_grace(),
        ));

        let ctx = Arc::new(GatewayContext {
            config: self.config,
            directory,
            correlator: Correlator::new(),
            transport: self.transport,
            crypto,
            acceptor,
            events,
            join: JoinWindow::default(),
            enabled: AtomicBool::new(false),
        });

        GatewayNode {
            dispatcher: Dispatcher::new(ctx.clone()),
            ctx,
            transport_rx: self.transport_rx,
            lifecycle_rx,
            backlog: Vec::new(),
        }
    }
}

/// Owns the inbound streams of one gateway.
pub struct GatewayNode {
    pub(crate) ctx: Arc<GatewayContext>,
    dispatcher: Dispatcher,
    transport_rx: mpsc::Receiver<TransportEvent>,
    lifecycle_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    /// Traffic that arrived while the self-test was running.
    backlog: Vec<TransportEvent>,
}

impl GatewayNode {
    pub fn gateway(&self) -> Gateway {
        Gateway { ctx: self.ctx.clone() }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Restores persisted devices, subscribes every channel, verifies the
    /// broker round trip and opens the join window.
    pub async fn start(&mut self) -> Result<()> {
        let restored = self.ctx.directory.load_from_store()?;
        debug!("{} devices restored before start", restored);

        for (topic, qos) in CHANNEL_TOPICS.iter().chain(SELF_TEST_TOPICS.iter()) {
            self.ctx.transport.subscribe(topic, *qos).await?;
        }

        self.self_test().await?;

        for (topic, _) in SELF_TEST_TOPICS {
            self.ctx.transport.unsubscribe(topic).await?;
        }

        self.ctx.set_enabled(true);
        self.ctx
            .join
            .open(self.ctx.config.join_window_secs, self.ctx.events.clone());
        info!(gateway = %self.ctx.gateway_id(), "gateway ready");
        self.ctx.emit(GatewayEvent::Ready);
        Ok(())
    }

    /// Publishes a probe on every `<channel>/response/<gatewayId>` and waits
    /// for all of them to come back.
    async fn self_test(&mut self) -> Result<()> {
        let gateway_id = self.ctx.gateway_id().to_string();
        let mut outstanding: BTreeSet<String> = SELF_TEST_CHANNELS
            .iter()
            .map(|channel| format!("{channel}/response/{gateway_id}"))
            .collect();

        for topic in &outstanding {
            self.ctx
                .transport
                .publish(topic, 0, Bytes::from_static(SELF_TEST_MESSAGE.as_bytes()))
                .await?;
        }

        let timeout = self.ctx.config.init_timeout();
        let deadline = Instant::now() + timeout;
        while !outstanding.is_empty() {
            let event = tokio::time::timeout_at(deadline, self.transport_rx.recv())
                .await
                .map_err(|_| TransportError::SelfTestTimeout(timeout))?;
            match event {
                Some(TransportEvent::Message { topic, payload })
                    if outstanding.contains(&topic) && payload.as_ref() == SELF_TEST_MESSAGE.as_bytes() =>
                {
                    outstanding.remove(&topic);
                }
                Some(other) => self.backlog.push(other),
                None => {
                    return Err(TransportError::ChannelClosed("transport events closed during self-test".into()).into())
                }
            }
        }
        debug!("pub/sub self-test passed");
        Ok(())
    }

    /// Drives the gateway until `shutdown` fires or the transport goes away.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        for event in std::mem::take(&mut self.backlog) {
            self.on_transport_event(event);
        }

        loop {
            tokio::select! {
                // Use biased to ensure branch order
                biased;
                // P0: shutdown received
                _ = shutdown.changed() => {
                    warn!("[Gateway:{}] shutdown signal received.", self.ctx.gateway_id());
                    return self.stop().await;
                }
                // P1: life checker expiries
                Some(event) = self.lifecycle_rx.recv() => {
                    self.on_lifecycle_event(event);
                }
                // P2: transport traffic
                event = self.transport_rx.recv() => {
                    match event {
                        Some(event) => self.on_transport_event(event),
                        None => {
                            error!("transport event channel closed");
                            self.stop().await?;
                            return Err(TransportError::ChannelClosed("transport events".into()).into());
                        }
                    }
                }
            }
        }
    }

    /// Closes the join window, cancels every timer and request, and releases
    /// the transport.
    pub async fn stop(&self) -> Result<()> {
        if !self.ctx.is_enabled() {
            return Ok(());
        }
        self.ctx.set_enabled(false);
        self.ctx.join.open(0, self.ctx.events.clone());
        self.ctx.directory.disarm_all();
        self.ctx.correlator.cancel_all();

        let unsubscribes = CHANNEL_TOPICS
            .iter()
            .map(|(topic, _)| async move { (topic, self.ctx.transport.unsubscribe(topic).await) });
        for (topic, result) in futures::future::join_all(unsubscribes).await {
            if let Err(e) = result {
                warn!(%topic, "unsubscribe failed: {:?}", e);
            }
        }
        self.ctx.transport.shutdown().await?;
        info!(gateway = %self.ctx.gateway_id(), "gateway stopped");
        Ok(())
    }

    fn on_lifecycle_event(
        &self,
        event: LifecycleEvent,
    ) {
        match event {
            LifecycleEvent::LifetimeExpired { client_id, epoch } => {
                match self.ctx.directory.on_lifetime_expired(&client_id, epoch) {
                    Ok(OfflineOutcome::Removed) => {
                        info!(%client_id, "unregistered device dropped after inactivity")
                    }
                    Ok(_) => {}
                    Err(e) => error!(%client_id, "lifetime expiry handling failed: {:?}", e),
                }
            }
        }
    }

    fn on_transport_event(
        &self,
        event: TransportEvent,
    ) {
        match event {
            TransportEvent::Message { topic, payload } => {
                self.dispatcher.on_message(&topic, payload);
            }
            TransportEvent::ClientConnected { client_id } => {
                self.ctx.emit(GatewayEvent::Connected {
                    client_id: client_id.clone(),
                });
                if self.ctx.directory.contains(&client_id) {
                    let ctx = self.ctx.clone();
                    let id = client_id.clone();
                    spawn_task("connected", &client_id, on_reconnected(ctx, id));
                }
            }
            TransportEvent::ClientDisconnected { client_id } => {
                self.ctx.emit(GatewayEvent::Disconnected {
                    client_id: client_id.clone(),
                });
                let sleeping = self
                    .ctx
                    .directory
                    .lookup(&client_id)
                    .map(|record| record.status == DeviceStatus::Sleeping);
                if sleeping == Some(false) {
                    if let Err(e) = self.ctx.directory.go_offline(&client_id) {
                        error!(%client_id, "going offline failed: {:?}", e);
                    }
                }
            }
        }
    }
}

/// A known device reconnected: bring it online, make sure it answers, then
/// refresh its shadow.
async fn on_reconnected(
    ctx: Arc<GatewayContext>,
    client_id: String,
) -> Result<()> {
    let Some(record) = ctx.directory.lookup(&client_id) else {
        return Ok(());
    };
    if record.status == DeviceStatus::Sleeping {
        return Ok(());
    }
    ctx.directory.set_status(&client_id, DeviceStatus::Online)?;

    tokio::time::sleep(ctx.config.reconnect_maintain_delay()).await;
    let rsp = ctx.ping_req(&client_id).await?;
    if rsp.status == RspCode::Ok.code() {
        ctx.maintain(&client_id).await?;
    } else {
        debug!(%client_id, status = rsp.status, "reconnect ping not answered with OK");
    }
    Ok(())
}
