//! Shared test components: a recording transport, gateway fixtures and a few
//! helpers that play the device side of the protocol.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::codec::Id;
use crate::DeviceStore;
use crate::Gateway;
use crate::GatewayBuilder;
use crate::GatewayConfig;
use crate::GatewayEvent;
use crate::GatewayNode;
use crate::MemDeviceStore;
use crate::ObjList;
use crate::Result;
use crate::Transport;
use crate::TransportError;
use crate::TransportEvent;

pub(crate) const GATEWAY_ID: &str = "shp-test";

/// One publish the gateway made.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Published {
    pub topic: String,
    pub qos: u8,
    pub payload: Bytes,
}

impl Published {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap_or(Value::Null)
    }
}

/// Transport double that records everything sent through it.
///
/// Publishes to `<channel>/response/<gatewayId>` are looped back as inbound
/// messages so the startup self-test can pass.
pub(crate) struct RecordingTransport {
    published_tx: mpsc::UnboundedSender<Published>,
    loopback: mpsc::Sender<TransportEvent>,
    pub subscriptions: Mutex<Vec<String>>,
    pub unsubscriptions: Mutex<Vec<String>>,
    pub fail_publish: AtomicBool,
    pub is_shutdown: AtomicBool,
}

impl RecordingTransport {
    pub fn new(loopback: mpsc::Sender<TransportEvent>) -> (Arc<Self>, mpsc::UnboundedReceiver<Published>) {
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            published_tx,
            loopback,
            subscriptions: Mutex::new(Vec::new()),
            unsubscriptions: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            is_shutdown: AtomicBool::new(false),
        });
        (transport, published_rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        payload: Bytes,
    ) -> Result<()> {
        if self.fail_publish.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed("publish disabled".into()).into());
        }
        if topic.ends_with(&format!("/response/{GATEWAY_ID}")) {
            let _ = self
                .loopback
                .send(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .await;
        }
        let _ = self.published_tx.send(Published {
            topic: topic.to_string(),
            qos,
            payload,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _qos: u8,
    ) -> Result<()> {
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(
        &self,
        topic: &str,
    ) -> Result<()> {
        self.unsubscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.is_shutdown.store(true, Ordering::Release);
        Ok(())
    }
}

pub(crate) fn test_config() -> GatewayConfig {
    GatewayConfig {
        client_id: GATEWAY_ID.to_string(),
        request_timeout_ms: 1_000,
        device_acceptance_timeout_ms: 1_000,
        init_timeout_ms: 5_000,
        join_window_secs: 60,
        sleep_grace_secs: 10,
        reconnect_maintain_delay_ms: 100,
        ..GatewayConfig::default()
    }
}

/// A built gateway with both ends of its transport exposed.
pub(crate) struct TestGateway {
    pub node: GatewayNode,
    pub gateway: Gateway,
    pub transport: Arc<RecordingTransport>,
    pub transport_tx: mpsc::Sender<TransportEvent>,
    pub published: mpsc::UnboundedReceiver<Published>,
    pub events: broadcast::Receiver<GatewayEvent>,
}

pub(crate) fn build_gateway(store: Arc<dyn DeviceStore>) -> TestGateway {
    build_gateway_with(test_config(), store, |builder| builder)
}

pub(crate) fn build_gateway_with(
    config: GatewayConfig,
    store: Arc<dyn DeviceStore>,
    customize: impl FnOnce(GatewayBuilder) -> GatewayBuilder,
) -> TestGateway {
    let (transport_tx, transport_rx) = mpsc::channel(1024);
    let (transport, published) = RecordingTransport::new(transport_tx.clone());
    let node = customize(GatewayBuilder::new(config, transport.clone(), transport_rx).store(store)).build();
    let gateway = node.gateway();
    let events = gateway.subscribe_events();
    TestGateway {
        node,
        gateway,
        transport,
        transport_tx,
        published,
        events,
    }
}

/// A gateway that passed `start`, with the startup publishes drained.
pub(crate) async fn started_gateway() -> TestGateway {
    let mut gw = build_gateway(Arc::new(MemDeviceStore::new()));
    gw.node.start().await.expect("start");
    while gw.published.try_recv().is_ok() {}
    while gw.events.try_recv().is_ok() {}
    gw
}

impl TestGateway {
    /// Next publish on `topic`, skipping any other.
    pub async fn next_publish(
        &mut self,
        topic: &str,
    ) -> Published {
        let wait = async {
            loop {
                let published = self.published.recv().await.expect("transport alive");
                if published.topic == topic {
                    return published;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("publish arrives")
    }

    /// Next event matching `pred`, skipping any other.
    pub async fn next_event(
        &mut self,
        pred: impl Fn(&GatewayEvent) -> bool,
    ) -> GatewayEvent {
        let wait = async {
            loop {
                let event = self.events.recv().await.expect("events open");
                if pred(&event) {
                    return event;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("event arrives")
    }

    /// Feeds a JSON payload into the dispatcher as if a device published it.
    pub fn device_publish(
        &self,
        topic: &str,
        payload: Value,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.node
            .dispatcher()
            .on_message(topic, Bytes::from(payload.to_string()))
    }

    /// Answers the next request to `client_id` with `status` and `data`.
    pub async fn answer_next_request(
        &mut self,
        client_id: &str,
        status: u16,
        data: Option<Value>,
    ) -> Value {
        let request = self.next_publish(&format!("request/{client_id}")).await.json();
        let mut response = json!({
            "transId": request["transId"],
            "cmdId": request["cmdId"],
            "status": status,
        });
        if let Some(data) = data {
            response["data"] = data;
        }
        self.device_publish(&format!("response/{client_id}"), response);
        request
    }

    /// Puts a fully registered device straight into the directory.
    pub fn seed_device(
        &self,
        client_id: &str,
        obj_list: Value,
        shadow: Value,
    ) {
        let obj_list: ObjList = serde_json::from_value(obj_list).expect("object list");
        let attrs = crate::DeviceAttrs {
            obj_list: Some(obj_list),
            mac: Some(format!("mac-{client_id}")),
            ..Default::default()
        };
        let directory = &self.gateway.ctx.directory;
        directory.register(client_id, &attrs).expect("register");
        directory.with_record(client_id, |record| {
            if let Value::Object(shadow) = shadow {
                record.shadow = shadow;
            }
        });
    }
}

pub(crate) fn obj_list(entries: &[(u32, &[u32])]) -> ObjList {
    entries
        .iter()
        .map(|(oid, iids)| (Id::Num(*oid), iids.iter().map(|i| Id::Num(*i)).collect()))
        .collect()
}

pub(crate) fn shadow(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
