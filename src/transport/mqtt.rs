use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Transport;
use super::TransportEvent;
use crate::BrokerConfig;
use crate::Result;
use crate::TransportError;

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// MQTT client connection to an external broker.
///
/// A pump task polls the rumqttc event loop and forwards every incoming
/// publish as [`TransportEvent::Message`]. Active subscriptions are replayed
/// after a reconnect.
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Arc<Mutex<HashMap<String, QoS>>>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl MqttTransport {
    /// Creates the client and starts the pump. Events go to `events_tx`.
    pub fn connect(
        client_id: &str,
        config: &BrokerConfig,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(options, config.channel_capacity);
        let subscriptions = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        info!(host = %config.host, port = config.port, %client_id, "connecting to MQTT broker");
        let pump = tokio::spawn(run_event_loop(
            client.clone(),
            event_loop,
            subscriptions.clone(),
            events_tx,
            cancel.child_token(),
            Duration::from_millis(config.reconnect_backoff_ms),
        ));

        Self {
            client,
            subscriptions,
            cancel,
            pump: Mutex::new(Some(pump)),
        }
    }
}

/// Replays every active subscription from a separate task. The request queue
/// is only drained by the pump, so the pump itself must never wait on it.
pub(super) fn restore_subscriptions(
    client: &AsyncClient,
    subscriptions: &Mutex<HashMap<String, QoS>>,
) -> JoinHandle<()> {
    let topics: Vec<_> = subscriptions
        .lock()
        .iter()
        .map(|(t, q)| (t.clone(), *q))
        .collect();
    let client = client.clone();
    tokio::spawn(async move {
        for (topic, level) in topics {
            if let Err(e) = client.subscribe(topic.clone(), level).await {
                warn!(%topic, error = %e, "failed to restore subscription");
            }
        }
    })
}

pub(super) async fn run_event_loop(
    client: AsyncClient,
    mut event_loop: EventLoop,
    subscriptions: Arc<Mutex<HashMap<String, QoS>>>,
    events_tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    let mut connected_once = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("MQTT event loop cancelled, disconnecting");
                let _ = client.try_disconnect();
                break;
            }
            result = event_loop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connection established");
                        if connected_once {
                            restore_subscriptions(&client, &subscriptions);
                        }
                        connected_once = true;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let event = TransportEvent::Message {
                            topic: publish.topic.clone(),
                            payload: publish.payload.clone(),
                        };
                        if events_tx.send(event).await.is_err() {
                            warn!("transport event channel closed, terminating event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        info!("MQTT broker sent disconnect");
                    }
                    Ok(event) => {
                        debug!("MQTT event: {:?}", event);
                    }
                    Err(e) => {
                        warn!(error = %e, "MQTT event loop error");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        qos_level: u8,
        payload: Bytes,
    ) -> Result<()> {
        self.client
            .publish_bytes(topic, qos(qos_level), false, payload)
            .await
            .map_err(TransportError::Client)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos_level: u8,
    ) -> Result<()> {
        self.client
            .subscribe(topic, qos(qos_level))
            .await
            .map_err(TransportError::Client)?;
        self.subscriptions.lock().insert(topic.to_string(), qos(qos_level));
        debug!(%topic, qos = qos_level, "subscribed");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        topic: &str,
    ) -> Result<()> {
        self.client.unsubscribe(topic).await.map_err(TransportError::Client)?;
        self.subscriptions.lock().remove(topic);
        debug!(%topic, "unsubscribed");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.await.map_err(TransportError::TaskFailed)?;
        }
        info!("MQTT transport stopped");
        Ok(())
    }
}
