use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::AsyncClient;
use rumqttc::MqttOptions;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::mqtt::restore_subscriptions;
use super::mqtt::run_event_loop;

/// Client whose single-slot request queue is already full.
fn saturated_client(port: u16) -> (AsyncClient, rumqttc::EventLoop) {
    let (client, event_loop) = AsyncClient::new(MqttOptions::new("shepherd-test", "127.0.0.1", port), 1);
    client
        .try_publish("notify/dev-1", QoS::AtMostOnce, false, "x")
        .unwrap();
    (client, event_loop)
}

#[tokio::test]
async fn restoring_subscriptions_never_blocks_the_caller() {
    let (client, event_loop) = saturated_client(1883);
    let subscriptions = Mutex::new(HashMap::from([("register/#".to_string(), QoS::AtMostOnce)]));

    let handle = restore_subscriptions(&client, &subscriptions);
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());

    // without a pump the queued subscribe fails instead of hanging
    drop(event_loop);
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_pump_exits_with_full_request_queue() {
    let (client, event_loop) = saturated_client(1);
    let (events_tx, _events_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    timeout(
        Duration::from_secs(1),
        run_event_loop(
            client,
            event_loop,
            Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            cancel,
            Duration::from_millis(10),
        ),
    )
    .await
    .unwrap();
}
