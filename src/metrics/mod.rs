use std::net::SocketAddr;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::DeviceStatus;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref INBOUND_MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("inbound_messages", "Messages received per channel"),
        &["channel"]
    )
    .expect("metric can not be created");

    pub static ref BAD_MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("bad_messages", "Malformed messages per channel"),
        &["channel"]
    )
    .expect("metric can not be created");

    pub static ref REQUEST_TIMEOUTS: IntCounterVec = IntCounterVec::new(
        Opts::new("request_timeouts", "Gateway requests that got no response in time"),
        &["cmd"]
    )
    .expect("metric can not be created");

    pub static ref STALE_RESPONSES: IntCounter =
        IntCounter::new("stale_responses", "Responses matching no pending transaction")
            .expect("metric can not be created");

    pub static ref DEVICES_BY_STATUS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("devices", "Known devices per status"),
        &["status"]
    )
    .expect("metric can not be created");

    pub static ref REQUEST_ROUND_TRIP_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_round_trip_ms", "Histogram of request round trip in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["cmd"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(INBOUND_MESSAGES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BAD_MESSAGES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REQUEST_TIMEOUTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STALE_RESPONSES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DEVICES_BY_STATUS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REQUEST_ROUND_TRIP_MS.clone()))
        .expect("collector can be registered");
}

/// Moves one device between status buckets. `None` means "not known".
pub(crate) fn track_status(
    from: Option<DeviceStatus>,
    to: Option<DeviceStatus>,
) {
    if from == to {
        return;
    }
    if let Some(status) = from {
        DEVICES_BY_STATUS.with_label_values(&[&status.to_string()]).dec();
    }
    if let Some(status) = to {
        DEVICES_BY_STATUS.with_label_values(&[&status.to_string()]).inc();
    }
}

pub async fn start_server(
    addr: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!(%addr, "metrics server listening");
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

pub(crate) fn encode_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
