use std::time::Duration;

use serde_json::json;

use super::*;
use crate::Error;

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn allocate_starts_at_one_and_wraps_after_255() {
    let correlator = Correlator::new();
    assert_eq!(correlator.allocate().unwrap(), 1);
    for _ in 2..=255 {
        correlator.allocate().unwrap();
    }
    assert_eq!(correlator.allocate().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn allocate_skips_ids_pending_for_any_device() {
    let correlator = Correlator::new();
    let _a = correlator.send("dev-a", 1, Command::Read, TIMEOUT).unwrap();
    let _b = correlator.send("dev-b", 2, Command::Read, TIMEOUT).unwrap();

    assert_eq!(correlator.allocate().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn allocate_fails_when_every_id_is_pending() {
    let correlator = Correlator::new();
    let mut handles = Vec::new();
    for id in 1..=255 {
        handles.push(correlator.send("dev", id, Command::Read, TIMEOUT).unwrap());
    }

    let err = correlator.allocate().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::TransIdExhausted)));
}

#[tokio::test(start_paused = true)]
async fn settle_resolves_the_pending_response() {
    let correlator = Correlator::new();
    let trans_id = correlator.allocate().unwrap();
    let pending = correlator.send("dev", trans_id, Command::Read, TIMEOUT).unwrap();

    assert!(correlator.settle("dev", trans_id, DeviceResponse::new(205, Some(json!("world")))));

    let response = pending.await.unwrap();
    assert_eq!(response.status, 205);
    assert_eq!(response.data, Some(json!("world")));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_pending_pair_is_rejected() {
    let correlator = Correlator::new();
    let _first = correlator.send("dev", 7, Command::Read, TIMEOUT).unwrap();

    let err = correlator.send("dev", 7, Command::Write, TIMEOUT).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::DuplicateTransaction { trans_id: 7, .. })
    ));
    // same id for another device is fine
    assert!(correlator.send("other", 7, Command::Read, TIMEOUT).is_ok());
}

#[tokio::test(start_paused = true)]
async fn timed_out_request_fails_and_late_response_is_stale() {
    let correlator = Correlator::new();
    let pending = correlator.send("dev", 9, Command::Observe, TIMEOUT).unwrap();

    let err = pending.await.unwrap_err();
    assert!(err.is_timeout());
    assert!(!correlator.is_pending("dev", 9));

    assert!(!correlator.settle("dev", 9, DeviceResponse::status(205)));
}

#[tokio::test(start_paused = true)]
async fn response_before_deadline_beats_the_timer() {
    let correlator = Correlator::new();
    let pending = correlator.send("dev", 4, Command::Ping, TIMEOUT).unwrap();

    tokio::time::sleep(TIMEOUT - Duration::from_millis(1)).await;
    assert!(correlator.settle("dev", 4, DeviceResponse::status(200)));

    // Run past the original deadline; the verdict must not change.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pending.await.unwrap().status, 200);
}

#[test]
fn unmatched_response_is_stale() {
    let correlator = Correlator::new();
    assert!(!correlator.settle("nobody", 1, DeviceResponse::status(200)));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_fails_pending_requests() {
    let correlator = Correlator::new();
    let pending = correlator.send("dev", 1, Command::Read, TIMEOUT).unwrap();

    correlator.cancel_all();

    let err = pending.await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::Cancelled { trans_id: 1, .. })
    ));
    assert_eq!(correlator.pending_count(), 0);
}
