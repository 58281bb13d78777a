use std::time::Duration;

use tokio::sync::broadcast;

use super::*;
use crate::GatewayEvent;

fn remaining(event: GatewayEvent) -> u64 {
    match event {
        GatewayEvent::PermitJoining { remaining_secs } => remaining_secs,
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn window_counts_down_once_per_second() {
    let (tx, mut rx) = broadcast::channel(16);
    let window = JoinWindow::default();

    window.open(3, tx);
    assert!(window.is_open());

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(remaining(rx.recv().await.unwrap()));
    }

    assert_eq!(seen, vec![3, 2, 1, 0]);
    assert!(!window.is_open());
    assert_eq!(window.remaining_secs(), 0);
}

#[tokio::test(start_paused = true)]
async fn open_zero_closes_and_stops_previous_countdown() {
    let (tx, mut rx) = broadcast::channel(16);
    let window = JoinWindow::default();

    window.open(60, tx.clone());
    assert_eq!(remaining(rx.recv().await.unwrap()), 60);

    window.open(0, tx);
    assert_eq!(remaining(rx.recv().await.unwrap()), 0);
    assert!(!window.is_open());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn reopening_restarts_the_countdown() {
    let (tx, mut rx) = broadcast::channel(16);
    let window = JoinWindow::default();

    window.open(2, tx.clone());
    window.open(10, tx);

    assert_eq!(remaining(rx.recv().await.unwrap()), 2);
    assert_eq!(remaining(rx.recv().await.unwrap()), 10);
    assert_eq!(remaining(rx.recv().await.unwrap()), 9);
    assert!(window.is_open());
}

#[tokio::test(start_paused = true)]
async fn cancel_closes_silently() {
    let (tx, mut rx) = broadcast::channel(16);
    let window = JoinWindow::default();

    window.open(30, tx);
    assert_eq!(remaining(rx.recv().await.unwrap()), 30);

    window.cancel();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!window.is_open());
    assert!(rx.try_recv().is_err());
}
