use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::constants::MAX_DEADLINE;
use crate::LifecycleEvent;

#[tokio::test(start_paused = true)]
async fn arm_reports_expiry_with_current_epoch() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut checker = LifeChecker::new("dev-1", tx);

    checker.arm(CheckMode::Liveness, Duration::from_secs(5));
    checker.arm(CheckMode::Liveness, Duration::from_secs(5));

    let LifecycleEvent::LifetimeExpired { client_id, epoch } = rx.recv().await.unwrap();
    assert_eq!(client_id, "dev-1");
    assert_eq!(epoch, 2);
    assert_eq!(checker.epoch(), 2);
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_is_clamped_instead_of_overflowing() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut checker = LifeChecker::new("dev-1", tx);

    checker.arm(CheckMode::Liveness, Duration::from_secs(u64::MAX));

    assert_eq!(checker.mode(), Some(CheckMode::Liveness));
    assert!(checker.remaining().unwrap() <= MAX_DEADLINE);
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disarm_stops_pending_expiry() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut checker = LifeChecker::new("dev-1", tx);

    checker.arm(CheckMode::Sleep, Duration::from_secs(1));
    checker.disarm();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!checker.is_armed());
    assert!(checker.remaining().is_none());
    assert!(rx.try_recv().is_err());
}
