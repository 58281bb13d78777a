use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::GatewayEvent;

/// Window during which unknown devices may register.
///
/// Opening it starts a once-per-second countdown that emits
/// [`GatewayEvent::PermitJoining`] until it reaches zero.
#[derive(Debug, Default)]
pub struct JoinWindow {
    remaining: Arc<AtomicU64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl JoinWindow {
    pub fn is_open(&self) -> bool {
        self.remaining.load(Ordering::Acquire) > 0
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Opens the window for `secs` seconds; `0` closes it at once.
    pub fn open(
        &self,
        secs: u64,
        events: broadcast::Sender<GatewayEvent>,
    ) {
        let mut ticker = self.ticker.lock();
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        self.remaining.store(secs, Ordering::Release);
        let _ = events.send(GatewayEvent::PermitJoining { remaining_secs: secs });
        if secs == 0 {
            info!("join window closed");
            return;
        }
        info!("join window open for {} s", secs);

        let remaining = self.remaining.clone();
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let left = remaining.load(Ordering::Acquire).saturating_sub(1);
                remaining.store(left, Ordering::Release);
                let _ = events.send(GatewayEvent::PermitJoining { remaining_secs: left });
                if left == 0 {
                    info!("join window closed");
                    break;
                }
            }
        }));
    }

    /// Closes the window without emitting anything.
    pub fn cancel(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        self.remaining.store(0, Ordering::Release);
    }
}
