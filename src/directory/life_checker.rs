use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::constants::MAX_DEADLINE;
use crate::LifecycleEvent;

/// Which deadline a life checker is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Device must send something within its lifetime.
    Liveness,
    /// Device declared a sleep window; silence is expected until it ends.
    Sleep,
}

/// Restartable per-device deadline.
///
/// Every `arm` bumps the epoch and replaces the pending expiry task. Expiry is
/// reported as [`LifecycleEvent::LifetimeExpired`] carrying the epoch it was
/// armed under, so a notice that raced with a rearm is recognisably stale.
#[derive(Debug)]
pub struct LifeChecker {
    client_id: String,
    epoch: u64,
    mode: Option<CheckMode>,
    next_deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
    expiry_tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifeChecker {
    pub fn new(
        client_id: &str,
        expiry_tx: mpsc::UnboundedSender<LifecycleEvent>,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            epoch: 0,
            mode: None,
            next_deadline: None,
            task: None,
            expiry_tx,
        }
    }

    /// Timeouts longer than [`MAX_DEADLINE`] are clamped to it.
    pub fn arm(
        &mut self,
        mode: CheckMode,
        timeout: Duration,
    ) {
        self.disarm();
        self.epoch += 1;

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout.min(MAX_DEADLINE))
            .unwrap_or_else(|| now.checked_add(MAX_DEADLINE).unwrap_or(now));
        let client_id = self.client_id.clone();
        let epoch = self.epoch;
        let tx = self.expiry_tx.clone();

        self.mode = Some(mode);
        self.next_deadline = Some(deadline);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(%client_id, epoch, ?mode, "life checker expired");
            let _ = tx.send(LifecycleEvent::LifetimeExpired { client_id, epoch });
        }));
    }

    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.mode = None;
        self.next_deadline = None;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn mode(&self) -> Option<CheckMode> {
        self.mode
    }

    pub fn is_armed(&self) -> bool {
        self.mode.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.next_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for LifeChecker {
    fn drop(&mut self) {
        self.disarm();
    }
}
