//! Request/response correlation.
//!
//! Outbound requests carry a transaction id that the device echoes in its
//! response. The [`Correlator`] owns every in-flight request keyed by
//! `(client id, transaction id)`; whichever comes first, the matching
//! response or the deadline, removes the entry under the lock, so the other
//! finds nothing to settle.

mod transaction;

pub use transaction::*;

#[cfg(test)]
mod correlator_test;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::codec::Command;
use crate::constants::MAX_TRANS_ID;
use crate::metrics::REQUEST_ROUND_TRIP_MS;
use crate::metrics::REQUEST_TIMEOUTS;
use crate::metrics::STALE_RESPONSES;
use crate::ProtocolError;
use crate::Result;

type TransactionKey = (String, u32);

#[derive(Debug, Default)]
struct Inner {
    next: u32,
    pending: HashMap<TransactionKey, PendingTransaction>,
}

#[derive(Debug, Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next transaction id. Ids run 1..=255 and wrap; an id still pending for
    /// any device is skipped.
    pub fn allocate(&self) -> Result<u32> {
        let mut inner = self.inner.lock();
        for _ in 0..MAX_TRANS_ID {
            inner.next = inner.next % MAX_TRANS_ID + 1;
            let candidate = inner.next;
            if !inner.pending.keys().any(|(_, id)| *id == candidate) {
                return Ok(candidate);
            }
        }
        Err(ProtocolError::TransIdExhausted.into())
    }

    /// Registers an in-flight request and arms its deadline.
    pub fn send(
        self: &Arc<Self>,
        client_id: &str,
        trans_id: u32,
        cmd: Command,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        let key = (client_id.to_string(), trans_id);
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        if inner.pending.contains_key(&key) {
            return Err(ProtocolError::DuplicateTransaction {
                client_id: client_id.to_string(),
                trans_id,
            }
            .into());
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(correlator) = weak.upgrade() {
                correlator.expire(&timer_key, timeout);
            }
        });

        inner.pending.insert(
            key,
            PendingTransaction {
                cmd,
                issued_at: Instant::now(),
                completion: tx,
                timer: Some(timer),
            },
        );
        debug!(%client_id, trans_id, %cmd, "request pending");

        Ok(PendingResponse::new(client_id.to_string(), trans_id, rx))
    }

    /// Delivers a response to its waiting request. Returns `false` when
    /// nothing is waiting for it, e.g. it already timed out.
    pub fn settle(
        &self,
        client_id: &str,
        trans_id: u32,
        response: DeviceResponse,
    ) -> bool {
        let entry = self.inner.lock().pending.remove(&(client_id.to_string(), trans_id));
        match entry {
            Some(pending) => {
                let elapsed = pending.issued_at.elapsed();
                REQUEST_ROUND_TRIP_MS
                    .with_label_values(&[pending.cmd.name()])
                    .observe(elapsed.as_millis() as f64);
                pending.complete(Ok(response));
                true
            }
            None => {
                debug!(%client_id, trans_id, "stale response discarded");
                STALE_RESPONSES.inc();
                false
            }
        }
    }

    fn expire(
        &self,
        key: &TransactionKey,
        duration: Duration,
    ) {
        let Some(mut pending) = self.inner.lock().pending.remove(key) else {
            return;
        };
        let (client_id, trans_id) = key.clone();
        warn!(%client_id, trans_id, cmd = %pending.cmd, "request timed out");
        REQUEST_TIMEOUTS.with_label_values(&[pending.cmd.name()]).inc();

        // This is the timer task itself; nothing to abort.
        pending.timer = None;
        pending.complete(Err(ProtocolError::Timeout {
            client_id,
            trans_id,
            duration,
        }
        .into()));
    }

    /// Drops one in-flight request, e.g. when its publish failed.
    pub fn cancel(
        &self,
        client_id: &str,
        trans_id: u32,
    ) -> bool {
        let entry = self.inner.lock().pending.remove(&(client_id.to_string(), trans_id));
        match entry {
            Some(pending) => {
                pending.complete(Err(ProtocolError::Cancelled {
                    client_id: client_id.to_string(),
                    trans_id,
                }
                .into()));
                true
            }
            None => false,
        }
    }

    /// Fails every in-flight request with `Cancelled`.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.inner.lock().pending.drain().collect();
        for ((client_id, trans_id), pending) in drained {
            pending.complete(Err(ProtocolError::Cancelled { client_id, trans_id }.into()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(
        &self,
        client_id: &str,
        trans_id: u32,
    ) -> bool {
        self.inner
            .lock()
            .pending
            .contains_key(&(client_id.to_string(), trans_id))
    }
}
