use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::Command;
use crate::ProtocolError;
use crate::Result;

/// A device's answer to a gateway request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DeviceResponse {
    pub fn new(
        status: u16,
        data: Option<Value>,
    ) -> Self {
        Self { status, data }
    }

    /// Status only, no payload.
    pub fn status(status: u16) -> Self {
        Self { status, data: None }
    }
}

/// Bookkeeping for one in-flight request.
#[derive(Debug)]
pub(super) struct PendingTransaction {
    pub(super) cmd: Command,
    pub(super) issued_at: Instant,
    pub(super) completion: oneshot::Sender<Result<DeviceResponse>>,
    pub(super) timer: Option<JoinHandle<()>>,
}

impl PendingTransaction {
    /// Delivers the verdict and cancels the timer. Consumes the entry so it
    /// cannot be settled twice.
    pub(super) fn complete(
        mut self,
        verdict: Result<DeviceResponse>,
    ) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        // Receiver gone means the caller stopped waiting.
        let _ = self.completion.send(verdict);
    }
}

/// Completion handle returned by [`super::Correlator::send`]. Resolves to the
/// device response, or to a `Timeout` error when the deadline passes first.
#[derive(Debug)]
pub struct PendingResponse {
    client_id: String,
    trans_id: u32,
    rx: oneshot::Receiver<Result<DeviceResponse>>,
}

impl PendingResponse {
    pub(super) fn new(
        client_id: String,
        trans_id: u32,
        rx: oneshot::Receiver<Result<DeviceResponse>>,
    ) -> Self {
        Self {
            client_id,
            trans_id,
            rx,
        }
    }

    pub fn trans_id(&self) -> u32 {
        self.trans_id
    }
}

impl Future for PendingResponse {
    type Output = Result<DeviceResponse>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(verdict)) => Poll::Ready(verdict),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ProtocolError::Cancelled {
                client_id: self.client_id.clone(),
                trans_id: self.trans_id,
            }
            .into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
