use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::decode;
use super::handlers;
use super::peek_trans_id;
use super::Channel;
use super::ChannelMessage;
use crate::codec::RspCode;
use crate::constants::RESERVED_CLIENT_ID;
use crate::gateway::GatewayContext;
use crate::metrics::INBOUND_MESSAGES;
use crate::utils::async_task::spawn_task;

/// Inbound entry point: resolves topic, payload and device, then hands the
/// message to its channel handler on a separate task.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: Arc<GatewayContext>,
}

impl Dispatcher {
    pub(crate) fn new(ctx: Arc<GatewayContext>) -> Self {
        Self { ctx }
    }

    /// Never runs a handler inline. Returns the handle of whatever was
    /// spawned, or `None` when the message was dropped.
    pub fn on_message(
        &self,
        topic: &str,
        payload: Bytes,
    ) -> Option<JoinHandle<()>> {
        let mut segments = topic.splitn(3, '/');
        let channel_name = segments.next().unwrap_or_default();
        let client_id = segments.next().unwrap_or_default().to_string();

        let channel = if client_id.is_empty() {
            Channel::Other(channel_name.to_string())
        } else {
            Channel::parse(channel_name)
        };
        let label = match &channel {
            Channel::Other(_) => "other",
            known => known.as_str(),
        };
        INBOUND_MESSAGES.with_label_values(&[label]).inc();

        if client_id == RESERVED_CLIENT_ID {
            trace!(%topic, "reply echo dropped");
            return None;
        }

        let payload = match self.ctx.crypto.decrypt(&client_id, payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%client_id, %topic, "payload decrypt failed: {:?}", e);
                return self.spawn(
                    client_id,
                    ChannelMessage::BadMessage {
                        channel: channel.as_str().to_string(),
                        reason: e.to_string(),
                    },
                );
            }
        };
        let message = decode(&channel, topic, &payload);

        let known = self.ctx.directory.contains(&client_id);
        let unknown_allowed = client_id.is_empty() || matches!(channel, Channel::Register | Channel::Response);
        if !known && !unknown_allowed {
            let trans_id = message.trans_id().or_else(|| peek_trans_id(&payload));
            debug!(%client_id, %topic, "message from unknown device");
            let ctx = self.ctx.clone();
            let reply_channel = channel.as_str().to_string();
            let reply_to = client_id.clone();
            return Some(spawn_task("not_found", &client_id, async move {
                ctx.reply(&reply_channel, &reply_to, trans_id, RspCode::NotFound).await
            }));
        }

        let suspends_liveness = message.declares_sleep() || matches!(message, ChannelMessage::Lwt { .. });
        if known && !suspends_liveness {
            self.ctx.directory.touch_liveness(&client_id);
        }

        self.spawn(client_id, message)
    }

    fn spawn(
        &self,
        client_id: String,
        message: ChannelMessage,
    ) -> Option<JoinHandle<()>> {
        let ctx = self.ctx.clone();
        let name = handler_name(&message);
        let id = client_id.clone();
        Some(spawn_task(name, &id, handlers::handle(ctx, client_id, message)))
    }
}

fn handler_name(message: &ChannelMessage) -> &'static str {
    match message {
        ChannelMessage::Register(_) => "register",
        ChannelMessage::Deregister(_) => "deregister",
        ChannelMessage::Schedule(_) => "schedule",
        ChannelMessage::Notify(_) => "notify",
        ChannelMessage::Update(_) => "update",
        ChannelMessage::Response(_) => "response",
        ChannelMessage::Ping(_) => "ping",
        ChannelMessage::Lwt { .. } => "lwt",
        ChannelMessage::BadMessage { .. } => "bad_message",
        ChannelMessage::Other { .. } => "other",
    }
}
