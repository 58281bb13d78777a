use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ChannelMessage;
use super::NotifyMsg;
use super::RegisterMsg;
use super::ResponseMsg;
use super::ScheduleMsg;
use super::UpdateMsg;
use crate::codec::object_key;
use crate::codec::ResourceAddress;
use crate::codec::RspCode;
use crate::constants;
use crate::diff::device_attribute_diff;
use crate::gateway::Apply;
use crate::gateway::GatewayContext;
use crate::metrics::BAD_MESSAGES;
use crate::utils::time::get_now_as_u64;
use crate::DeviceAttrs;
use crate::DeviceRecord;
use crate::DeviceResponse;
use crate::DeviceStatus;
use crate::GatewayEvent;
use crate::Result;

/// Routes one decoded message to its channel handler.
pub(crate) async fn handle(
    ctx: Arc<GatewayContext>,
    client_id: String,
    message: ChannelMessage,
) -> Result<()> {
    match message {
        ChannelMessage::Register(msg) => on_register(&ctx, &client_id, msg).await,
        ChannelMessage::Deregister(msg) => on_deregister(&ctx, &client_id, msg.trans_id).await,
        ChannelMessage::Schedule(msg) => on_schedule(&ctx, &client_id, msg).await,
        ChannelMessage::Notify(msg) => on_notify(&ctx, &client_id, msg).await,
        ChannelMessage::Update(msg) => on_update(&ctx, &client_id, msg).await,
        ChannelMessage::Response(msg) => {
            on_response(&ctx, &client_id, msg);
            Ok(())
        }
        ChannelMessage::Ping(msg) => {
            ctx.reply(constants::PING, &client_id, msg.trans_id, RspCode::Ok).await
        }
        ChannelMessage::Lwt { data } => on_lwt(&ctx, &client_id, data),
        ChannelMessage::BadMessage { channel, reason } => {
            warn!(%client_id, %channel, "bad message: {}", reason);
            BAD_MESSAGES.with_label_values(&[channel.as_str()]).inc();
            ctx.emit(GatewayEvent::MalformedMessage {
                channel,
                client_id,
                reason,
            });
            Ok(())
        }
        ChannelMessage::Other { topic, payload } => {
            debug!(%topic, "unhandled topic");
            ctx.emit(GatewayEvent::UnhandledTopic { topic, payload });
            Ok(())
        }
    }
}

/// Copies the attribute diff, plus the port, onto the live record.
fn apply_attrs(
    ctx: &GatewayContext,
    client_id: &str,
    diff: &DeviceAttrs,
    port: Option<u16>,
) {
    ctx.directory.with_record(client_id, |record| {
        record.apply_attrs(diff);
        if port.is_some() {
            record.port = port;
        }
    });
}

async fn on_register(
    ctx: &GatewayContext,
    client_id: &str,
    msg: RegisterMsg,
) -> Result<()> {
    let attrs = msg.attrs();
    if attrs.obj_list.is_none() {
        warn!(%client_id, "register without object list");
        return ctx
            .reply(constants::REGISTER, client_id, msg.trans_id, RspCode::BadRequest)
            .await;
    }

    if let Some(record) = ctx.directory.lookup(client_id) {
        return on_reregister(ctx, client_id, msg, &record, &attrs).await;
    }

    if !ctx.join.is_open() {
        info!(%client_id, "register refused: join window closed");
        return ctx
            .reply(constants::REGISTER, client_id, msg.trans_id, RspCode::MethodNotAllowed)
            .await;
    }

    ctx.directory.register(client_id, &attrs)?;
    apply_attrs(ctx, client_id, &DeviceAttrs::default(), msg.port);

    let verdict = match ctx.bootstrap(client_id).await {
        Ok(true) => accept(ctx, client_id).await,
        Ok(false) => RspCode::InternalServerError,
        Err(e) => {
            warn!(%client_id, "object detail bootstrap failed: {:?}", e);
            RspCode::InternalServerError
        }
    };

    if verdict != RspCode::Created {
        ctx.directory.remove(client_id)?;
        return ctx.reply(constants::REGISTER, client_id, msg.trans_id, verdict).await;
    }

    ctx.directory.persist(client_id)?;
    ctx.reply(constants::REGISTER, client_id, msg.trans_id, RspCode::Created).await?;
    info!(%client_id, "device registered");
    ctx.emit(GatewayEvent::Registered {
        client_id: client_id.to_string(),
    });
    Ok(())
}

/// Asks the application whether a freshly bootstrapped device may join.
async fn accept(
    ctx: &GatewayContext,
    client_id: &str,
) -> RspCode {
    let Some(record) = ctx.directory.lookup(client_id) else {
        return RspCode::InternalServerError;
    };
    let decision = tokio::time::timeout(
        ctx.config.device_acceptance_timeout(),
        ctx.acceptor.accept(&record),
    )
    .await;
    match decision {
        Ok(Ok(true)) => RspCode::Created,
        Ok(Ok(false)) => {
            info!(%client_id, "device rejected by acceptor");
            RspCode::Unauthorized
        }
        Ok(Err(e)) => {
            warn!(%client_id, "device acceptance failed: {:?}", e);
            RspCode::InternalServerError
        }
        Err(_) => {
            warn!(%client_id, "device acceptance timed out");
            RspCode::InternalServerError
        }
    }
}

async fn on_reregister(
    ctx: &GatewayContext,
    client_id: &str,
    msg: RegisterMsg,
    record: &DeviceRecord,
    attrs: &DeviceAttrs,
) -> Result<()> {
    let diff = device_attribute_diff(record, attrs);
    apply_attrs(ctx, client_id, &diff, msg.port);
    ctx.directory.with_record(client_id, |record| record.join_time = get_now_as_u64());
    if diff.lifetime.is_some() {
        ctx.directory.touch_liveness(client_id);
    }
    ctx.directory.persist(client_id)?;
    ctx.reply(constants::REGISTER, client_id, msg.trans_id, RspCode::Ok).await?;

    if diff.is_empty() {
        return Ok(());
    }
    ctx.emit(GatewayEvent::DeviceUpdated {
        client_id: client_id.to_string(),
        diff: diff.clone(),
    });
    if diff.obj_list.is_some() {
        refresh_objects(ctx, client_id).await?;
    }
    Ok(())
}

/// Reloads object details after the declared object list changed.
async fn refresh_objects(
    ctx: &GatewayContext,
    client_id: &str,
) -> Result<()> {
    match ctx.bootstrap(client_id).await {
        Ok(true) => ctx.directory.persist(client_id),
        Ok(false) => Ok(()),
        Err(e) => {
            warn!(%client_id, "object detail refresh failed: {:?}", e);
            Ok(())
        }
    }
}

async fn on_deregister(
    ctx: &GatewayContext,
    client_id: &str,
    trans_id: Option<u32>,
) -> Result<()> {
    ctx.directory.remove(client_id)?;
    ctx.reply(constants::DEREGISTER, client_id, trans_id, RspCode::Deleted).await?;
    info!(%client_id, "device deregistered");
    ctx.emit(GatewayEvent::Deregistered {
        client_id: client_id.to_string(),
    });
    Ok(())
}

async fn on_schedule(
    ctx: &GatewayContext,
    client_id: &str,
    msg: ScheduleMsg,
) -> Result<()> {
    if msg.sleep {
        let duration = msg.duration.map(Duration::from_secs);
        debug!(%client_id, ?duration, "device going to sleep");
        ctx.directory.enter_sleep(client_id, duration);
    } else {
        ctx.directory.set_status(client_id, DeviceStatus::Online)?;
    }
    ctx.reply(constants::SCHEDULE, client_id, msg.trans_id, RspCode::Ok).await
}

async fn on_notify(
    ctx: &GatewayContext,
    client_id: &str,
    msg: NotifyMsg,
) -> Result<()> {
    let Some(iid) = msg.iid.clone() else {
        return ctx
            .reply(constants::NOTIFY, client_id, msg.trans_id, RspCode::BadRequest)
            .await;
    };
    let addr = match &msg.rid {
        Some(rid) => ResourceAddress::resource(msg.oid.clone(), iid, rid.clone()),
        None => ResourceAddress::instance(msg.oid.clone(), iid),
    };

    let known = ctx
        .directory
        .lookup(client_id)
        .map(|record| {
            record
                .shadow_value(
                    &object_key(&addr.oid),
                    addr.instance_key().as_deref(),
                    addr.resource_key().as_deref(),
                )
                .is_some()
        })
        .unwrap_or(false);
    if !known {
        debug!(%client_id, path = %addr, "notify for unknown target");
        return ctx
            .reply(constants::NOTIFY, client_id, msg.trans_id, RspCode::NotFound)
            .await;
    }

    ctx.emit(GatewayEvent::Notified {
        client_id: client_id.to_string(),
        path: addr.to_string(),
        data: msg.data.clone(),
    });
    if ctx
        .apply_update(client_id, &addr, &msg.data, Apply::KnownPathsOnly)
        .is_some()
    {
        ctx.directory.persist(client_id)?;
    }
    ctx.reply(constants::NOTIFY, client_id, msg.trans_id, RspCode::Changed).await
}

async fn on_update(
    ctx: &GatewayContext,
    client_id: &str,
    msg: UpdateMsg,
) -> Result<()> {
    let Some(record) = ctx.directory.lookup(client_id) else {
        return Ok(());
    };
    let diff = device_attribute_diff(&record, &msg.attrs());
    apply_attrs(ctx, client_id, &diff, msg.port);
    if diff.lifetime.is_some() {
        ctx.directory.touch_liveness(client_id);
    }
    ctx.directory.persist(client_id)?;
    ctx.reply(constants::UPDATE, client_id, msg.trans_id, RspCode::Changed).await?;

    if diff.is_empty() {
        return Ok(());
    }
    ctx.emit(GatewayEvent::DeviceUpdated {
        client_id: client_id.to_string(),
        diff: diff.clone(),
    });
    if diff.obj_list.is_some() {
        refresh_objects(ctx, client_id).await?;
    }
    Ok(())
}

fn on_response(
    ctx: &GatewayContext,
    client_id: &str,
    msg: ResponseMsg,
) {
    let settled = ctx.correlator.settle(
        client_id,
        msg.trans_id,
        DeviceResponse::new(msg.status, msg.data),
    );
    if !settled {
        debug!(%client_id, trans_id = msg.trans_id, cmd = ?msg.cmd_id, "response matched nothing");
    }
}

fn on_lwt(
    ctx: &GatewayContext,
    client_id: &str,
    data: String,
) -> Result<()> {
    info!(%client_id, "last will received");
    ctx.directory.set_status(client_id, DeviceStatus::Offline)?;
    ctx.emit(GatewayEvent::LastWill {
        client_id: client_id.to_string(),
        data: Value::String(data),
    });
    Ok(())
}

