use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::codec::Command;
use crate::codec::Id;
use crate::constants;
use crate::DeviceAttrs;
use crate::ObjList;

/// First topic level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Register,
    Deregister,
    Schedule,
    Notify,
    Update,
    Response,
    Ping,
    Lwt,
    Other(String),
}

impl Channel {
    pub fn parse(name: &str) -> Self {
        match name {
            constants::REGISTER => Channel::Register,
            constants::DEREGISTER => Channel::Deregister,
            constants::SCHEDULE => Channel::Schedule,
            constants::NOTIFY => Channel::Notify,
            constants::UPDATE => Channel::Update,
            constants::RESPONSE => Channel::Response,
            constants::PING => Channel::Ping,
            constants::LWT => Channel::Lwt,
            other => Channel::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Channel::Register => constants::REGISTER,
            Channel::Deregister => constants::DEREGISTER,
            Channel::Schedule => constants::SCHEDULE,
            Channel::Notify => constants::NOTIFY,
            Channel::Update => constants::UPDATE,
            Channel::Response => constants::RESPONSE,
            Channel::Ping => constants::PING,
            Channel::Lwt => constants::LWT,
            Channel::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMsg {
    #[serde(default)]
    pub trans_id: Option<u32>,
    #[serde(default)]
    pub lifetime: Option<u64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub obj_list: Option<ObjList>,
}

impl RegisterMsg {
    pub fn attrs(&self) -> DeviceAttrs {
        DeviceAttrs {
            lifetime: self.lifetime,
            version: self.version.clone(),
            ip: self.ip.clone(),
            mac: self.mac.clone(),
            obj_list: self.obj_list.clone(),
        }
    }
}

/// `update` carries the same optional attributes as `register`.
pub type UpdateMsg = RegisterMsg;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMsg {
    #[serde(default)]
    pub trans_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMsg {
    #[serde(default)]
    pub trans_id: Option<u32>,
    #[serde(default)]
    pub sleep: bool,
    /// Seconds
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyMsg {
    #[serde(default)]
    pub trans_id: Option<u32>,
    pub oid: Id,
    #[serde(default)]
    pub iid: Option<Id>,
    #[serde(default)]
    pub rid: Option<Id>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMsg {
    pub trans_id: u32,
    #[serde(default, deserialize_with = "command_from_id")]
    pub cmd_id: Option<Command>,
    pub status: u16,
    #[serde(default)]
    pub data: Option<Value>,
}

fn command_from_id<'de, D>(deserializer: D) -> std::result::Result<Option<Command>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let id = Option::<Id>::deserialize(deserializer)?;
    Ok(id.map(|id| Command::from_id(&id)))
}

/// A decoded inbound message. Decoding fails closed: anything a structured
/// channel cannot parse becomes [`ChannelMessage::BadMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Register(RegisterMsg),
    Deregister(TransactionMsg),
    Schedule(ScheduleMsg),
    Notify(NotifyMsg),
    Update(UpdateMsg),
    Response(ResponseMsg),
    Ping(TransactionMsg),
    /// Raw text of the last will.
    Lwt { data: String },
    BadMessage { channel: String, reason: String },
    Other { topic: String, payload: Bytes },
}

impl ChannelMessage {
    /// Inbound transaction id, when the payload carried one.
    pub fn trans_id(&self) -> Option<u32> {
        match self {
            ChannelMessage::Register(m) | ChannelMessage::Update(m) => m.trans_id,
            ChannelMessage::Deregister(m) | ChannelMessage::Ping(m) => m.trans_id,
            ChannelMessage::Schedule(m) => m.trans_id,
            ChannelMessage::Notify(m) => m.trans_id,
            ChannelMessage::Response(m) => Some(m.trans_id),
            _ => None,
        }
    }

    /// A `schedule` that puts the device to sleep must not count as
    /// liveness traffic.
    pub fn declares_sleep(&self) -> bool {
        matches!(self, ChannelMessage::Schedule(ScheduleMsg { sleep: true, .. }))
    }
}

fn typed<T: DeserializeOwned>(
    channel: &Channel,
    body: Value,
    wrap: impl FnOnce(T) -> ChannelMessage,
) -> ChannelMessage {
    match serde_json::from_value::<T>(body) {
        Ok(msg) => wrap(msg),
        Err(e) => ChannelMessage::BadMessage {
            channel: channel.as_str().to_string(),
            reason: e.to_string(),
        },
    }
}

/// Decodes a decrypted payload for `channel`.
pub fn decode(
    channel: &Channel,
    topic: &str,
    payload: &Bytes,
) -> ChannelMessage {
    let parse: fn(&Channel, Value) -> ChannelMessage = match channel {
        Channel::Register => |c, body| typed(c, body, ChannelMessage::Register),
        Channel::Deregister => |c, body| typed(c, body, ChannelMessage::Deregister),
        Channel::Schedule => |c, body| typed(c, body, ChannelMessage::Schedule),
        Channel::Notify => |c, body| typed(c, body, ChannelMessage::Notify),
        Channel::Update => |c, body| typed(c, body, ChannelMessage::Update),
        Channel::Response => |c, body| typed(c, body, ChannelMessage::Response),
        Channel::Ping => |c, body| typed(c, body, ChannelMessage::Ping),
        Channel::Lwt => {
            return ChannelMessage::Lwt {
                data: String::from_utf8_lossy(payload).into_owned(),
            }
        }
        Channel::Other(_) => {
            return ChannelMessage::Other {
                topic: topic.to_string(),
                payload: payload.clone(),
            }
        }
    };

    let bad = |reason: String| ChannelMessage::BadMessage {
        channel: channel.as_str().to_string(),
        reason,
    };
    match serde_json::from_slice::<Value>(payload) {
        Ok(body @ Value::Object(_)) => parse(channel, body),
        Ok(_) => bad("payload is not a JSON object".to_string()),
        Err(e) => bad(e.to_string()),
    }
}

/// Best-effort `transId` from a payload that may not decode as a whole.
pub fn peek_trans_id(payload: &[u8]) -> Option<u32> {
    serde_json::from_slice::<Value>(payload)
        .ok()?
        .get("transId")?
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
}

/// `{transId, status}` reply published on `<channel>/response/<clientId>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMsg {
    pub trans_id: Option<u32>,
    pub status: u16,
}

/// Gateway request published on `request/<clientId>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMsg {
    pub trans_id: u32,
    pub cmd_id: Command,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oid: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iid: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
