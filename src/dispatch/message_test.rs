use bytes::Bytes;
use serde_json::json;

use super::*;
use crate::codec::Command;
use crate::codec::Id;
use crate::test_utils::obj_list;

fn decode_json(
    channel: Channel,
    payload: serde_json::Value,
) -> ChannelMessage {
    let topic = format!("{}/dev-1", channel.as_str());
    decode(&channel, &topic, &Bytes::from(payload.to_string()))
}

#[test]
fn channel_parse_round_trips_known_names() {
    for name in ["register", "deregister", "schedule", "notify", "update", "response", "ping", "lwt"] {
        assert_eq!(Channel::parse(name).as_str(), name);
    }
    assert_eq!(Channel::parse("weather"), Channel::Other("weather".into()));
}

#[test]
fn register_decodes_object_list_with_mixed_id_forms() {
    let msg = decode_json(
        Channel::Register,
        json!({
            "transId": 7,
            "lifetime": 86400,
            "mac": "aa:bb",
            "port": 5683,
            "objList": {"3": [0], "3303": ["0", 1]}
        }),
    );

    let ChannelMessage::Register(register) = msg else {
        panic!("expected register, got {msg:?}");
    };
    assert_eq!(register.trans_id, Some(7));
    assert_eq!(register.port, Some(5683));
    let attrs = register.attrs();
    assert_eq!(attrs.lifetime, Some(86400));
    assert_eq!(attrs.obj_list, Some(obj_list(&[(3, &[0]), (3303, &[0, 1])])));
}

#[test]
fn schedule_declares_sleep_only_when_asked() {
    let asleep = decode_json(Channel::Schedule, json!({"transId": 1, "sleep": true, "duration": 30}));
    let awake = decode_json(Channel::Schedule, json!({"transId": 2, "sleep": false}));

    assert!(asleep.declares_sleep());
    assert!(!awake.declares_sleep());
    assert_eq!(
        asleep,
        ChannelMessage::Schedule(ScheduleMsg {
            trans_id: Some(1),
            sleep: true,
            duration: Some(30),
        })
    );
}

#[test]
fn notify_keeps_ids_as_sent() {
    let msg = decode_json(
        Channel::Notify,
        json!({"transId": 3, "oid": "temperature", "iid": "0", "rid": 5700, "data": 21.5}),
    );

    let ChannelMessage::Notify(notify) = msg else {
        panic!("expected notify, got {msg:?}");
    };
    assert_eq!(notify.oid, Id::Name("temperature".into()));
    assert_eq!(notify.iid, Some(Id::Num(0)));
    assert_eq!(notify.rid, Some(Id::Num(5700)));
    assert_eq!(notify.data, json!(21.5));
}

#[test]
fn response_accepts_numeric_or_named_command() {
    let numeric = decode_json(Channel::Response, json!({"transId": 9, "cmdId": 0, "status": 205, "data": 1}));
    let named = decode_json(Channel::Response, json!({"transId": 9, "cmdId": "write", "status": 204}));

    assert_eq!(
        numeric,
        ChannelMessage::Response(ResponseMsg {
            trans_id: 9,
            cmd_id: Some(Command::Read),
            status: 205,
            data: Some(json!(1)),
        })
    );
    let ChannelMessage::Response(named) = named else {
        panic!("expected response");
    };
    assert_eq!(named.cmd_id, Some(Command::Write));
    assert_eq!(named.data, None);
}

#[test]
fn response_without_trans_id_is_bad_message() {
    let msg = decode_json(Channel::Response, json!({"status": 205}));
    assert!(matches!(msg, ChannelMessage::BadMessage { ref channel, .. } if channel == "response"));
}

#[test]
fn non_object_payload_is_bad_message() {
    let channel = Channel::Ping;
    let msg = decode(&channel, "ping/dev-1", &Bytes::from_static(b"[1,2,3]"));
    assert!(matches!(msg, ChannelMessage::BadMessage { .. }));

    let msg = decode(&channel, "ping/dev-1", &Bytes::from_static(b"{not json"));
    assert!(matches!(msg, ChannelMessage::BadMessage { ref channel, .. } if channel == "ping"));
}

#[test]
fn lwt_carries_raw_text() {
    let msg = decode(&Channel::Lwt, "lwt/dev-1", &Bytes::from_static(b"bye, not json"));
    assert_eq!(
        msg,
        ChannelMessage::Lwt {
            data: "bye, not json".into()
        }
    );
}

#[test]
fn other_channel_keeps_topic_and_payload() {
    let payload = Bytes::from_static(b"\x00\x01");
    let msg = decode(&Channel::Other("weather".into()), "weather/station", &payload);
    assert_eq!(
        msg,
        ChannelMessage::Other {
            topic: "weather/station".into(),
            payload,
        }
    );
}

#[test]
fn peek_trans_id_reads_partially_valid_payloads() {
    assert_eq!(peek_trans_id(br#"{"transId": 12, "oid": null}"#), Some(12));
    assert_eq!(peek_trans_id(br#"{"transId": "12"}"#), None);
    assert_eq!(peek_trans_id(b"garbage"), None);
}

#[test]
fn request_serializes_numeric_command_and_skips_absent_ids() {
    let request = RequestMsg {
        trans_id: 4,
        cmd_id: Command::Execute,
        oid: Some(Id::Num(3)),
        iid: Some(Id::Num(0)),
        rid: Some(Id::Num(4)),
        data: None,
    };
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({"transId": 4, "cmdId": 4, "oid": 3, "iid": 0, "rid": 4})
    );

    let ping = RequestMsg {
        trans_id: 5,
        cmd_id: Command::Ping,
        oid: None,
        iid: None,
        rid: None,
        data: None,
    };
    assert_eq!(serde_json::to_value(&ping).unwrap(), json!({"transId": 5, "cmdId": 7}));
}

#[test]
fn reply_serializes_null_trans_id() {
    let reply = ReplyMsg {
        trans_id: None,
        status: 404,
    };
    assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"transId": null, "status": 404}));
}
