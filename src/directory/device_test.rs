use serde_json::json;

use super::*;
use crate::codec::Id;
use crate::test_utils::obj_list;
use crate::test_utils::shadow;

fn device() -> DeviceRecord {
    let attrs = DeviceAttrs {
        mac: Some("aa:bb".into()),
        version: Some("1.0".into()),
        ..Default::default()
    };
    DeviceRecord::new("dev-1", obj_list(&[(3, &[0]), (3303, &[0, 1])]), &attrs)
}

#[test]
fn new_record_starts_online_with_default_lifetime() {
    let record = device();

    assert_eq!(record.status, DeviceStatus::Online);
    assert_eq!(record.lifetime, DEFAULT_LIFETIME_SECS);
    assert_eq!(record.mac, "aa:bb");
    assert!(!record.is_registered());
    assert!(record.join_time > 0);
}

#[test]
fn declares_checks_object_and_instance() {
    let record = device();

    assert!(record.declares(&Id::Num(3303), None));
    assert!(record.declares(&Id::Num(3303), Some(&Id::Num(1))));
    assert!(record.declares(&Id::Name("temperature".into()), Some(&Id::Num(0))));
    assert!(!record.declares(&Id::Num(3303), Some(&Id::Num(2))));
    assert!(!record.declares(&Id::Num(3304), None));
}

#[test]
fn merge_object_drops_undeclared_instances() {
    let mut record = device();
    let diff = shadow(json!({"0": {"sensorValue": 20}, "7": {"sensorValue": 99}}));

    record.merge_object(&Id::Num(3303), &diff);

    assert_eq!(
        serde_json::Value::Object(record.shadow.clone()),
        json!({"temperature": {"0": {"sensorValue": 20}}})
    );
    assert!(record.is_registered());
}

#[test]
fn merge_object_ignores_undeclared_object() {
    let mut record = device();
    record.merge_object(&Id::Num(3304), &shadow(json!({"0": {"sensorValue": 1}})));
    assert!(record.shadow.is_empty());
}

#[test]
fn shadow_value_walks_object_instance_resource() {
    let mut record = device();
    record.shadow = shadow(json!({"temperature": {"0": {"sensorValue": 20}}}));

    assert_eq!(
        record.shadow_value("temperature", Some("0"), Some("sensorValue")),
        Some(&json!(20))
    );
    assert!(record.shadow_value("temperature", Some("1"), None).is_none());
    assert!(record.shadow_value("device", None, None).is_none());
}

#[test]
fn apply_attrs_prunes_shadow_when_object_list_shrinks() {
    let mut record = device();
    record.shadow = shadow(json!({
        "device": {"0": {"manuf": "acme"}},
        "temperature": {"0": {"sensorValue": 20}, "1": {"sensorValue": 21}}
    }));

    record.apply_attrs(&DeviceAttrs {
        lifetime: Some(300),
        obj_list: Some(obj_list(&[(3303, &[1])])),
        ..Default::default()
    });

    assert_eq!(record.lifetime, 300);
    assert_eq!(
        serde_json::Value::Object(record.shadow.clone()),
        json!({"temperature": {"1": {"sensorValue": 21}}})
    );
}

#[test]
fn record_serializes_with_camel_case_keys_and_lowercase_status() {
    let mut record = device();
    record.status = DeviceStatus::Sleeping;

    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(value["clientId"], json!("dev-1"));
    assert_eq!(value["status"], json!("sleeping"));
    assert_eq!(value["objList"], json!({"3": [0], "3303": [0, 1]}));

    let back: DeviceRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
}
