//! Minimal structural diffs between a device shadow (the reference) and what a
//! device or caller proposes.
//!
//! A diff is a nested JSON object holding only the leaves that changed. It
//! never carries an unchanged subtree, so it can be merged into the shadow
//! and forwarded to listeners as-is.
//!
//! Arrays are leaves: they are compared and replaced whole. Empty objects
//! carry no leaves, so they never replace or clear a subtree.

use std::collections::BTreeSet;

use serde_json::Map;
use serde_json::Value;

use crate::directory::DeviceAttrs;
use crate::directory::DeviceRecord;
use crate::directory::ObjList;


pub type Diff = Map<String, Value>;

/// Every leaf of `candidate` that is absent from `reference` or carries a
/// different value there.
pub fn object_diff(
    reference: &Value,
    candidate: &Value,
) -> Diff {
    let mut diff = Diff::new();
    for (path, value) in leaf_paths(candidate) {
        if lookup(reference, &path) != Some(value) {
            set_path(&mut diff, &path, value.clone());
        }
    }
    diff
}

/// Like [`object_diff`], but first drops every leaf of `new` whose path does
/// not exist in `old`. Writes against a known schema can therefore never
/// introduce new resources.
pub fn instance_diff(
    old: &Value,
    new: &Value,
) -> Diff {
    object_diff(old, &Value::Object(strip_unknown_paths(old, new)))
}

/// Returns the value to store for a single resource, or `None` when nothing
/// changed.
pub fn resource_diff(
    old: &Value,
    new: &Value,
) -> Option<Value> {
    match (old, new) {
        (Value::Object(_), Value::Object(_)) => {
            let diff = instance_diff(old, new);
            (!diff.is_empty()).then_some(Value::Object(diff))
        }
        _ if std::mem::discriminant(old) != std::mem::discriminant(new) => Some(new.clone()),
        _ if old == new => None,
        _ => Some(new.clone()),
    }
}

/// Attributes in `attrs` that differ from the record. The object list is
/// compared per object as a set of instance ids.
pub fn device_attribute_diff(
    record: &DeviceRecord,
    attrs: &DeviceAttrs,
) -> DeviceAttrs {
    let changed = |new: &Option<String>, old: &String| new.as_ref().filter(|v| *v != old).cloned();

    DeviceAttrs {
        lifetime: attrs.lifetime.filter(|l| *l != record.lifetime),
        version: changed(&attrs.version, &record.version),
        ip: attrs.ip.as_ref().filter(|ip| record.ip.as_ref() != Some(*ip)).cloned(),
        mac: changed(&attrs.mac, &record.mac),
        obj_list: attrs
            .obj_list
            .as_ref()
            .filter(|list| !same_obj_list(list, &record.obj_list))
            .cloned(),
    }
}

pub fn same_obj_list(
    a: &ObjList,
    b: &ObjList,
) -> bool {
    a.len() == b.len()
        && a.iter().all(|(oid, iids)| match b.get(oid) {
            Some(other) => iids.iter().collect::<BTreeSet<_>>() == other.iter().collect::<BTreeSet<_>>(),
            None => false,
        })
}

/// Deep-merges `diff` into `target`, replacing leaves.
pub fn merge(
    target: &mut Value,
    diff: &Diff,
) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };
    for (key, value) in diff {
        if let (Some(existing), Value::Object(sub)) = (map.get_mut(key), value) {
            if existing.is_object() && !sub.is_empty() {
                merge(existing, sub);
                continue;
            }
        }
        map.insert(key.clone(), value.clone());
    }
}

fn leaf_paths(value: &Value) -> Vec<(Vec<String>, &Value)> {
    fn walk<'a>(
        value: &'a Value,
        prefix: &mut Vec<String>,
        out: &mut Vec<(Vec<String>, &'a Value)>,
    ) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    prefix.push(key.clone());
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
            _ => out.push((prefix.clone(), value)),
        }
    }

    let mut out = Vec::new();
    if value.is_object() {
        walk(value, &mut Vec::new(), &mut out);
    }
    out
}

fn lookup<'a>(
    root: &'a Value,
    path: &[String],
) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.as_object()?.get(key))
}

fn set_path(
    root: &mut Diff,
    path: &[String],
    value: Value,
) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let entry = node.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    node.insert(last.clone(), value);
}

fn strip_unknown_paths(
    old: &Value,
    new: &Value,
) -> Diff {
    let mut kept = Diff::new();
    for (path, value) in leaf_paths(new) {
        if lookup(old, &path).is_some() {
            set_path(&mut kept, &path, value.clone());
        }
    }
    kept
}
