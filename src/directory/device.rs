use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::codec::object_key;
use crate::codec::Id;
use crate::diff;
use crate::utils::time::get_now_as_u64;

/// Declared objects: object id to the instance ids it exposes.
pub type ObjList = BTreeMap<Id, Vec<Id>>;

/// Lifetime assumed when a device registers without declaring one.
pub const DEFAULT_LIFETIME_SECS: u64 = 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Sleeping,
}

impl fmt::Display for DeviceStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Sleeping => "sleeping",
        })
    }
}

/// Attributes a device declares on `register` and `update`. Keys the gateway
/// does not know are dropped during decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj_list: Option<ObjList>,
}

impl DeviceAttrs {
    pub fn is_empty(&self) -> bool {
        self == &DeviceAttrs::default()
    }
}

/// Everything the gateway knows about one device. This is also the
/// persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub client_id: String,
    #[serde(default)]
    pub mac: String,
    pub lifetime: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub obj_list: ObjList,
    pub status: DeviceStatus,
    pub join_time: u64,
    #[serde(default)]
    pub shadow: Map<String, Value>,
}

impl DeviceRecord {
    /// A freshly registered device. Its shadow is empty until the object
    /// detail bootstrap fills it in.
    pub fn new(
        client_id: &str,
        obj_list: ObjList,
        attrs: &DeviceAttrs,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            mac: attrs.mac.clone().unwrap_or_default(),
            lifetime: attrs.lifetime.unwrap_or(DEFAULT_LIFETIME_SECS),
            version: attrs.version.clone().unwrap_or_default(),
            ip: attrs.ip.clone(),
            port: None,
            obj_list,
            status: DeviceStatus::Online,
            join_time: get_now_as_u64(),
            shadow: Map::new(),
        }
    }

    /// Applies an attribute diff to the record.
    pub fn apply_attrs(
        &mut self,
        attrs: &DeviceAttrs,
    ) {
        if let Some(lifetime) = attrs.lifetime {
            self.lifetime = lifetime;
        }
        if let Some(version) = &attrs.version {
            self.version = version.clone();
        }
        if let Some(ip) = &attrs.ip {
            self.ip = Some(ip.clone());
        }
        if let Some(mac) = &attrs.mac {
            self.mac = mac.clone();
        }
        if let Some(obj_list) = &attrs.obj_list {
            self.obj_list = obj_list.clone();
            self.prune_shadow();
        }
    }

    /// A record with an empty shadow never finished registration.
    pub fn is_registered(&self) -> bool {
        !self.shadow.is_empty()
    }

    pub fn declares(
        &self,
        oid: &Id,
        iid: Option<&Id>,
    ) -> bool {
        let oid = crate::codec::object_num(oid);
        match self.obj_list.get(&oid) {
            Some(iids) => iid.map_or(true, |iid| iids.contains(iid)),
            None => false,
        }
    }

    /// Merges a diff under one object of the shadow, dropping instances the
    /// device never declared.
    pub fn merge_object(
        &mut self,
        oid: &Id,
        diff: &diff::Diff,
    ) {
        let allowed: diff::Diff = diff
            .iter()
            .filter(|(iid, _)| self.declares(oid, Some(&Id::parse(iid))))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if allowed.is_empty() {
            return;
        }
        let entry = self
            .shadow
            .entry(object_key(oid))
            .or_insert_with(|| Value::Object(Map::new()));
        diff::merge(entry, &allowed);
    }

    /// Current value under an object key, instance key and optional
    /// resource key.
    pub fn shadow_value(
        &self,
        object: &str,
        instance: Option<&str>,
        resource: Option<&str>,
    ) -> Option<&Value> {
        let mut node = self.shadow.get(object)?;
        if let Some(iid) = instance {
            node = node.get(iid)?;
        }
        if let Some(rid) = resource {
            node = node.get(rid)?;
        }
        Some(node)
    }

    /// Drops every shadow object or instance no longer in the object list.
    fn prune_shadow(&mut self) {
        let obj_list = self.obj_list.clone();
        self.shadow.retain(|key, _| obj_list.keys().any(|oid| object_key(oid) == *key));
        for (oid, iids) in &obj_list {
            if let Some(Value::Object(instances)) = self.shadow.get_mut(&object_key(oid)) {
                instances.retain(|iid, _| iids.contains(&Id::parse(iid)));
            }
        }
    }

    /// Attribute view used by listings.
    pub fn attrs(&self) -> DeviceAttrs {
        DeviceAttrs {
            lifetime: Some(self.lifetime),
            version: Some(self.version.clone()),
            ip: self.ip.clone(),
            mac: Some(self.mac.clone()),
            obj_list: Some(self.obj_list.clone()),
        }
    }
}
