//! Gateway-initiated requests and the shadow bookkeeping that follows their
//! responses.

use bytes::Bytes;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::GatewayContext;
use crate::codec::is_good_response;
use crate::codec::parse_path;
use crate::codec::resource_key;
use crate::codec::resource_num;
use crate::codec::Command;
use crate::codec::Depth;
use crate::codec::Id;
use crate::codec::ResourceAddress;
use crate::codec::RspCode;
use crate::constants::ANNOUNCE;
use crate::diff;
use crate::diff::Diff;
use crate::DeviceResponse;
use crate::DeviceStatus;
use crate::GatewayEvent;
use crate::Result;

/// Observation attributes a device understands.
pub const WRITE_ATTRS: [&str; 6] = ["pmin", "pmax", "gt", "lt", "stp", "cancel"];

/// How a response payload is folded into the shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Apply {
    /// Device reports are authoritative and may add resources.
    Report,
    /// Writes may only touch resources the shadow already has.
    KnownPathsOnly,
}

fn local(code: RspCode) -> DeviceResponse {
    DeviceResponse::status(code.code())
}

/// Rewrites resource keys of one instance into shadow keys.
fn shadow_instance(
    oid: &Id,
    value: &Value,
) -> Option<Value> {
    let Value::Object(resources) = value else {
        return None;
    };
    let keyed: Map<String, Value> = resources
        .iter()
        .map(|(rid, v)| (resource_key(oid, &Id::parse(rid)), v.clone()))
        .collect();
    Some(Value::Object(keyed))
}

/// Rewrites resource keys of one instance into numeric wire ids.
fn wire_instance(
    oid: &Id,
    value: &Value,
) -> Value {
    match value {
        Value::Object(resources) => Value::Object(
            resources
                .iter()
                .map(|(rid, v)| (resource_num(oid, &Id::parse(rid)).to_string(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Narrows an object-level diff down to what sits under `addr`.
fn diff_at(
    addr: &ResourceAddress,
    object_diff: &Diff,
) -> Option<Value> {
    let Some(iid) = addr.instance_key() else {
        return Some(Value::Object(object_diff.clone()));
    };
    let instance = object_diff.get(&iid)?;
    match addr.resource_key() {
        Some(rid) => instance.get(&rid).cloned(),
        None => Some(instance.clone()),
    }
}

impl GatewayContext {
    /// Local verdict for a device that cannot be asked right now.
    fn unreachable(
        &self,
        client_id: &str,
    ) -> Option<DeviceResponse> {
        match self.directory.lookup(client_id) {
            None => Some(local(RspCode::NotFound)),
            Some(record) if record.status != DeviceStatus::Online => {
                debug!(%client_id, status = %record.status, "device not reachable");
                Some(local(RspCode::Timeout))
            }
            Some(_) => None,
        }
    }

    /// Folds `data`, as reported for `addr`, into the shadow. Returns the
    /// diff under `addr` when anything changed.
    pub(crate) fn apply_update(
        &self,
        client_id: &str,
        addr: &ResourceAddress,
        data: &Value,
        mode: Apply,
    ) -> Option<Value> {
        let oid = &addr.oid;
        let object_key = addr.object_key();

        let applied = self.directory.with_record(client_id, |record| {
            let reference = record
                .shadow
                .get(&object_key)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            let mut changes = match (addr.depth(), addr.instance_key(), addr.resource_key()) {
                (Depth::Resource, Some(iid), Some(rid)) => {
                    let current = reference.get(&iid).and_then(|i| i.get(&rid));
                    let value = match (current, mode) {
                        (Some(old), _) => diff::resource_diff(old, data),
                        (None, Apply::Report) => Some(data.clone()),
                        (None, Apply::KnownPathsOnly) => None,
                    };
                    let mut changes = Diff::new();
                    if let Some(value) = value {
                        let mut instance = Map::new();
                        instance.insert(rid, value);
                        changes.insert(iid, Value::Object(instance));
                    }
                    changes
                }
                (Depth::Instance, Some(iid), _) => {
                    let Some(instance) = shadow_instance(oid, data) else {
                        return None;
                    };
                    let mut candidate = Map::new();
                    candidate.insert(iid, instance);
                    fold(&reference, &Value::Object(candidate), mode)
                }
                _ => {
                    let Value::Object(instances) = data else {
                        return None;
                    };
                    let candidate: Map<String, Value> = instances
                        .iter()
                        .filter_map(|(iid, v)| shadow_instance(oid, v).map(|v| (iid.clone(), v)))
                        .collect();
                    fold(&reference, &Value::Object(candidate), mode)
                }
            };

            changes.retain(|iid, _| record.declares(oid, Some(&Id::parse(iid))));
            if changes.is_empty() {
                return None;
            }
            record.merge_object(oid, &changes);
            Some(changes)
        });

        let changes = applied.flatten()?;
        let data = diff_at(addr, &changes)?;
        debug!(%client_id, path = %addr, "shadow updated");
        self.emit(GatewayEvent::ResourceUpdated {
            client_id: client_id.to_string(),
            path: addr.to_string(),
            data: data.clone(),
        });
        Some(data)
    }

    /// Read without the reachability check; applies a `205` payload.
    async fn read_at(
        &self,
        client_id: &str,
        addr: &ResourceAddress,
    ) -> Result<(DeviceResponse, bool)> {
        let rsp = self.request(client_id, Command::Read, Some(addr), None).await?;
        let mut changed = false;
        if rsp.status == RspCode::Content.code() {
            if let Some(data) = &rsp.data {
                changed = self.apply_update(client_id, addr, data, Apply::Report).is_some();
            }
        }
        Ok((rsp, changed))
    }

    pub async fn read_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        let (rsp, changed) = self.read_at(client_id, &addr).await?;
        if changed && self.is_registered(client_id) {
            self.directory.persist(client_id)?;
        }
        Ok(rsp)
    }

    pub async fn write_req(
        &self,
        client_id: &str,
        path: &str,
        value: Value,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        match addr.depth() {
            Depth::Object => return Ok(local(RspCode::MethodNotAllowed)),
            Depth::Instance if !value.is_object() => return Ok(local(RspCode::BadRequest)),
            _ => {}
        }
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }

        let exists = self
            .directory
            .lookup(client_id)
            .map(|record| {
                record
                    .shadow_value(
                        &addr.object_key(),
                        addr.instance_key().as_deref(),
                        addr.resource_key().as_deref(),
                    )
                    .is_some()
            })
            .unwrap_or(false);
        if !exists {
            return Ok(local(RspCode::NotFound));
        }

        let wire = match addr.depth() {
            Depth::Instance => wire_instance(&addr.oid, &value),
            _ => value.clone(),
        };
        let rsp = self.request(client_id, Command::Write, Some(&addr), Some(wire)).await?;

        if rsp.status == RspCode::Changed.code() {
            let written = rsp.data.as_ref().unwrap_or(&value);
            if self
                .apply_update(client_id, &addr, written, Apply::KnownPathsOnly)
                .is_some()
            {
                self.directory.persist(client_id)?;
            }
        }
        Ok(rsp)
    }

    pub async fn write_attrs_req(
        &self,
        client_id: &str,
        path: &str,
        attrs: Value,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        let valid = match &attrs {
            Value::Object(map) => map.keys().all(|k| WRITE_ATTRS.contains(&k.as_str())),
            _ => false,
        };
        if !valid {
            return Ok(local(RspCode::BadRequest));
        }
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::WriteAttrs, Some(&addr), Some(attrs)).await
    }

    pub async fn discover_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::Discover, Some(&addr), None).await
    }

    pub async fn execute_req(
        &self,
        client_id: &str,
        path: &str,
        args: Option<Value>,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        if addr.depth() != Depth::Resource {
            return Ok(local(RspCode::MethodNotAllowed));
        }
        if args.as_ref().is_some_and(|a| !a.is_array()) {
            return Ok(local(RspCode::BadRequest));
        }
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::Execute, Some(&addr), args).await
    }

    pub async fn observe_req(
        &self,
        client_id: &str,
        path: &str,
    ) -> Result<DeviceResponse> {
        let addr = parse_path(path)?;
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::Observe, Some(&addr), None).await
    }

    pub async fn ping_req(
        &self,
        client_id: &str,
    ) -> Result<DeviceResponse> {
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::Ping, None, None).await
    }

    pub async fn identify_req(
        &self,
        client_id: &str,
    ) -> Result<DeviceResponse> {
        if let Some(rsp) = self.unreachable(client_id) {
            return Ok(rsp);
        }
        self.request(client_id, Command::Identify, None, None).await
    }

    /// Broadcasts on `announce`; nothing waits for an answer.
    pub async fn announce(
        &self,
        message: &str,
    ) -> Result<()> {
        self.transport
            .publish(ANNOUNCE, 0, Bytes::copy_from_slice(message.as_bytes()))
            .await
    }

    fn is_registered(
        &self,
        client_id: &str,
    ) -> bool {
        self.directory
            .lookup(client_id)
            .is_some_and(|record| record.is_registered())
    }

    /// Reads every declared object once. Returns `false` as soon as the
    /// device answers one read with a failure status.
    pub(crate) async fn bootstrap(
        &self,
        client_id: &str,
    ) -> Result<bool> {
        let Some(record) = self.directory.lookup(client_id) else {
            return Ok(false);
        };
        for oid in record.obj_list.keys() {
            let addr = ResourceAddress::object(oid.clone());
            let (rsp, _) = self.read_at(client_id, &addr).await?;
            if !is_good_response(rsp.status) {
                warn!(%client_id, path = %addr, status = rsp.status, "object detail read failed");
                return Ok(false);
            }
        }
        info!(%client_id, objects = record.obj_list.len(), "object details loaded");
        Ok(true)
    }

    /// Refreshes the shadow of a device that came back, persisting whatever
    /// changed.
    pub(crate) async fn maintain(
        &self,
        client_id: &str,
    ) -> Result<()> {
        let Some(record) = self.directory.lookup(client_id) else {
            return Ok(());
        };
        let mut changed = false;
        for oid in record.obj_list.keys() {
            let addr = ResourceAddress::object(oid.clone());
            match self.read_at(client_id, &addr).await {
                Ok((_, object_changed)) => changed |= object_changed,
                Err(e) => {
                    warn!(%client_id, path = %addr, "maintain read failed: {:?}", e);
                    break;
                }
            }
        }
        if changed {
            self.directory.persist(client_id)?;
        }
        Ok(())
    }
}

fn fold(
    reference: &Value,
    candidate: &Value,
    mode: Apply,
) -> Diff {
    match mode {
        Apply::Report => diff::object_diff(reference, candidate),
        Apply::KnownPathsOnly => diff::instance_diff(reference, candidate),
    }
}
