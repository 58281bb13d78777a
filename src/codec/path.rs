use std::fmt;

use super::object_key;
use super::resolve_object_alias;
use super::resolve_resource_alias;
use super::resource_key;
use super::Id;
use crate::ProtocolError;
use crate::Result;

/// How deep an address reaches into the resource tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Object,
    Instance,
    Resource,
}

/// `{oid, iid?, rid?}`. The constructor guarantees `rid` implies `iid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    pub oid: Id,
    pub iid: Option<Id>,
    pub rid: Option<Id>,
}

impl ResourceAddress {
    pub fn object(oid: impl Into<Id>) -> Self {
        Self {
            oid: super::object_num(&oid.into()),
            iid: None,
            rid: None,
        }
    }

    pub fn instance(
        oid: impl Into<Id>,
        iid: impl Into<Id>,
    ) -> Self {
        Self {
            oid: super::object_num(&oid.into()),
            iid: Some(iid.into()),
            rid: None,
        }
    }

    pub fn resource(
        oid: impl Into<Id>,
        iid: impl Into<Id>,
        rid: impl Into<Id>,
    ) -> Self {
        let oid = oid.into();
        let rid = super::resource_num(&oid, &rid.into());
        Self {
            oid: super::object_num(&oid),
            iid: Some(iid.into()),
            rid: Some(rid),
        }
    }

    pub fn depth(&self) -> Depth {
        classify_depth(self)
    }

    /// Shadow key of the object.
    pub fn object_key(&self) -> String {
        object_key(&self.oid)
    }

    /// Shadow key of the instance, if addressed.
    pub fn instance_key(&self) -> Option<String> {
        self.iid.as_ref().map(Id::to_string)
    }

    /// Shadow key of the resource, if addressed.
    pub fn resource_key(&self) -> Option<String> {
        self.rid.as_ref().map(|rid| resource_key(&self.oid, rid))
    }
}

impl fmt::Display for ResourceAddress {
    /// Canonical `/oid/iid/rid` form with numeric ids where known.
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "/{}", self.oid)?;
        if let Some(iid) = &self.iid {
            write!(f, "/{iid}")?;
        }
        if let Some(rid) = &self.rid {
            write!(f, "/{rid}")?;
        }
        Ok(())
    }
}

/// Parses `oid[/iid[/rid]]`.
///
/// Both `/` and `.` separate segments, and leading or trailing separators
/// are ignored, so `"/3303/0/5700/"`, `"3303.0.5700"` and
/// `"temperature/0/sensorValue"` all name the same resource.
pub fn parse_path(path: &str) -> Result<ResourceAddress> {
    let normalized = path.replace('.', "/");
    let trimmed = normalized.trim_matches('/');

    if trimmed.is_empty() {
        return Err(ProtocolError::InvalidPath(path.to_string()).into());
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() > 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ProtocolError::InvalidPath(path.to_string()).into());
    }

    let oid = resolve_object_alias(segments[0]);
    let iid = segments.get(1).map(|s| Id::parse(s));
    let rid = segments.get(2).map(|s| resolve_resource_alias(&oid, s));

    Ok(ResourceAddress { oid, iid, rid })
}

pub fn classify_depth(addr: &ResourceAddress) -> Depth {
    match (&addr.iid, &addr.rid) {
        (Some(_), Some(_)) => Depth::Resource,
        (Some(_), None) => Depth::Instance,
        _ => Depth::Object,
    }
}
