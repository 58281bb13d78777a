//! Static id dictionaries: LWM2M core objects, IPSO smart objects, the
//! reusable IPSO resources, request commands and response codes.

use std::fmt;

use serde::Serialize;
use serde::Serializer;

use super::Id;

const OBJECTS: &[(u32, &str)] = &[
    (0, "lwm2mSecurity"),
    (1, "lwm2mServer"),
    (2, "accessControl"),
    (3, "device"),
    (4, "connMonitor"),
    (5, "firmware"),
    (6, "location"),
    (7, "connStatistics"),
    (3200, "dIn"),
    (3201, "dOut"),
    (3202, "aIn"),
    (3203, "aOut"),
    (3300, "generic"),
    (3301, "illuminance"),
    (3302, "presence"),
    (3303, "temperature"),
    (3304, "humidity"),
    (3305, "pwrMea"),
    (3306, "actuation"),
    (3308, "setPoint"),
    (3310, "loadCtrl"),
    (3311, "lightCtrl"),
    (3312, "pwrCtrl"),
    (3313, "accelerometer"),
    (3314, "magnetometer"),
    (3315, "barometer"),
];

// Object-specific resources of the LWM2M core objects.
const CORE_RESOURCES: &[(u32, &[(u32, &str)])] = &[
    (
        0,
        &[
            (0, "lwm2mServerURI"),
            (1, "bootstrapServer"),
            (2, "securityMode"),
            (3, "pubKeyId"),
            (4, "serverPubKeyId"),
            (5, "secretKey"),
            (6, "smsSecurityMode"),
            (7, "smsBindingKeyParam"),
            (8, "smsBindingSecretKey"),
            (9, "lwm2mServerSmsNum"),
            (10, "shortServerId"),
            (11, "clientHoldOffTime"),
        ],
    ),
    (
        1,
        &[
            (0, "shortServerId"),
            (1, "lifetime"),
            (2, "defaultMinPeriod"),
            (3, "defaultMaxPeriod"),
            (4, "disable"),
            (5, "disableTimeout"),
            (6, "notificationStoring"),
            (7, "binding"),
            (8, "regUpdateTrigger"),
        ],
    ),
    (2, &[(0, "objectId"), (1, "objectInstanceId"), (2, "ACL"), (3, "ACLOwner")]),
    (
        3,
        &[
            (0, "manuf"),
            (1, "model"),
            (2, "serial"),
            (3, "firmware"),
            (4, "reboot"),
            (5, "factoryReset"),
            (6, "availPwrSrc"),
            (7, "pwrSrcVoltage"),
            (8, "pwrSrcCurrent"),
            (9, "battLevel"),
            (10, "memFree"),
            (11, "errCode"),
            (12, "resetErrCode"),
            (13, "currTime"),
            (14, "UTCOffset"),
            (15, "timezone"),
            (16, "supportedBinding"),
            (17, "devType"),
            (18, "hwVer"),
            (19, "swVer"),
            (20, "batteryStatus"),
            (21, "memTotal"),
        ],
    ),
    (
        4,
        &[
            (0, "networkBearer"),
            (1, "availNetworkBearer"),
            (2, "radioSignalStrength"),
            (3, "linkQuality"),
            (4, "ip"),
            (5, "routerIp"),
            (6, "linkUtilization"),
            (7, "APN"),
            (8, "cellId"),
            (9, "SMNC"),
            (10, "SMCC"),
        ],
    ),
    (
        5,
        &[
            (0, "package"),
            (1, "packageURI"),
            (2, "update"),
            (3, "state"),
            (4, "updateSupportedObjects"),
            (5, "updateResult"),
        ],
    ),
    (
        6,
        &[
            (0, "latitude"),
            (1, "longitude"),
            (2, "altitude"),
            (3, "uncertainty"),
            (4, "velocity"),
            (5, "timestamp"),
        ],
    ),
    (
        7,
        &[
            (0, "SMSTxCounter"),
            (1, "SMSRxCounter"),
            (2, "txData"),
            (3, "rxData"),
            (4, "maxMessageSize"),
            (5, "averageMessageSize"),
            (6, "startOrReset"),
        ],
    ),
];

// IPSO reusable resources: the same ids mean the same thing in every object.
const IPSO_RESOURCES: &[(u32, &str)] = &[
    (5500, "dInState"),
    (5501, "counter"),
    (5502, "dInPolarity"),
    (5503, "debouncePeriod"),
    (5504, "edgeSelection"),
    (5505, "counterReset"),
    (5550, "dOutState"),
    (5551, "dOutPolarity"),
    (5600, "aInCurrValue"),
    (5601, "minMeaValue"),
    (5602, "maxMeaValue"),
    (5603, "minRangeValue"),
    (5604, "maxRangeValue"),
    (5605, "resetMinMaxMeaValues"),
    (5650, "aOutCurrValue"),
    (5700, "sensorValue"),
    (5701, "units"),
    (5702, "xValue"),
    (5703, "yValue"),
    (5704, "zValue"),
    (5706, "colour"),
    (5750, "appType"),
    (5751, "sensorType"),
    (5800, "instActivePwr"),
    (5801, "minMeaActivePwr"),
    (5802, "maxMeaActivePwr"),
    (5805, "cumulActivePwr"),
    (5850, "onOff"),
    (5851, "dimmer"),
    (5852, "onTime"),
    (5900, "setPointValue"),
];

fn name_of(
    table: &[(u32, &'static str)],
    num: u32,
) -> Option<&'static str> {
    table.iter().find(|(n, _)| *n == num).map(|(_, name)| *name)
}

fn num_of(
    table: &[(u32, &'static str)],
    name: &str,
) -> Option<u32> {
    table.iter().find(|(_, s)| *s == name).map(|(n, _)| *n)
}

fn core_resources(oid: u32) -> Option<&'static [(u32, &'static str)]> {
    CORE_RESOURCES.iter().find(|(o, _)| *o == oid).map(|(_, table)| *table)
}

/// Canonical (numeric when known) form of an object id token.
pub fn resolve_object_alias(token: &str) -> Id {
    object_num(&Id::parse(token))
}

/// Canonical (numeric when known) form of a resource id token within `oid`.
pub fn resolve_resource_alias(
    oid: &Id,
    token: &str,
) -> Id {
    resource_num(oid, &Id::parse(token))
}

pub fn object_num(oid: &Id) -> Id {
    match oid {
        Id::Name(name) => num_of(OBJECTS, name).map(Id::Num).unwrap_or_else(|| oid.clone()),
        Id::Num(_) => oid.clone(),
    }
}

/// Key used for the object inside a device shadow: the alias when known.
pub fn object_key(oid: &Id) -> String {
    match object_num(oid) {
        Id::Num(n) => name_of(OBJECTS, n).map(str::to_string).unwrap_or_else(|| n.to_string()),
        Id::Name(name) => name,
    }
}

pub fn resource_num(
    oid: &Id,
    rid: &Id,
) -> Id {
    let Id::Name(name) = rid else {
        return rid.clone();
    };
    let from_core = object_num(oid)
        .as_num()
        .and_then(core_resources)
        .and_then(|table| num_of(table, name));

    match from_core.or_else(|| num_of(IPSO_RESOURCES, name)) {
        Some(n) => Id::Num(n),
        None => rid.clone(),
    }
}

/// Key used for the resource inside a device shadow: the alias when known.
pub fn resource_key(
    oid: &Id,
    rid: &Id,
) -> String {
    match resource_num(oid, rid) {
        Id::Num(n) => {
            let from_core = object_num(oid)
                .as_num()
                .and_then(core_resources)
                .and_then(|table| name_of(table, n));
            from_core
                .or_else(|| name_of(IPSO_RESOURCES, n))
                .map(str::to_string)
                .unwrap_or_else(|| n.to_string())
        }
        Id::Name(name) => name,
    }
}

/// Request commands, carried on the wire as `cmdId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Read,
    Write,
    Discover,
    WriteAttrs,
    Execute,
    Observe,
    Notify,
    Ping,
    Identify,
    Unknown,
}

const COMMANDS: &[(Command, u32, &str)] = &[
    (Command::Read, 0, "read"),
    (Command::Write, 1, "write"),
    (Command::Discover, 2, "discover"),
    (Command::WriteAttrs, 3, "writeAttrs"),
    (Command::Execute, 4, "execute"),
    (Command::Observe, 5, "observe"),
    (Command::Notify, 6, "notify"),
    (Command::Ping, 7, "ping"),
    (Command::Identify, 8, "identify"),
    (Command::Unknown, 255, "unknown"),
];

impl Command {
    /// Accepts either the numeric id or the name; anything else is `Unknown`.
    pub fn from_id(id: &Id) -> Self {
        COMMANDS
            .iter()
            .find(|(_, num, name)| match id {
                Id::Num(n) => n == num,
                Id::Name(s) => s == name,
            })
            .map(|(cmd, _, _)| *cmd)
            .unwrap_or(Command::Unknown)
    }

    pub fn num(self) -> u32 {
        COMMANDS.iter().find(|(c, _, _)| *c == self).map(|(_, n, _)| *n).unwrap_or(255)
    }

    pub fn name(self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(c, _, _)| *c == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for Command {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Command {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.num())
    }
}

/// Response status codes shared by both directions of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RspCode {
    Ok,
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    Timeout,
    Conflict,
    InternalServerError,
}

const RSP_CODES: &[(RspCode, u16, &str)] = &[
    (RspCode::Ok, 200, "OK"),
    (RspCode::Created, 201, "Created"),
    (RspCode::Deleted, 202, "Deleted"),
    (RspCode::Changed, 204, "Changed"),
    (RspCode::Content, 205, "Content"),
    (RspCode::BadRequest, 400, "BadRequest"),
    (RspCode::Unauthorized, 401, "Unauthorized"),
    (RspCode::NotFound, 404, "NotFound"),
    (RspCode::MethodNotAllowed, 405, "MethodNotAllowed"),
    (RspCode::Timeout, 408, "Timeout"),
    (RspCode::Conflict, 409, "Conflict"),
    (RspCode::InternalServerError, 500, "InternalServerError"),
];

impl RspCode {
    pub fn code(self) -> u16 {
        RSP_CODES.iter().find(|(c, _, _)| *c == self).map(|(_, n, _)| *n).unwrap_or(500)
    }

    pub fn from_code(code: u16) -> Option<Self> {
        RSP_CODES.iter().find(|(_, n, _)| *n == code).map(|(c, _, _)| *c)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RSP_CODES.iter().find(|(_, _, s)| *s == name).map(|(c, _, _)| *c)
    }
}

/// Codes a device uses to report success.
pub fn is_good_response(status: u16) -> bool {
    matches!(
        RspCode::from_code(status),
        Some(RspCode::Ok | RspCode::Created | RspCode::Deleted | RspCode::Changed | RspCode::Content)
    )
}
