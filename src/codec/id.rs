use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

/// An object, instance or resource identifier.
///
/// Devices send identifiers either as numbers (`3303`) or as strings
/// (`"3303"`, `"temperature"`). Numeric text is always folded into
/// [`Id::Num`] so that `3303` and `"3303"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "RawId")]
pub enum Id {
    Num(u32),
    Name(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u32),
    Name(String),
}

impl From<RawId> for Id {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Num(n) => Id::Num(n),
            RawId::Name(s) => Id::parse(&s),
        }
    }
}

impl Serialize for Id {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Id::Num(n) => serializer.serialize_u32(*n),
            Id::Name(s) => serializer.serialize_str(s),
        }
    }
}

impl Id {
    pub fn parse(token: &str) -> Self {
        match token.parse::<u32>() {
            Ok(n) => Id::Num(n),
            Err(_) => Id::Name(token.to_string()),
        }
    }

    pub fn as_num(&self) -> Option<u32> {
        match self {
            Id::Num(n) => Some(*n),
            Id::Name(_) => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{n}"),
            Id::Name(s) => f.write_str(s),
        }
    }
}

impl From<u32> for Id {
    fn from(n: u32) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::parse(s)
    }
}
