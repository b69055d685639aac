use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::CrdtError;

/// Identifier of a replica, unique across the collaboration.
///
/// The wire format (§6) represents actors as opaque strings, so unlike
/// automerge's `ActorId` (a fixed-size byte buffer holding a uuid) this is a
/// thin string newtype. `ActorId::random` still mints a uuid by default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(SmolStr);

impl ActorId {
    pub fn new(s: impl Into<SmolStr>) -> Self {
        ActorId(s.into())
    }

    pub fn random() -> Self {
        ActorId(SmolStr::new(uuid::Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        ActorId(SmolStr::new(s))
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        ActorId(SmolStr::new(s))
    }
}

/// `(counter, actor)`. Total order: counter ascending, ties broken by actor
/// (I1: op-ids are globally unique, counters monotonic per actor).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpId {
    pub counter: u64,
    pub actor: ActorId,
}

impl OpId {
    pub fn new(counter: u64, actor: ActorId) -> Self {
        OpId { counter, actor }
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.actor.cmp(&other.actor))
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor)
    }
}

impl FromStr for OpId {
    type Err = CrdtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '@');
        match (parts.next(), parts.next()) {
            (Some(counter), Some(actor)) if !actor.is_empty() => counter
                .parse::<u64>()
                .map(|counter| OpId::new(counter, ActorId::from(actor)))
                .map_err(|_| CrdtError::InvalidOpId(s.to_string())),
            _ => Err(CrdtError::InvalidOpId(s.to_string())),
        }
    }
}

impl Serialize for OpId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OpId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        OpId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a list slot: either a sentinel for "before the first
/// character" / "after the last character", or the op-id that created the
/// slot. Tombstoned slots keep their `elemId` forever (I4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElemId {
    Head,
    Id(OpId),
}

impl ElemId {
    pub fn op_id(&self) -> Option<&OpId> {
        match self {
            ElemId::Head => None,
            ElemId::Id(id) => Some(id),
        }
    }
}

impl fmt::Display for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemId::Head => write!(f, "_head"),
            ElemId::Id(id) => write!(f, "{}", id),
        }
    }
}

/// The id of a composite object (a list or a map) within the document.
/// `Root` is the implicit top-level map that `path`s are resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjId {
    Root,
    Id(OpId),
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjId::Root => write!(f, "_root"),
            ObjId::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<OpId> for ObjId {
    fn from(id: OpId) -> Self {
        ObjId::Id(id)
    }
}
