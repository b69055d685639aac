//! The change record (§4.3, §6) and the two operation vocabularies either
//! side of it: [`InputOperation`], the JSON shape a caller hands to
//! `Replica::change`, and [`InternalOp`], the per-op-id shape that actually
//! gets stored in a [`Change`] and replayed against the document.
//!
//! Grounded on automerge's `change.rs`/`Transaction`, which likewise
//! separates the request-level op from the stored op — but the stored op
//! here doesn't carry its own `OpId`; it is implied by `startOp + index`,
//! matching the compact encoding spec §6 describes.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::marks::{Attrs, MarkType};
use crate::types::{ActorId, ElemId, ObjId, OpId};
use crate::value::Value;

/// An operation as requested by a caller, addressed to an existing object
/// by its `ObjId` (`ObjId::Root` for the implicit top-level map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InputOperation {
    MakeMap { obj: ObjId, key: String },
    MakeList { obj: ObjId, key: String },
    Set { obj: ObjId, key: String, value: Value },
    Del { obj: ObjId, key: String },
    Insert { obj: ObjId, index: u64, text: String },
    Delete { obj: ObjId, index: u64, count: u64 },
    AddMark {
        obj: ObjId,
        mark_type: MarkType,
        start_index: u64,
        end_index: u64,
        attrs: Option<Attrs>,
    },
    RemoveMark {
        obj: ObjId,
        mark_type: MarkType,
        start_index: u64,
        end_index: u64,
        attrs: Option<Attrs>,
    },
}

/// One already-assigned-an-implicit-op-id action inside a [`Change`]. The
/// op's own id is `(change.start_op + position_in_ops, change.actor)`;
/// anything it *references* (a prior elemId, a mark anchor) is an absolute
/// `OpId`/`ElemId` because it may point outside this change entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InternalOp {
    MakeMap {
        obj: ObjId,
        key: String,
    },
    MakeList {
        obj: ObjId,
        key: String,
    },
    Set {
        obj: ObjId,
        key: String,
        value: Value,
    },
    Del {
        obj: ObjId,
        key: String,
    },
    Insert {
        obj: ObjId,
        after: ElemId,
        value: char,
    },
    Delete {
        obj: ObjId,
        elem: OpId,
    },
    AddMark {
        obj: ObjId,
        mark_type: MarkType,
        start: crate::marks::BoundaryAnchor,
        end: crate::marks::BoundaryAnchor,
        attrs: Option<Attrs>,
    },
    RemoveMark {
        obj: ObjId,
        mark_type: MarkType,
        start: crate::marks::BoundaryAnchor,
        end: crate::marks::BoundaryAnchor,
        attrs: Option<Attrs>,
    },
}

impl InternalOp {
    pub fn obj(&self) -> &ObjId {
        match self {
            InternalOp::MakeMap { obj, .. }
            | InternalOp::MakeList { obj, .. }
            | InternalOp::Set { obj, .. }
            | InternalOp::Del { obj, .. }
            | InternalOp::Insert { obj, .. }
            | InternalOp::Delete { obj, .. }
            | InternalOp::AddMark { obj, .. }
            | InternalOp::RemoveMark { obj, .. } => obj,
        }
    }
}

/// A batch of ops from one actor, causally dependent on `deps` (§4.3).
/// `seq` is this actor's 1-based sequence number for the change; `start_op`
/// is the op-id counter of `ops[0]` (later ops are `start_op + i`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub actor: ActorId,
    pub seq: u64,
    pub deps: Clock,
    pub start_op: u64,
    pub ops: Vec<InternalOp>,
}

impl Change {
    pub fn max_op(&self) -> u64 {
        self.start_op + self.ops.len() as u64
    }
}
