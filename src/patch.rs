//! Patches: the visible-document deltas emitted by `Replica::change` and
//! `Replica::apply_change` (spec §4.4). A patch is purely observational —
//! applying a `Change` never fails to produce a patch stream matching what
//! actually happened in the document.

use serde::{Deserialize, Serialize};

use crate::marks::{Attrs, MarkType};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Patch {
    /// New list elements became visible at `index` in `path`, each carrying
    /// the mark map effective at the moment of insertion.
    Insert {
        path: String,
        index: u64,
        values: Vec<InsertedValue>,
    },
    /// `count` previously-visible elements at `index` were tombstoned.
    /// `count` is always 1 — each `delete` input op produces its own patch.
    Delete { path: String, index: u64, count: u64 },
    /// A key in a map object took a new value (`set`) or was removed
    /// (`del`, where `value` is `None`).
    Put {
        path: String,
        key: String,
        value: Option<Value>,
    },
    /// A new list object was created at `key` in its parent. Map creation
    /// has no patch action in the wire vocabulary; a `makeMap` input op
    /// produces no patch.
    MakeList { path: String, key: String },
    AddMark {
        path: String,
        mark_type: MarkType,
        start_index: u64,
        end_index: u64,
        attrs: Option<Attrs>,
    },
    RemoveMark {
        path: String,
        mark_type: MarkType,
        start_index: u64,
        end_index: u64,
        attrs: Option<Attrs>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedValue {
    pub text: String,
    pub marks: crate::marks::MarkMap,
}
