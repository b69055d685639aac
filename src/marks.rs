//! The inline-mark engine (§4.2): anchoring mark endpoints to slot gaps
//! rather than indices, and resolving the effective mark map at any
//! position from the ops currently anchored around it.
//!
//! Storage follows the "reference implementation" choice noted in spec §9:
//! each slot-side holds a **full snapshot** of every mark-op currently
//! covering that gap, not a delta. This makes both application and
//! resolution a plain linear scan with no special-casing, at the cost of
//! doing `O(range length)` work per `addMark`/`removeMark` — acceptable per
//! the same prototype-array tradeoff made in `sequence.rs`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CrdtError, Result};
use crate::patch::Patch;
use crate::sequence::SequenceCrdt;
use crate::types::OpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkType {
    Strong,
    Em,
    Link,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Single,
    Multi,
}

impl MarkType {
    pub fn multiplicity(self) -> Multiplicity {
        match self {
            MarkType::Comment => Multiplicity::Multi,
            _ => Multiplicity::Single,
        }
    }

    /// Whether the mark grows to include text inserted at its right edge.
    pub fn inclusive(self) -> bool {
        matches!(self, MarkType::Strong | MarkType::Em)
    }

    /// Whether the mark grows to include text inserted at its left edge.
    ///
    /// Exposed as a per-`MarkType` property rather than hard-coded, per the
    /// open question in spec §9; every mark type in this crate answers
    /// `false` today, but the engine treats it as data so a future mark
    /// type can opt in without touching the anchor-selection code path.
    pub fn grows_left(self) -> bool {
        false
    }

    pub fn requires_attr(self) -> Option<&'static str> {
        match self {
            MarkType::Link => Some("url"),
            MarkType::Comment => Some("id"),
            MarkType::Strong | MarkType::Em => None,
        }
    }

    /// Attrs a `removeMark` (as opposed to `addMark`) requires. `link` is
    /// resolved by plain last-writer-wins (the "safest interpretation" open
    /// question), so its `removeMark` doesn't need to name a `url`; `comment`
    /// removeMark still needs `id` to know which comment it's closing.
    pub fn requires_attr_on_remove(self) -> Option<&'static str> {
        match self {
            MarkType::Comment => Some("id"),
            MarkType::Strong | MarkType::Em | MarkType::Link => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkType::Strong => "strong",
            MarkType::Em => "em",
            MarkType::Link => "link",
            MarkType::Comment => "comment",
        }
    }
}

/// Arbitrary string-valued attributes carried by a mark-op (`{url}`, `{id}`).
pub type Attrs = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkOpKind {
    AddMark,
    RemoveMark,
}

/// A boundary anchor: a mark endpoint bound to a gap adjacent to a slot, or
/// to one of the document's two ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "camelCase")]
pub enum BoundaryAnchor {
    Before { elem_id: OpId },
    After { elem_id: OpId },
    StartOfText,
    EndOfText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
enum Side {
    Before = 0,
    After = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOp {
    pub op_id: OpId,
    pub kind: MarkOpKind,
    pub mark_type: MarkType,
    pub start: BoundaryAnchor,
    pub end: BoundaryAnchor,
    pub attrs: Option<Attrs>,
}

/// The effective formatting at one visible position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkMap {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strong: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub em: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub comments: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MarkStore {
    ops: HashMap<OpId, MarkOp>,
}

impl MarkStore {
    pub fn new() -> Self {
        MarkStore { ops: HashMap::new() }
    }

    fn side_index(slot_idx: usize, side: Side) -> usize {
        slot_idx * 2 + side as usize
    }

    fn resolve_anchor(seq: &SequenceCrdt, anchor: &BoundaryAnchor) -> Result<(usize, Side)> {
        match anchor {
            BoundaryAnchor::Before { elem_id } => Ok((
                seq.find_index(elem_id)
                    .ok_or_else(|| CrdtError::UnknownElemId(elem_id.to_string()))?,
                Side::Before,
            )),
            BoundaryAnchor::After { elem_id } => Ok((
                seq.find_index(elem_id)
                    .ok_or_else(|| CrdtError::UnknownElemId(elem_id.to_string()))?,
                Side::After,
            )),
            BoundaryAnchor::StartOfText => {
                if seq.length() == 0 {
                    Err(CrdtError::UnknownElemId("startOfText".into()))
                } else {
                    Ok((0, Side::Before))
                }
            }
            BoundaryAnchor::EndOfText => {
                if seq.length() == 0 {
                    Err(CrdtError::UnknownElemId("endOfText".into()))
                } else {
                    Ok((seq.length() - 1, Side::After))
                }
            }
        }
    }

    /// Boundary anchors for an `addMark`/`removeMark` over visible index
    /// range `[start_index, end_index)`, following the anchor-selection
    /// rules of spec §4.2.
    pub fn anchors_for_range(
        seq: &SequenceCrdt,
        mark_type: MarkType,
        start_index: u64,
        end_index: u64,
    ) -> Result<(BoundaryAnchor, BoundaryAnchor)> {
        if start_index >= end_index {
            return Err(CrdtError::IndexOutOfBounds {
                index: start_index,
                len: seq.visible_length(),
            });
        }
        let len = seq.visible_length();
        let start = if mark_type.grows_left() {
            if start_index == 0 {
                BoundaryAnchor::StartOfText
            } else {
                BoundaryAnchor::After {
                    elem_id: seq.get_visible_elem_id(start_index - 1)?,
                }
            }
        } else {
            BoundaryAnchor::Before {
                elem_id: seq.get_visible_elem_id(start_index)?,
            }
        };
        let end = if mark_type.inclusive() {
            if end_index < len {
                BoundaryAnchor::Before {
                    elem_id: seq.get_visible_elem_id(end_index)?,
                }
            } else {
                BoundaryAnchor::EndOfText
            }
        } else {
            BoundaryAnchor::After {
                elem_id: seq.get_visible_elem_id(end_index - 1)?,
            }
        };
        Ok((start, end))
    }

    /// Apply a mark-op: record it in the registry, fold it into every
    /// slot-side snapshot in `[start, end)`, and return the patches
    /// describing the resulting visible-document delta.
    ///
    /// A slot-side left as `None` means "unchanged, keep carrying the
    /// running set from the left" (see `running_sets`). That convention
    /// only works if every transition point is explicitly materialized: the
    /// first slot-side inside the range that was still `None` has to be
    /// seeded with the pre-op running value before this op's id is folded
    /// in, and the first slot-side *past* the range similarly has to be
    /// frozen to that pre-op value, or a later read would silently carry
    /// this op past its own right edge. The one exception is a literal
    /// `endOfText` end anchor, which is supposed to keep carrying forward
    /// so text appended later still inherits an inclusive mark.
    pub fn apply(&mut self, seq: &mut SequenceCrdt, op: MarkOp, path: &str) -> Result<Vec<Patch>> {
        let (start_idx, start_side) = Self::resolve_anchor(seq, &op.start)?;
        let (end_idx, end_side) = Self::resolve_anchor(seq, &op.end)?;
        let start_pos = Self::side_index(start_idx, start_side);
        let end_pos = Self::side_index(end_idx, end_side);

        let comment_id = op.attrs.as_ref().and_then(|a| a.get("id").cloned());
        let before = self.snapshot_scalar(seq, op.mark_type, comment_id.as_deref());
        let old_running = self.running_sets(seq);
        let running_at = |slot_idx: usize, side: Side| -> HashSet<OpId> {
            match side {
                Side::Before => old_running[slot_idx].0.clone(),
                Side::After => old_running[slot_idx].1.clone(),
            }
        };

        for slot_idx in start_idx..=end_idx {
            for side in [Side::Before, Side::After] {
                let pos = Self::side_index(slot_idx, side);
                if pos >= start_pos && pos < end_pos {
                    let seed = running_at(slot_idx, side);
                    let slot = &mut seq.slots_mut()[slot_idx];
                    let target = match side {
                        Side::Before => &mut slot.mark_ops_before,
                        Side::After => &mut slot.mark_ops_after,
                    };
                    let set = target.get_or_insert_with(|| seed);
                    set.insert(op.op_id.clone());
                }
            }
        }

        if op.end != BoundaryAnchor::EndOfText && end_pos < 2 * seq.length() {
            let slot = &mut seq.slots_mut()[end_idx];
            let target = match end_side {
                Side::Before => &mut slot.mark_ops_before,
                Side::After => &mut slot.mark_ops_after,
            };
            if target.is_none() {
                *target = Some(running_at(end_idx, end_side));
            }
        }

        self.ops.insert(op.op_id.clone(), op.clone());

        let after = self.snapshot_scalar(seq, op.mark_type, comment_id.as_deref());
        Ok(Self::diff_to_patches(
            path,
            op.mark_type,
            comment_id,
            &before,
            &after,
        ))
    }

    /// `(before_running, after_running)` op-id sets for every slot, after
    /// walking left to right and replacing the running set whenever a
    /// stored snapshot is encountered (spec §4.2, "effective marks at a
    /// position").
    fn running_sets(&self, seq: &SequenceCrdt) -> Vec<(HashSet<OpId>, HashSet<OpId>)> {
        let mut running: HashSet<OpId> = HashSet::new();
        let mut out = Vec::with_capacity(seq.length());
        for slot in seq.slots() {
            if let Some(before) = &slot.mark_ops_before {
                running = before.clone();
            }
            let before_snapshot = running.clone();
            if let Some(after) = &slot.mark_ops_after {
                running = after.clone();
            }
            out.push((before_snapshot, running.clone()));
        }
        out
    }

    /// Effective mark map just before visible position `index` (spec
    /// §4.5 `getActiveMarksAtIndex`), i.e. at the gap preceding that
    /// character (or after the last character, for `index == length`).
    pub fn active_marks_at_index(&self, seq: &SequenceCrdt, index: u64) -> Result<MarkMap> {
        let running = self.running_sets(seq);
        let mut seen = 0u64;
        for (slot, (before, _after)) in seq.slots().iter().zip(running.iter()) {
            if !slot.deleted {
                if seen == index {
                    return Ok(self.resolve(before));
                }
                seen += 1;
            }
        }
        if seen == index {
            // at or past the end: use the running set carried past the
            // last visible character.
            let last = running.last().map(|(_, a)| a.clone()).unwrap_or_default();
            return Ok(self.resolve(&last));
        }
        Err(CrdtError::IndexOutOfBounds {
            index,
            len: seq.visible_length(),
        })
    }

    /// Mark map effective for each visible character, in order, as
    /// `(slot_index, mark_map)` pairs — the building block for
    /// `getTextWithFormatting`.
    pub fn marks_per_visible_char(&self, seq: &SequenceCrdt) -> Vec<(usize, MarkMap)> {
        let running = self.running_sets(seq);
        seq.slots()
            .iter()
            .zip(running.iter())
            .enumerate()
            .filter(|(_, (slot, _))| !slot.deleted)
            .map(|(idx, (_, (before, _)))| (idx, self.resolve(before)))
            .collect()
    }

    /// Resolve an active-ops set into a mark map (I5, I6).
    fn resolve(&self, ops: &HashSet<OpId>) -> MarkMap {
        let mut map = MarkMap::default();
        map.strong = self.resolve_single(ops, MarkType::Strong).is_some();
        map.em = self.resolve_single(ops, MarkType::Em).is_some();
        map.link = self
            .resolve_single(ops, MarkType::Link)
            .and_then(|op| op.attrs.as_ref())
            .and_then(|a| a.get("url").cloned());
        map.comments = self.resolve_multi(ops, MarkType::Comment);
        map
    }

    /// Every id seen among `ops` of `mark_type` whose greatest-op-id winner
    /// is still an `addMark` (I5, I6). Only meaningful for a
    /// `Multiplicity::Multi` type — `comment` today.
    fn resolve_multi(&self, ops: &HashSet<OpId>, mark_type: MarkType) -> BTreeSet<String> {
        debug_assert_eq!(mark_type.multiplicity(), Multiplicity::Multi);
        let mut by_id: HashMap<&str, &MarkOp> = HashMap::new();
        for id in ops
            .iter()
            .filter_map(|opid| self.ops.get(opid))
            .filter(|op| op.mark_type == mark_type)
            .filter_map(|op| op.attrs.as_ref().and_then(|a| a.get("id")))
        {
            let winner = ops
                .iter()
                .filter_map(|opid| self.ops.get(opid))
                .filter(|op| op.mark_type == mark_type)
                .filter(|op| op.attrs.as_ref().and_then(|a| a.get("id")).map(String::as_str) == Some(id.as_str()))
                .max_by_key(|op| op.op_id.clone())
                .expect("id was just observed in this set");
            by_id.insert(id.as_str(), winner);
        }
        by_id
            .into_iter()
            .filter(|(_, op)| op.kind == MarkOpKind::AddMark)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// The winning op for a single-valued mark type (I5): greatest op-id
    /// among ops of that type in the set, or `None` if absent.
    fn resolve_single(&self, ops: &HashSet<OpId>, mark_type: MarkType) -> Option<&MarkOp> {
        ops.iter()
            .filter_map(|id| self.ops.get(id))
            .filter(|op| op.mark_type == mark_type)
            .max_by_key(|op| op.op_id.clone())
            .filter(|op| op.kind == MarkOpKind::AddMark)
    }

    /// For single-valued types: `(active, attrs)` at each visible char. For
    /// comment, `comment_id` narrows to one id's presence. Used only to
    /// diff before/after a single `apply` call.
    fn snapshot_scalar(
        &self,
        seq: &SequenceCrdt,
        mark_type: MarkType,
        comment_id: Option<&str>,
    ) -> Vec<(bool, Option<Attrs>)> {
        let running = self.running_sets(seq);
        seq.slots()
            .iter()
            .zip(running.iter())
            .filter(|(slot, _)| !slot.deleted)
            .map(|(_, (before, _))| match mark_type.multiplicity() {
                Multiplicity::Multi => {
                    let id = comment_id.unwrap_or_default();
                    let present = before
                        .iter()
                        .filter_map(|opid| self.ops.get(opid))
                        .filter(|op| op.mark_type == mark_type)
                        .filter(|op| {
                            op.attrs.as_ref().and_then(|a| a.get("id")).map(String::as_str) == Some(id)
                        })
                        .max_by_key(|op| op.op_id.clone())
                        .map(|op| op.kind == MarkOpKind::AddMark)
                        .unwrap_or(false);
                    (present, None)
                }
                Multiplicity::Single => match self.resolve_single(before, mark_type) {
                    Some(op) => (true, op.attrs.clone()),
                    None => (false, None),
                },
            })
            .collect()
    }

    fn diff_to_patches(
        path: &str,
        mark_type: MarkType,
        comment_id: Option<String>,
        before: &[(bool, Option<Attrs>)],
        after: &[(bool, Option<Attrs>)],
    ) -> Vec<Patch> {
        let mut patches = Vec::new();
        let mut run: Option<(usize, bool, Option<Attrs>)> = None;

        for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
            let same_as_run = run.as_ref().map(|(_, active, attrs)| *active == a.0 && attrs == &a.1);
            match (b == a, same_as_run) {
                (false, Some(true)) => {
                    // still inside the same contiguous changed run
                }
                (false, _) => {
                    if let Some((start, active, attrs)) = run.take() {
                        patches.push(Self::mark_patch(path, mark_type, &comment_id, start, i, active, attrs));
                    }
                    run = Some((i, a.0, a.1.clone()));
                }
                (true, _) => {
                    if let Some((start, active, attrs)) = run.take() {
                        patches.push(Self::mark_patch(path, mark_type, &comment_id, start, i, active, attrs));
                    }
                }
            }
        }
        if let Some((start, active, attrs)) = run.take() {
            patches.push(Self::mark_patch(path, mark_type, &comment_id, start, before.len(), active, attrs));
        }
        patches
    }

    fn mark_patch(
        path: &str,
        mark_type: MarkType,
        comment_id: &Option<String>,
        start: usize,
        end: usize,
        active: bool,
        attrs: Option<Attrs>,
    ) -> Patch {
        if active {
            Patch::AddMark {
                path: path.to_string(),
                mark_type,
                start_index: start as u64,
                end_index: end as u64,
                attrs,
            }
        } else {
            Patch::RemoveMark {
                path: path.to_string(),
                mark_type,
                start_index: start as u64,
                end_index: end as u64,
                attrs: comment_id.clone().map(|id| {
                    let mut a = Attrs::new();
                    a.insert("id".to_string(), id);
                    a
                }),
            }
        }
    }
}
