//! The sequence CRDT: an RGA-style list of character slots with tombstones.
//!
//! Grounded on automerge's `op_tree`/`op_set` (which keep ordered op metadata
//! per list) but, per the §9 design note that a dense array is acceptable for
//! a prototype implementation, this uses a flat `Vec<Slot>` rather than an
//! order-statistics tree. `findSlot`/`getVisibleElemId` are O(n) scans; a
//! production port would replace `Vec<Slot>` with an indexed tree without
//! changing this module's public contract.

use std::collections::HashSet;

use crate::error::{CrdtError, Result};
use crate::types::{ElemId, OpId};

/// One position in the sequence: alive or tombstoned forever (I4).
///
/// `mark_ops_before`/`mark_ops_after` are the mark engine's per-slot
/// snapshot sets (§4.2); they live here because the spec defines them as
/// slot metadata (§3), but all mark-resolution logic lives in `marks.rs`.
#[derive(Debug, Clone)]
pub struct Slot {
    pub elem_id: OpId,
    pub value: char,
    pub deleted: bool,
    pub mark_ops_before: Option<HashSet<OpId>>,
    pub mark_ops_after: Option<HashSet<OpId>>,
}

impl Slot {
    fn new(elem_id: OpId, value: char) -> Self {
        Slot {
            elem_id,
            value,
            deleted: false,
            mark_ops_before: None,
            mark_ops_after: None,
        }
    }
}

/// A replicated growable array of character slots for one list object.
#[derive(Debug, Clone, Default)]
pub struct SequenceCrdt {
    slots: Vec<Slot>,
}

impl SequenceCrdt {
    pub fn new() -> Self {
        SequenceCrdt { slots: Vec::new() }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Total slot count, including tombstones.
    pub fn length(&self) -> usize {
        self.slots.len()
    }

    /// Count of non-deleted slots (I7).
    pub fn visible_length(&self) -> u64 {
        self.slots.iter().filter(|s| !s.deleted).count() as u64
    }

    /// Index of the slot created by `elem_id`, if any.
    pub fn find_index(&self, elem_id: &OpId) -> Option<usize> {
        self.slots.iter().position(|s| &s.elem_id == elem_id)
    }

    /// `(index, visibleCountBefore)` for `elem_id` — the number of
    /// non-deleted slots strictly preceding it (I7), regardless of whether
    /// the slot itself is currently deleted.
    pub fn find_slot(&self, elem_id: &OpId) -> Result<(usize, u64)> {
        let index = self
            .find_index(elem_id)
            .ok_or_else(|| CrdtError::UnknownElemId(elem_id.to_string()))?;
        let visible_before = self.slots[..index].iter().filter(|s| !s.deleted).count() as u64;
        Ok((index, visible_before))
    }

    /// The `elemId` that currently occupies visible position `index`.
    pub fn get_visible_elem_id(&self, index: u64) -> Result<OpId> {
        let mut seen = 0u64;
        for slot in &self.slots {
            if slot.deleted {
                continue;
            }
            if seen == index {
                return Ok(slot.elem_id.clone());
            }
            seen += 1;
        }
        Err(CrdtError::IndexOutOfBounds {
            index,
            len: self.visible_length(),
        })
    }

    /// Insert a new slot for `op_id` after the slot referenced by `after`
    /// (`ElemId::Head` meaning "before everything"). Implements the RGA
    /// ordering rule (I3): scan forward skipping slots whose `elemId` is
    /// greater than `op_id`, insert before the first slot whose `elemId` is
    /// smaller (or at the end of the scan region).
    pub fn insert_after(&mut self, after: &ElemId, op_id: OpId, value: char) -> Result<usize> {
        let scan_start = match after {
            ElemId::Head => 0,
            ElemId::Id(id) => self
                .find_index(id)
                .ok_or_else(|| CrdtError::UnknownElemId(id.to_string()))?
                + 1,
        };

        let mut insert_at = scan_start;
        while insert_at < self.slots.len() && self.slots[insert_at].elem_id > op_id {
            insert_at += 1;
        }

        self.slots.insert(insert_at, Slot::new(op_id, value));
        Ok(insert_at)
    }

    /// The character currently at visible position `index`.
    pub fn get_visible_value(&self, index: u64) -> Result<char> {
        let mut seen = 0u64;
        for slot in &self.slots {
            if slot.deleted {
                continue;
            }
            if seen == index {
                return Ok(slot.value);
            }
            seen += 1;
        }
        Err(CrdtError::IndexOutOfBounds {
            index,
            len: self.visible_length(),
        })
    }

    /// Tombstone `elem_id`. A second delete, or deleting an unknown slot
    /// that has already been tombstoned by some other means, is a no-op;
    /// deleting a genuinely unknown slot is a fatal integrity error (I4 /
    /// `UnknownElemId`).
    pub fn delete(&mut self, elem_id: &OpId) -> Result<bool> {
        let index = self
            .find_index(elem_id)
            .ok_or_else(|| CrdtError::UnknownElemId(elem_id.to_string()))?;
        if self.slots[index].deleted {
            return Ok(false);
        }
        self.slots[index].deleted = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActorId;

    fn id(actor: &str, counter: u64) -> OpId {
        OpId::new(counter, ActorId::from(actor))
    }

    #[test]
    fn insert_at_head_three_times_orders_descending_by_opid() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        seq.insert_after(&ElemId::Head, id("a", 2), 'x').unwrap();
        seq.insert_after(&ElemId::Head, id("a", 3), 'x').unwrap();
        let order: Vec<u64> = seq.slots().iter().map(|s| s.elem_id.counter).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn concurrent_inserts_at_same_reference_converge_by_opid_descending() {
        let mut seq = SequenceCrdt::new();
        let base = id("a", 1);
        seq.insert_after(&ElemId::Head, base.clone(), 'x').unwrap();
        // two concurrent inserts both reference `base`; regardless of
        // application order the higher op-id ends up first.
        seq.insert_after(&ElemId::Id(base.clone()), id("b", 5), 'x').unwrap();
        seq.insert_after(&ElemId::Id(base.clone()), id("a", 2), 'x').unwrap();
        let order: Vec<(u64, &str)> = seq
            .slots()
            .iter()
            .map(|s| (s.elem_id.counter, s.elem_id.actor.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "a"), (5, "b"), (2, "a")]);
    }

    #[test]
    fn delete_is_tombstone_not_removal() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        assert_eq!(seq.length(), 1);
        assert_eq!(seq.visible_length(), 1);
        seq.delete(&id("a", 1)).unwrap();
        assert_eq!(seq.length(), 1);
        assert_eq!(seq.visible_length(), 0);
    }

    #[test]
    fn second_delete_is_noop() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        assert!(seq.delete(&id("a", 1)).unwrap());
        assert!(!seq.delete(&id("a", 1)).unwrap());
    }

    #[test]
    fn delete_unknown_elem_is_fatal() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        let err = seq.delete(&id("z", 99)).unwrap_err();
        assert!(matches!(err, CrdtError::UnknownElemId(_)));
    }

    #[test]
    fn find_slot_counts_visible_before_ignoring_own_deletion() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        seq.insert_after(&ElemId::Id(id("a", 1)), id("a", 2), 'x').unwrap();
        seq.insert_after(&ElemId::Id(id("a", 2)), id("a", 3), 'x').unwrap();
        seq.delete(&id("a", 2)).unwrap();

        let (_, before) = seq.find_slot(&id("a", 1)).unwrap();
        assert_eq!(before, 0);
        let (_, before) = seq.find_slot(&id("a", 2)).unwrap();
        assert_eq!(before, 1);
        let (_, before) = seq.find_slot(&id("a", 3)).unwrap();
        assert_eq!(before, 1); // 'a'-2 is tombstoned, doesn't count
    }

    #[test]
    fn get_visible_elem_id_skips_tombstones() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'x').unwrap();
        seq.insert_after(&ElemId::Id(id("a", 1)), id("a", 2), 'x').unwrap();
        seq.delete(&id("a", 1)).unwrap();
        assert_eq!(seq.get_visible_elem_id(0).unwrap(), id("a", 2));
    }

    #[test]
    fn get_visible_value_reads_back_the_inserted_character() {
        let mut seq = SequenceCrdt::new();
        seq.insert_after(&ElemId::Head, id("a", 1), 'h').unwrap();
        seq.insert_after(&ElemId::Id(id("a", 1)), id("a", 2), 'i').unwrap();
        assert_eq!(seq.get_visible_value(0).unwrap(), 'h');
        assert_eq!(seq.get_visible_value(1).unwrap(), 'i');
    }
}
