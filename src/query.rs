//! Read-only views over a [`Replica`]'s document state (§4.5): coalesced
//! formatted text spans, point-in-time mark lookups, and stable cursors.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::marks::MarkMap;
use crate::replica::Replica;
use crate::types::{ElemId, ObjId};

/// A position anchored directly to the element occupying it (or `Head` for
/// the very start of the text), so it survives concurrent insertions and
/// deletions the way a mark boundary anchor does (§6 `{objectId, elemId}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub object_id: ObjId,
    pub elem_id: ElemId,
}

/// The text of `obj`, split into maximal runs sharing the same mark map.
pub fn get_text_with_formatting(replica: &Replica, obj: &ObjId) -> Result<Vec<(String, MarkMap)>> {
    let (seq, marks) = replica.get_list_crdt(obj)?;
    let spans = marks
        .marks_per_visible_char(seq)
        .into_iter()
        .map(|(slot_idx, mark_map)| (seq.slots()[slot_idx].value.to_string(), mark_map))
        .coalesce(|(mut text, marks), (ch, next_marks)| {
            if marks == next_marks {
                text.push_str(&ch);
                Ok((text, marks))
            } else {
                Err(((text, marks), (ch, next_marks)))
            }
        })
        .collect();
    Ok(spans)
}

pub fn get_active_marks_at_index(replica: &Replica, obj: &ObjId, index: u64) -> Result<MarkMap> {
    replica.active_marks_at_index(obj, index)
}

/// A cursor for visible position `index`, stable across concurrent edits
/// elsewhere in the document. Anchors directly to the element occupying
/// `index` (I7: resolution is the count of non-deleted slots strictly
/// preceding the referenced slot, with no adjustment), so `index == 0`
/// uses the `Head` sentinel and every other index anchors to the element
/// currently at that visible position.
pub fn get_cursor(replica: &Replica, obj: &ObjId, index: u64) -> Result<Cursor> {
    let (seq, _) = replica.get_list_crdt(obj)?;
    let elem_id = if index == 0 {
        ElemId::Head
    } else {
        ElemId::Id(seq.get_visible_elem_id(index)?)
    };
    Ok(Cursor { object_id: obj.clone(), elem_id })
}

/// Resolve a cursor back to a visible index: the count of non-deleted
/// slots strictly preceding the referenced slot (I7), whether or not that
/// slot itself has since been deleted.
pub fn resolve_cursor(replica: &Replica, cursor: &Cursor) -> Result<u64> {
    let (seq, _) = replica.get_list_crdt(&cursor.object_id)?;
    match &cursor.elem_id {
        ElemId::Head => Ok(0),
        ElemId::Id(id) => {
            let (_, visible_before) = seq.find_slot(id)?;
            Ok(visible_before)
        }
    }
}
