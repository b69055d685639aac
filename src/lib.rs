//! A rich-text CRDT core: concurrent sequence editing over an RGA-ordered
//! list of characters, an inline mark engine for overlapping and cancelling
//! formatting, and a change-log/replication layer that delivers remote
//! edits in causal order.
//!
//! The entry point is [`Replica`]: it owns the document's object graph
//! (lists and maps, rooted at [`types::ObjId::Root`]), turns batches of
//! [`change::InputOperation`]s into [`change::Change`] records via
//! [`Replica::change`], and applies remote records via
//! [`Replica::apply_change`]. Both return the [`patch::Patch`]es describing
//! what became visible.

mod change;
mod clock;
mod error;
mod marks;
mod patch;
mod query;
mod replica;
mod sequence;
mod types;
mod value;

pub use change::{Change, InputOperation, InternalOp};
pub use clock::Clock;
pub use error::{CrdtError, Result};
pub use marks::{Attrs, BoundaryAnchor, MarkMap, MarkOp, MarkOpKind, MarkStore, MarkType, Multiplicity};
pub use patch::{InsertedValue, Patch};
pub use query::{get_active_marks_at_index, get_cursor, get_text_with_formatting, resolve_cursor, Cursor};
pub use replica::{Replica, ReplicaOpts};
pub use sequence::{SequenceCrdt, Slot};
pub use types::{ActorId, ElemId, ObjId, OpId};
pub use value::Value;
