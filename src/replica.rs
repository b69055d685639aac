//! The replica: the top-level aggregate tying together the object store,
//! the change log, and causal delivery of remote changes (§4.1, §4.3, §7).
//!
//! Grounded on automerge's `Automerge`/`Transaction` split (one struct
//! owning all object state, a transaction-shaped batch of ops turned into a
//! `Change`), generalized from automerge's single implicit text object to
//! the path-addressed map/list object graph this crate's data model adds.

use std::collections::HashMap;

use tracing::{debug, instrument, trace, warn};

use crate::change::{Change, InputOperation, InternalOp};
use crate::clock::Clock;
use crate::error::{CrdtError, Result};
use crate::marks::{MarkMap, MarkOp, MarkOpKind, MarkStore, MarkType};
use crate::patch::{InsertedValue, Patch};
use crate::sequence::SequenceCrdt;
use crate::types::{ActorId, ElemId, ObjId, OpId};
use crate::value::Value;

/// Construction-time configuration for a [`Replica`].
///
/// Kept as an explicit options struct (rather than constructor arguments or
/// process-global state) following the pattern the wider example pack uses
/// for library entry points: callers can default it with `..Default::default()`.
#[derive(Debug, Clone, Default)]
pub struct ReplicaOpts {
    /// Fixed actor id; a random one is minted if absent.
    pub actor: Option<ActorId>,
}

#[derive(Debug, Clone)]
enum ObjectState {
    Map(HashMap<String, (OpId, Value)>),
    List(SequenceCrdt, MarkStore),
}

#[derive(Debug)]
pub struct Replica {
    actor: ActorId,
    clock: Clock,
    last_seq: HashMap<ActorId, u64>,
    max_op: u64,
    objects: HashMap<ObjId, ObjectState>,
    /// `objId -> (parent, key)`, used to render human-readable patch paths.
    parents: HashMap<OpId, (ObjId, String)>,
    log: HashMap<(ActorId, u64), Change>,
    /// Remote changes received before their causal dependencies were met.
    pending: Vec<Change>,
}

impl Replica {
    pub fn new(opts: ReplicaOpts) -> Self {
        let actor = opts.actor.unwrap_or_else(ActorId::random);
        let mut objects = HashMap::new();
        objects.insert(ObjId::Root, ObjectState::Map(HashMap::new()));
        Replica {
            actor,
            clock: Clock::new(),
            last_seq: HashMap::new(),
            max_op: 0,
            objects,
            parents: HashMap::new(),
            log: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    // --- path rendering -----------------------------------------------

    fn path_for(&self, obj: &ObjId) -> String {
        match obj {
            ObjId::Root => String::new(),
            ObjId::Id(id) => match self.parents.get(id) {
                Some((parent, key)) => {
                    let prefix = self.path_for(parent);
                    if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    }
                }
                None => id.to_string(),
            },
        }
    }

    // --- object access --------------------------------------------------

    fn get_map(&self, obj: &ObjId) -> Result<&HashMap<String, (OpId, Value)>> {
        match self.objects.get(obj) {
            Some(ObjectState::Map(m)) => Ok(m),
            Some(ObjectState::List(..)) => Err(CrdtError::TypeMismatch {
                path: self.path_for(obj),
                expected: "map",
                found: "list",
            }),
            None => Err(CrdtError::InvalidPath(self.path_for(obj))),
        }
    }

    fn get_map_mut(&mut self, obj: &ObjId) -> Result<&mut HashMap<String, (OpId, Value)>> {
        let path = self.path_for(obj);
        match self.objects.get_mut(obj) {
            Some(ObjectState::Map(m)) => Ok(m),
            Some(ObjectState::List(..)) => Err(CrdtError::TypeMismatch {
                path,
                expected: "map",
                found: "list",
            }),
            None => Err(CrdtError::InvalidPath(path)),
        }
    }

    fn get_list(&self, obj: &ObjId) -> Result<(&SequenceCrdt, &MarkStore)> {
        match self.objects.get(obj) {
            Some(ObjectState::List(seq, marks)) => Ok((seq, marks)),
            Some(ObjectState::Map(..)) => Err(CrdtError::NotAList(self.path_for(obj))),
            None => Err(CrdtError::InvalidPath(self.path_for(obj))),
        }
    }

    fn get_list_mut(&mut self, obj: &ObjId) -> Result<(&mut SequenceCrdt, &mut MarkStore)> {
        let path = self.path_for(obj);
        match self.objects.get_mut(obj) {
            Some(ObjectState::List(seq, marks)) => Ok((seq, marks)),
            Some(ObjectState::Map(..)) => Err(CrdtError::NotAList(path)),
            None => Err(CrdtError::InvalidPath(path)),
        }
    }

    fn elem_before_index(&self, obj: &ObjId, index: u64) -> Result<ElemId> {
        let (seq, _) = self.get_list(obj)?;
        if index == 0 {
            Ok(ElemId::Head)
        } else {
            Ok(ElemId::Id(seq.get_visible_elem_id(index - 1)?))
        }
    }

    // --- local change ----------------------------------------------------

    /// Translate a batch of input ops into a [`Change`], apply it locally,
    /// and return it along with the patches describing the resulting delta.
    ///
    /// All-or-nothing per spec §7: a batch is translated and applied op by
    /// op, so a failure partway through (e.g. `AttrsMissing` on the third
    /// op) must not leave the first two ops' mutations live. The teacher's
    /// `Transaction` gets this for free by deferring every mutation to
    /// commit time; this crate applies as it goes instead, so it snapshots
    /// `objects`/`parents` up front and restores them on error rather than
    /// staging ops unapplied.
    #[instrument(skip(self, inputs), fields(actor = %self.actor))]
    pub fn change(&mut self, inputs: Vec<InputOperation>) -> Result<(Change, Vec<Patch>)> {
        let deps = self.clock.clone();
        let seq = self.last_seq.get(&self.actor).copied().unwrap_or(0) + 1;
        let start_op = self.max_op + 1;
        let mut counter = start_op;
        let mut internal_ops = Vec::new();
        let mut patches = Vec::new();

        let objects_snapshot = self.objects.clone();
        let parents_snapshot = self.parents.clone();

        for input in inputs {
            match self.translate(input, &mut counter) {
                Ok((ops, mut ps)) => {
                    internal_ops.extend(ops);
                    patches.append(&mut ps);
                }
                Err(e) => {
                    self.objects = objects_snapshot;
                    self.parents = parents_snapshot;
                    return Err(e);
                }
            }
        }

        self.max_op = counter.saturating_sub(1).max(self.max_op);
        self.clock.include(self.actor.clone(), self.max_op);
        self.last_seq.insert(self.actor.clone(), seq);

        let change = Change {
            actor: self.actor.clone(),
            seq,
            deps,
            start_op,
            ops: internal_ops,
        };
        self.log.insert((self.actor.clone(), seq), change.clone());
        debug!(seq, ops = change.ops.len(), "applied local change");
        Ok((change, patches))
    }

    /// Translate one input op into internal ops, assigning and applying
    /// fresh op-ids as it goes (an `Insert` of N characters becomes N
    /// single-character internal ops, each one's `after` pointing at the
    /// previous).
    fn translate(
        &mut self,
        input: InputOperation,
        counter: &mut u64,
    ) -> Result<(Vec<InternalOp>, Vec<Patch>)> {
        let mut ops = Vec::new();
        let mut patches = Vec::new();
        match input {
            InputOperation::MakeMap { obj, key } => {
                let id = self.next_id(counter);
                let patch = self.apply_op(id.clone(), &InternalOp::MakeMap { obj: obj.clone(), key: key.clone() })?;
                patches.extend(patch);
                ops.push(InternalOp::MakeMap { obj, key });
            }
            InputOperation::MakeList { obj, key } => {
                let id = self.next_id(counter);
                let patch = self.apply_op(id.clone(), &InternalOp::MakeList { obj: obj.clone(), key: key.clone() })?;
                patches.extend(patch);
                ops.push(InternalOp::MakeList { obj, key });
            }
            InputOperation::Set { obj, key, value } => {
                let id = self.next_id(counter);
                let op = InternalOp::Set { obj: obj.clone(), key: key.clone(), value: value.clone() };
                patches.extend(self.apply_op(id, &op)?);
                ops.push(op);
            }
            InputOperation::Del { obj, key } => {
                let id = self.next_id(counter);
                let op = InternalOp::Del { obj: obj.clone(), key: key.clone() };
                patches.extend(self.apply_op(id, &op)?);
                ops.push(op);
            }
            InputOperation::Insert { obj, index, text } => {
                let mut after = self.elem_before_index(&obj, index)?;
                for ch in text.chars() {
                    let id = self.next_id(counter);
                    let op = InternalOp::Insert { obj: obj.clone(), after: after.clone(), value: ch };
                    patches.extend(self.apply_op(id.clone(), &op)?);
                    after = ElemId::Id(id);
                    ops.push(op);
                }
            }
            InputOperation::Delete { obj, index, count } => {
                for _ in 0..count {
                    let (seq, _) = self.get_list(&obj)?;
                    let elem = seq.get_visible_elem_id(index)?;
                    let id = self.next_id(counter);
                    let op = InternalOp::Delete { obj: obj.clone(), elem };
                    patches.extend(self.apply_op(id, &op)?);
                    ops.push(op);
                }
            }
            InputOperation::AddMark { obj, mark_type, start_index, end_index, attrs } => {
                if let Some(required) = mark_type.requires_attr() {
                    if attrs.as_ref().map(|a| a.contains_key(required)) != Some(true) {
                        return Err(CrdtError::AttrsMissing(mark_type.as_str().to_string()));
                    }
                }
                let (seq, _) = self.get_list(&obj)?;
                let (start, end) = MarkStore::anchors_for_range(seq, mark_type, start_index, end_index)?;
                let id = self.next_id(counter);
                let op = InternalOp::AddMark { obj: obj.clone(), mark_type, start, end, attrs };
                patches.extend(self.apply_op(id, &op)?);
                ops.push(op);
            }
            InputOperation::RemoveMark { obj, mark_type, start_index, end_index, attrs } => {
                if let Some(required) = mark_type.requires_attr_on_remove() {
                    if attrs.as_ref().map(|a| a.contains_key(required)) != Some(true) {
                        return Err(CrdtError::AttrsMissing(mark_type.as_str().to_string()));
                    }
                }
                let (seq, _) = self.get_list(&obj)?;
                let (start, end) = MarkStore::anchors_for_range(seq, mark_type, start_index, end_index)?;
                let id = self.next_id(counter);
                let op = InternalOp::RemoveMark { obj: obj.clone(), mark_type, start, end, attrs };
                patches.extend(self.apply_op(id, &op)?);
                ops.push(op);
            }
        }
        Ok((ops, patches))
    }

    fn next_id(&self, counter: &mut u64) -> OpId {
        let id = OpId::new(*counter, self.actor.clone());
        *counter += 1;
        id
    }

    /// Apply one already-id-assigned op against the object graph, producing
    /// the patch(es) it caused. Shared between local translation and remote
    /// replay so the two can never disagree about semantics.
    fn apply_op(&mut self, op_id: OpId, op: &InternalOp) -> Result<Vec<Patch>> {
        match op {
            InternalOp::MakeMap { obj, key } => {
                self.get_map_mut(obj)?
                    .insert(key.clone(), (op_id.clone(), Value::Null));
                self.objects
                    .insert(ObjId::Id(op_id.clone()), ObjectState::Map(HashMap::new()));
                self.parents.insert(op_id, (obj.clone(), key.clone()));
                // No patch action: the wire vocabulary (spec §4.4) documents
                // only `makeList`.
                Ok(vec![])
            }
            InternalOp::MakeList { obj, key } => {
                let path = self.path_for(obj);
                self.get_map_mut(obj)?
                    .insert(key.clone(), (op_id.clone(), Value::Null));
                self.objects.insert(
                    ObjId::Id(op_id.clone()),
                    ObjectState::List(SequenceCrdt::new(), MarkStore::new()),
                );
                self.parents.insert(op_id, (obj.clone(), key.clone()));
                Ok(vec![Patch::MakeList { path, key: key.clone() }])
            }
            InternalOp::Set { obj, key, value } => {
                let path = self.path_for(obj);
                let map = self.get_map_mut(obj)?;
                let winner = map
                    .get(key)
                    .map(|(existing, _)| &op_id >= existing)
                    .unwrap_or(true);
                if winner {
                    map.insert(key.clone(), (op_id, value.clone()));
                    Ok(vec![Patch::Put { path, key: key.clone(), value: Some(value.clone()) }])
                } else {
                    trace!(%key, "set lost last-writer-wins race");
                    Ok(vec![])
                }
            }
            InternalOp::Del { obj, key } => {
                let path = self.path_for(obj);
                let map = self.get_map_mut(obj)?;
                let winner = map
                    .get(key)
                    .map(|(existing, _)| &op_id >= existing)
                    .unwrap_or(true);
                if winner && map.remove(key).is_some() {
                    Ok(vec![Patch::Put { path, key: key.clone(), value: None }])
                } else {
                    Ok(vec![])
                }
            }
            InternalOp::Insert { obj, after, value } => {
                let path = self.path_for(obj);
                let (seq, marks) = self.get_list_mut(obj)?;
                let slot_idx = seq.insert_after(after, op_id.clone(), *value)?;
                let visible_index = seq.slots()[..slot_idx].iter().filter(|s| !s.deleted).count() as u64;
                let mark_map = marks
                    .active_marks_at_index(seq, visible_index)
                    .unwrap_or_default();
                Ok(vec![Patch::Insert {
                    path,
                    index: visible_index,
                    values: vec![InsertedValue { text: value.to_string(), marks: mark_map }],
                }])
            }
            InternalOp::Delete { obj, elem } => {
                let path = self.path_for(obj);
                let (seq, _) = self.get_list_mut(obj)?;
                let (slot_idx, visible_before) = seq.find_slot(elem)?;
                let _ = slot_idx;
                if seq.delete(elem)? {
                    Ok(vec![Patch::Delete { path, index: visible_before, count: 1 }])
                } else {
                    Ok(vec![])
                }
            }
            InternalOp::AddMark { obj, mark_type, start, end, attrs } => {
                let path = self.path_for(obj);
                let (seq, marks) = self.get_list_mut(obj)?;
                marks.apply(
                    seq,
                    MarkOp {
                        op_id,
                        kind: MarkOpKind::AddMark,
                        mark_type: *mark_type,
                        start: start.clone(),
                        end: end.clone(),
                        attrs: attrs.clone(),
                    },
                    &path,
                )
            }
            InternalOp::RemoveMark { obj, mark_type, start, end, attrs } => {
                let path = self.path_for(obj);
                let (seq, marks) = self.get_list_mut(obj)?;
                marks.apply(
                    seq,
                    MarkOp {
                        op_id,
                        kind: MarkOpKind::RemoveMark,
                        mark_type: *mark_type,
                        start: start.clone(),
                        end: end.clone(),
                        attrs: attrs.clone(),
                    },
                    &path,
                )
            }
        }
    }

    // --- remote changes --------------------------------------------------

    /// Apply a remote change. A change whose `seq` has already been seen
    /// from that actor is an idempotent no-op (duplicate delivery, not an
    /// error). A change whose `deps` aren't fully covered yet is buffered
    /// and retried once more changes arrive.
    #[instrument(skip(self, change), fields(actor = %change.actor, seq = change.seq))]
    pub fn apply_change(&mut self, change: Change) -> Result<Vec<Patch>> {
        let mut patches = self.try_apply(change)?;
        patches.extend(self.drain_pending()?);
        Ok(patches)
    }

    fn try_apply(&mut self, change: Change) -> Result<Vec<Patch>> {
        let last = self.last_seq.get(&change.actor).copied().unwrap_or(0);
        if change.seq <= last {
            debug!("dropping duplicate change");
            return Ok(vec![]);
        }
        if change.seq != last + 1 || !change.deps.iter().all(|(a, c)| self.clock.get(a) >= *c) {
            trace!("buffering change pending causal dependencies");
            self.pending.push(change);
            return Ok(vec![]);
        }

        let mut patches = Vec::new();
        for (i, op) in change.ops.iter().enumerate() {
            let op_id = OpId::new(change.start_op + i as u64, change.actor.clone());
            patches.extend(self.apply_op(op_id, op)?);
        }
        self.max_op = self.max_op.max(change.max_op().saturating_sub(1));
        self.clock.include(change.actor.clone(), change.max_op().saturating_sub(1));
        self.last_seq.insert(change.actor.clone(), change.seq);
        self.log.insert((change.actor.clone(), change.seq), change);
        Ok(patches)
    }

    fn drain_pending(&mut self) -> Result<Vec<Patch>> {
        let mut patches = Vec::new();
        loop {
            let ready_idx = self.pending.iter().position(|c| {
                let last = self.last_seq.get(&c.actor).copied().unwrap_or(0);
                c.seq == last + 1 && c.deps.iter().all(|(a, ctr)| self.clock.get(a) >= *ctr)
            });
            match ready_idx {
                Some(idx) => {
                    let change = self.pending.remove(idx);
                    patches.extend(self.try_apply(change)?);
                }
                None => break,
            }
        }
        if !self.pending.is_empty() {
            warn!(count = self.pending.len(), "changes still waiting on causal dependencies");
        }
        Ok(patches)
    }

    // --- queries -----------------------------------------------------------

    pub fn get_list_crdt(&self, obj: &ObjId) -> Result<(&SequenceCrdt, &MarkStore)> {
        self.get_list(obj)
    }

    pub fn get_map_fields(&self, obj: &ObjId) -> Result<&HashMap<String, (OpId, Value)>> {
        self.get_map(obj)
    }

    pub fn path_of(&self, obj: &ObjId) -> String {
        self.path_for(obj)
    }

    pub fn active_marks_at_index(&self, obj: &ObjId, index: u64) -> Result<MarkMap> {
        let (seq, marks) = self.get_list(obj)?;
        marks.active_marks_at_index(seq, index)
    }
}
