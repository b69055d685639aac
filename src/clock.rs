use std::cmp;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, OpId};

/// Mapping from actor to the highest counter observed from that actor.
///
/// Used both as a `Change`'s causal dependency snapshot and as a replica's
/// running clock of everything it has applied so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Clock(HashMap<ActorId, u64>);

impl Clock {
    pub fn new() -> Self {
        Clock(HashMap::new())
    }

    /// The highest counter seen from `actor`, or 0 if none.
    pub fn get(&self, actor: &ActorId) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Record that `counter` from `actor` has been observed, keeping the max.
    pub fn include(&mut self, actor: ActorId, counter: u64) {
        self.0
            .entry(actor)
            .and_modify(|c| *c = cmp::max(*c, counter))
            .or_insert(counter);
    }

    /// True if this clock has observed `id` (I2: every dep must be applied).
    pub fn covers(&self, id: &OpId) -> bool {
        self.get(&id.actor) >= id.counter
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &u64)> {
        self.0.iter()
    }
}
