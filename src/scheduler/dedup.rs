//! Bounded memory of handled message identifiers.

use std::collections::{HashSet, VecDeque};

use tracing::warn;

/// FIFO-bounded set of message ids.
///
/// Once the size exceeds `ceiling`, the oldest-inserted ids are evicted
/// until `target` remain.
#[derive(Debug, Clone)]
pub struct DedupMemory {
    order: VecDeque<String>,
    seen: HashSet<String>,
    ceiling: usize,
    target: usize,
}

impl DedupMemory {
    /// A `target` not below `ceiling` is clamped to `ceiling - 1`.
    pub fn new(ceiling: usize, target: usize) -> Self {
        let ceiling = ceiling.max(1);
        let target = if target < ceiling {
            target
        } else {
            warn!(ceiling, target, "Dedup target not below ceiling, clamping");
            ceiling - 1
        };
        Self {
            order: VecDeque::with_capacity(ceiling + 1),
            seen: HashSet::with_capacity(ceiling + 1),
            ceiling,
            target,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns the number of ids evicted by this insert.
    pub fn insert(&mut self, id: &str) -> usize {
        if !self.seen.insert(id.to_string()) {
            return 0;
        }
        self.order.push_back(id.to_string());

        if self.order.len() <= self.ceiling {
            return 0;
        }

        let excess = self.order.len() - self.target;
        for old in self.order.drain(..excess) {
            self.seen.remove(&old);
        }
        excess
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}
