//! The OPEN list: score-ordered, with removal by node id.
//!
//! A `BTreeMap` keyed by [`FrontierKey`] gives ordered pops, and a side index
//! from node id to key gives O(log n) removal when parent discarding replaces
//! an entry. `BinaryHeap` cannot remove arbitrary entries, hence the map.

use std::collections::{BTreeMap, HashMap};

use arbor_kernel::score::Score;

use crate::node::{FrontierKey, NodeId};

/// Generated-but-unexpanded nodes ordered by score.
#[derive(Debug)]
pub struct OpenList<V> {
    ordered: BTreeMap<FrontierKey<V>, NodeId>,
    index: HashMap<NodeId, FrontierKey<V>>,
    next_insertion: u64,
    high_water: usize,
}

impl<V: Score> OpenList<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered: BTreeMap::new(),
            index: HashMap::new(),
            next_insertion: 0,
            high_water: 0,
        }
    }

    /// Insert `id` with `score`, replacing any entry it already had.
    pub fn push(&mut self, id: NodeId, score: V) {
        self.remove(id);
        let key = FrontierKey {
            score,
            insertion_order: self.next_insertion,
        };
        self.next_insertion += 1;
        self.ordered.insert(key.clone(), id);
        self.index.insert(id, key);
        self.high_water = self.high_water.max(self.ordered.len());
    }

    /// Remove and return the best entry.
    pub fn pop(&mut self) -> Option<(NodeId, V)> {
        let (key, id) = self.ordered.pop_first()?;
        self.index.remove(&id);
        Some((id, key.score))
    }

    /// The best entry without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<(NodeId, &V)> {
        self.ordered
            .first_key_value()
            .map(|(key, id)| (*id, &key.score))
    }

    /// Remove `id`, returning the score it was queued with.
    pub fn remove(&mut self, id: NodeId) -> Option<V> {
        let key = self.index.remove(&id)?;
        self.ordered.remove(&key);
        Some(key.score)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    #[must_use]
    pub fn score_of(&self, id: NodeId) -> Option<&V> {
        self.index.get(&id).map(|key| &key.score)
    }

    /// Ids in pop order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ordered.values().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// High-water mark of OPEN size.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl<V: Score> Default for OpenList<V> {
    fn default() -> Self {
        Self::new()
    }
}
