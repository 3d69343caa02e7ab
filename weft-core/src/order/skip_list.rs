//! Skip List Sorted Set
//!
//! A probabilistic skip list ordered by a key extracted from each item.
//!
//! # Layout
//!
//! Items live in a [`Slab`] arena. Each slot carries the item plus one "next"
//! index per level the item participates in. A separate map from item to slot
//! gives identity lookups without a search. Nothing is attached to the items
//! themselves, so the same item value can sit in any number of lists at once.
//!
//! # Complexity
//!
//! | Operation      | Cost                      |
//! |----------------|---------------------------|
//! | `add`          | O(log n) expected         |
//! | `get`          | O(log n) expected         |
//! | `has`          | O(1)                      |
//! | `remove`       | O(log n + equal keys)     |
//! | `remove_key`   | O(log n + matches)        |
//! | `first`        | O(1)                      |
//! | `fetch_first`  | O(1) expected             |
//! | iteration      | O(n)                      |
//!
//! Levels come from repeated fair coin flips, so the shape of the list does
//! not depend on insertion order.

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slab::Slab;
use smallvec::{smallvec, SmallVec};

/// Maximum tower height.
pub const MAX_LEVEL: usize = 32;

struct Slot<T> {
    item: T,
    next: SmallVec<[Option<usize>; 4]>,
}

/// A sorted set of `T` ordered by `K`.
///
/// Items with equal keys are kept in insertion order. Identity (for duplicate
/// rejection, `has` and `remove`) is `T`'s `Eq`.
pub struct SkipList<T, K> {
    key_of: Box<dyn Fn(&T) -> K>,
    slots: Slab<Slot<T>>,
    head: [Option<usize>; MAX_LEVEL],
    height: usize,
    index: HashMap<T, usize>,
    rng: StdRng,
}

impl<T, K> SkipList<T, K>
where
    T: Clone + Eq + Hash,
    K: Ord,
{
    /// Create an empty list ordered by `key_of`.
    pub fn new(key_of: impl Fn(&T) -> K + 'static) -> Self {
        Self::with_rng(key_of, StdRng::from_entropy())
    }

    /// Create an empty list with a deterministic level sequence.
    pub fn with_seed(key_of: impl Fn(&T) -> K + 'static, seed: u64) -> Self {
        Self::with_rng(key_of, StdRng::seed_from_u64(seed))
    }

    fn with_rng(key_of: impl Fn(&T) -> K + 'static, rng: StdRng) -> Self {
        Self {
            key_of: Box::new(key_of),
            slots: Slab::new(),
            head: [None; MAX_LEVEL],
            height: 1,
            index: HashMap::new(),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head[0].is_none()
    }

    fn next(&self, at: Option<usize>, level: usize) -> Option<usize> {
        match at {
            None => self.head[level],
            Some(slot) => self.slots[slot].next.get(level).copied().flatten(),
        }
    }

    fn set_next(&mut self, at: Option<usize>, level: usize, to: Option<usize>) {
        match at {
            None => self.head[level] = to,
            Some(slot) => self.slots[slot].next[level] = to,
        }
    }

    fn key_at(&self, slot: usize) -> K {
        (self.key_of)(&self.slots[slot].item)
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Per level, the last slot whose key is strictly less than `key`
    /// (`inclusive == false`) or less than or equal (`inclusive == true`).
    fn predecessors(&self, key: &K, inclusive: bool) -> [Option<usize>; MAX_LEVEL] {
        let mut preds = [None; MAX_LEVEL];
        let mut at = None;
        for level in (0..self.height).rev() {
            while let Some(next) = self.next(at, level) {
                let next_key = self.key_at(next);
                let advance = if inclusive {
                    next_key <= *key
                } else {
                    next_key < *key
                };
                if !advance {
                    break;
                }
                at = Some(next);
            }
            preds[level] = at;
        }
        preds
    }

    /// Insert `item`. Returns `false` (and leaves the list unchanged) when an
    /// equal item is already present.
    pub fn add(&mut self, item: T) -> bool {
        if self.index.contains_key(&item) {
            return false;
        }
        let key = (self.key_of)(&item);
        let preds = self.predecessors(&key, true);
        let level = self.random_level();
        let slot = self.slots.insert(Slot {
            item: item.clone(),
            next: smallvec![None; level],
        });
        for (l, pred) in preds.iter().enumerate().take(level) {
            // Levels above the old height start from the head.
            let pred = if l < self.height { *pred } else { None };
            let after = self.next(pred, l);
            self.slots[slot].next[l] = after;
            self.set_next(pred, l, Some(slot));
        }
        self.height = self.height.max(level);
        self.index.insert(item, slot);
        true
    }

    /// First item whose key equals `key`.
    pub fn get(&self, key: &K) -> Option<&T> {
        let preds = self.predecessors(key, false);
        let slot = self.next(preds[0], 0)?;
        (self.key_at(slot) == *key).then(|| &self.slots[slot].item)
    }

    pub fn has(&self, item: &T) -> bool {
        self.index.contains_key(item)
    }

    /// Remove `item`. Returns whether it was present.
    pub fn remove(&mut self, item: &T) -> bool {
        let Some(&target) = self.index.get(item) else {
            return false;
        };
        let key = self.key_at(target);
        let preds = self.predecessors(&key, false);
        let levels = self.slots[target].next.len();
        for (level, pred) in preds.iter().enumerate().take(levels) {
            // Walk the run of equal keys at this level up to the target.
            let mut at = *pred;
            while let Some(next) = self.next(at, level) {
                if next == target {
                    let after = self.slots[target].next[level];
                    self.set_next(at, level, after);
                    break;
                }
                at = Some(next);
            }
        }
        self.index.remove(item);
        self.slots.remove(target);
        true
    }

    /// Remove every item whose key equals `key`. Returns how many were removed.
    pub fn remove_key(&mut self, key: &K) -> usize {
        let preds = self.predecessors(key, false);
        let mut removed = 0;
        while let Some(slot) = self.next(preds[0], 0) {
            if self.key_at(slot) != *key {
                break;
            }
            // Equal-key items are contiguous, so each one directly follows
            // the predecessors on every level it occupies.
            let levels = self.slots[slot].next.len();
            for (level, pred) in preds.iter().enumerate().take(levels) {
                let after = self.slots[slot].next[level];
                self.set_next(*pred, level, after);
            }
            let entry = self.slots.remove(slot);
            self.index.remove(&entry.item);
            removed += 1;
        }
        removed
    }

    /// The smallest item.
    pub fn first(&self) -> Option<&T> {
        self.head[0].map(|slot| &self.slots[slot].item)
    }

    /// Remove and return the smallest item.
    pub fn fetch_first(&mut self) -> Option<T> {
        let slot = self.head[0]?;
        let levels = self.slots[slot].next.len();
        for level in 0..levels {
            self.head[level] = self.slots[slot].next[level];
        }
        let entry = self.slots.remove(slot);
        self.index.remove(&entry.item);
        Some(entry.item)
    }

    /// Items in ascending key order.
    pub fn iter(&self) -> Iter<'_, T, K> {
        Iter {
            list: self,
            at: self.head[0],
        }
    }

    /// Items in ascending key order, starting at the first key `>= key`.
    pub fn iter_from(&self, key: &K) -> Iter<'_, T, K> {
        let preds = self.predecessors(key, false);
        Iter {
            list: self,
            at: self.next(preds[0], 0),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.head = [None; MAX_LEVEL];
        self.height = 1;
    }
}

/// Ascending iterator over a [`SkipList`].
pub struct Iter<'a, T, K> {
    list: &'a SkipList<T, K>,
    at: Option<usize>,
}

impl<'a, T, K> Iterator for Iter<'a, T, K> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.at?;
        let entry = &self.list.slots[slot];
        self.at = entry.next[0];
        Some(&entry.item)
    }
}

impl<T: std::fmt::Debug, K> std::fmt::Debug for SkipList<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut items = Vec::new();
        let mut at = self.head[0];
        while let Some(slot) = at {
            items.push(&self.slots[slot].item);
            at = self.slots[slot].next[0];
        }
        f.debug_struct("SkipList")
            .field("len", &self.slots.len())
            .field("height", &self.height)
            .field("items", &items)
            .finish()
    }
}
