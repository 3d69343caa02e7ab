//! Patches: the net effect of a block of writes.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::Result;
use crate::reactive::Runtime;
use crate::store::{same_value, Container, ContainerId, Key, Value};

/// Identifies a patch across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchId(u64);

impl PatchId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The net change to one slot: it held `old` before the patch and `new` after.
#[derive(Debug, Clone)]
pub struct PatchEntry {
    pub container: Container,
    pub key: Key,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

/// A mapping from (container, key) to (new, old).
///
/// Recording the same slot twice keeps the first `old` and the last `new`;
/// a slot that ends where it started is dropped.
#[derive(Debug, Clone)]
pub struct Patch {
    id: PatchId,
    entries: IndexMap<(ContainerId, Key), PatchEntry>,
}

impl Patch {
    pub fn new() -> Self {
        Self {
            id: PatchId::next(),
            entries: IndexMap::new(),
        }
    }

    pub fn id(&self) -> PatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order their slots were first touched.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &PatchEntry> {
        self.entries.values()
    }

    pub fn get(&self, container: &Container, key: &Key) -> Option<&PatchEntry> {
        self.entries.get(&(container.id(), key.clone()))
    }

    pub(crate) fn record(&mut self, container: &Container, key: &Key, new: Option<Value>, old: Option<Value>) {
        let slot = (container.id(), key.clone());
        match self.entries.get_mut(&slot) {
            Some(entry) => {
                entry.new = new;
                if same_value(entry.old.as_ref(), entry.new.as_ref()) {
                    self.entries.shift_remove(&slot);
                }
            }
            None => {
                if !same_value(old.as_ref(), new.as_ref()) {
                    self.entries.insert(
                        slot,
                        PatchEntry {
                            container: container.clone(),
                            key: key.clone(),
                            new,
                            old,
                        },
                    );
                }
            }
        }
    }

    /// Fold `other` in, as if its writes happened after ours.
    pub fn merge(&mut self, other: &Patch) {
        for entry in other.entries() {
            self.record(&entry.container, &entry.key, entry.new.clone(), entry.old.clone());
        }
    }

    /// The patch undoing this one.
    pub fn inverse(&self) -> Patch {
        let mut inverse = Patch::new();
        for entry in self.entries().rev() {
            inverse.record(&entry.container, &entry.key, entry.old.clone(), entry.new.clone());
        }
        inverse
    }

    /// Write every `new` value without telling anyone.
    pub fn apply_silently(&self) -> Result<()> {
        for entry in self.entries() {
            entry.container.raw_set(&entry.key, entry.new.clone())?;
        }
        Ok(())
    }

    /// Write every `new` value and emit the changes through `rt`.
    pub fn apply(&self, rt: &Runtime) -> Result<()> {
        self.apply_silently()?;
        rt.emit_patch(self);
        Ok(())
    }

    /// Whether every slot still holds the value this patch started from.
    pub fn matches_prior(&self) -> bool {
        self.entries().all(|entry| {
            let live = entry.container.get(&entry.key).ok().flatten();
            same_value(live.as_ref(), entry.old.as_ref())
        })
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}
