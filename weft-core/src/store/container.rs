//! Container Implementation
//!
//! A Container is a mutable keyed aggregate that remembers, per key, which
//! observers read it. It is the store's equivalent of a signal: instead of one
//! value with one subscriber set, it holds many values with one subscriber set
//! each, plus a wildcard set that hears about every key.
//!
//! # Kinds
//!
//! - **Sequence**: `Key::Index` keys, dense, trailing absents trimmed.
//! - **OrderedMap**: `Key::Str` keys, enumerated in insertion order.
//! - **GenericMap**: any key, enumerated in insertion order.
//!
//! # Invariants
//!
//! 1. No absent entries are stored. Setting a key to absent removes it.
//! 2. A Sequence never ends with a hole.
//! 3. A container is never reachable from itself (checked on assignment by
//!    the write path, see [`Container::reaches`]).
//!
//! Containers do not emit changes themselves. Mutation goes through
//! `raw_set`, which only updates data; the runtime decides whether to notify
//! observers or record the change into a patch.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::value::{Key, Value};
use crate::error::{Error, Result};
use crate::reactive::{Observer, ObserverId, Scope};

/// How far past the end of a Sequence a write may land.
pub const MAX_SEQUENCE_GAP: usize = 1 << 16;

/// Unique identifier for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The shape of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Sequence,
    OrderedMap,
    GenericMap,
}

impl ContainerKind {
    /// The kind materialized for an intermediate path step addressed by `key`.
    pub fn for_key(key: &Key) -> Self {
        match key {
            Key::Index(_) => ContainerKind::Sequence,
            Key::Str(_) => ContainerKind::OrderedMap,
            Key::Int(_) | Key::Bool(_) => ContainerKind::GenericMap,
        }
    }
}

fn key_type(key: &Key) -> &'static str {
    match key {
        Key::Index(_) => "index key",
        Key::Str(_) => "string key",
        Key::Int(_) => "integer key",
        Key::Bool(_) => "boolean key",
    }
}

enum Entries {
    Seq(Vec<Option<Value>>),
    Map(IndexMap<Key, Value>),
}

type ObserverSet = IndexMap<ObserverId, Rc<dyn Observer>>;

#[derive(Default)]
struct Observers {
    by_key: HashMap<Key, ObserverSet>,
    any: ObserverSet,
}

struct ContainerNode {
    id: ContainerId,
    kind: ContainerKind,
    entries: RefCell<Entries>,
    observers: RefCell<Observers>,
}

/// A shared handle to a mutable, observable keyed aggregate.
///
/// Cloning a `Container` creates another handle to the same data. Equality is
/// identity.
#[derive(Clone)]
pub struct Container {
    node: Rc<ContainerNode>,
}

impl Container {
    /// Create an empty container.
    pub fn new(kind: ContainerKind) -> Self {
        let entries = match kind {
            ContainerKind::Sequence => Entries::Seq(Vec::new()),
            ContainerKind::OrderedMap | ContainerKind::GenericMap => Entries::Map(IndexMap::new()),
        };
        Self {
            node: Rc::new(ContainerNode {
                id: ContainerId::next(),
                kind,
                entries: RefCell::new(entries),
                observers: RefCell::new(Observers::default()),
            }),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.node.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.node.kind
    }

    pub fn ptr_eq(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// Number of slots: the length for a Sequence (holes included), the
    /// entry count for maps.
    pub fn len(&self) -> usize {
        match &*self.node.entries.borrow() {
            Entries::Seq(items) => items.len(),
            Entries::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys in enumeration order.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.node.entries.borrow() {
            Entries::Seq(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_some())
                .map(|(i, _)| Key::Index(i))
                .collect(),
            Entries::Map(map) => map.keys().cloned().collect(),
        }
    }

    /// Live entries in enumeration order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &*self.node.entries.borrow() {
            Entries::Seq(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.clone().map(|v| (Key::Index(i), v)))
                .collect(),
            Entries::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        let expected = match (self.node.kind, key) {
            (ContainerKind::Sequence, Key::Index(_)) => return Ok(()),
            (ContainerKind::OrderedMap, Key::Str(_)) => return Ok(()),
            (ContainerKind::GenericMap, _) => return Ok(()),
            (ContainerKind::Sequence, _) => "index key",
            (ContainerKind::OrderedMap, _) => "string key",
        };
        Err(Error::Type {
            expected,
            found: key_type(key),
        })
    }

    /// Current value at `key`, without subscribing.
    pub fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.check_key(key)?;
        Ok(match (&*self.node.entries.borrow(), key) {
            (Entries::Seq(items), Key::Index(i)) => items.get(*i).cloned().flatten(),
            (Entries::Map(map), key) => map.get(key).cloned(),
            _ => None,
        })
    }

    /// Store `value` at `key` without notifying anyone. Returns the prior
    /// value.
    pub(crate) fn raw_set(&self, key: &Key, value: Option<Value>) -> Result<Option<Value>> {
        self.check_key(key)?;
        let mut entries = self.node.entries.borrow_mut();
        let old = match (&mut *entries, key) {
            (Entries::Seq(items), Key::Index(i)) => {
                let i = *i;
                match value {
                    Some(value) => {
                        if i >= items.len() {
                            if i > items.len() + MAX_SEQUENCE_GAP {
                                return Err(Error::IndexOutOfRange {
                                    index: i,
                                    len: items.len(),
                                });
                            }
                            items.resize(i + 1, None);
                        }
                        items[i].replace(value)
                    }
                    None => {
                        let old = items.get_mut(i).and_then(Option::take);
                        while matches!(items.last(), Some(None)) {
                            items.pop();
                        }
                        old
                    }
                }
            }
            (Entries::Map(map), key) => match value {
                Some(value) => map.insert(key.clone(), value),
                None => map.shift_remove(key),
            },
            _ => None,
        };
        Ok(old)
    }

    /// Register `observer` for `key`, or for every key when `key` is `None`.
    /// Returns `false` if it was already registered there.
    pub(crate) fn subscribe(&self, key: Option<&Key>, observer: Rc<dyn Observer>) -> bool {
        let id = observer.observer_id();
        let mut observers = self.node.observers.borrow_mut();
        let set = match key {
            Some(key) => observers.by_key.entry(key.clone()).or_default(),
            None => &mut observers.any,
        };
        if set.contains_key(&id) {
            return false;
        }
        set.insert(id, observer);
        true
    }

    /// Remove a registration made by [`subscribe`](Self::subscribe).
    pub(crate) fn unsubscribe(&self, key: Option<&Key>, id: ObserverId) {
        let mut observers = self.node.observers.borrow_mut();
        match key {
            Some(key) => {
                if let Some(set) = observers.by_key.get_mut(key) {
                    set.shift_remove(&id);
                    if set.is_empty() {
                        observers.by_key.remove(key);
                    }
                }
            }
            None => {
                observers.any.shift_remove(&id);
            }
        }
    }

    /// Observers to notify for a change at `key`: those on the key first,
    /// then the wildcard set, each in registration order.
    pub(crate) fn observers_for(&self, key: &Key) -> Vec<Rc<dyn Observer>> {
        let observers = self.node.observers.borrow();
        observers
            .by_key
            .get(key)
            .into_iter()
            .flat_map(|set| set.values())
            .chain(observers.any.values())
            .cloned()
            .collect()
    }

    /// Total number of registrations, wildcard included.
    pub fn observer_count(&self) -> usize {
        let observers = self.node.observers.borrow();
        observers.by_key.values().map(|s| s.len()).sum::<usize>() + observers.any.len()
    }

    /// Whether `target` is reachable from this container through nested
    /// container references.
    pub fn reaches(&self, target: &Container) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.id()) {
                continue;
            }
            for (_, value) in current.entries() {
                if let Value::Container(child) = value {
                    if child.ptr_eq(target) {
                        return true;
                    }
                    stack.push(child);
                }
            }
        }
        false
    }

    /// Plain copy of the content, expanding nested containers up to `depth`
    /// levels (this one counts as the first). Does not subscribe.
    pub fn snapshot(&self, depth: usize) -> Value {
        self.snapshot_with(depth, None)
    }

    /// Like [`snapshot`](Self::snapshot), subscribing `cx` to the wildcard key
    /// of every container expanded.
    pub(crate) fn snapshot_with(&self, depth: usize, cx: Option<&Scope>) -> Value {
        if let Some(cx) = cx {
            cx.track(self, None);
        }
        let expand = |value: Value| match value {
            Value::Container(child) if depth > 1 => child.snapshot_with(depth - 1, cx),
            other => other,
        };
        match self.node.kind {
            ContainerKind::Sequence => {
                let items: Vec<Option<Value>> = match &*self.node.entries.borrow() {
                    Entries::Seq(items) => items.clone(),
                    Entries::Map(_) => Vec::new(),
                };
                Value::Seq(
                    items
                        .into_iter()
                        .map(|v| expand(v.unwrap_or(Value::Null)))
                        .collect(),
                )
            }
            ContainerKind::OrderedMap => Value::Map(
                self.entries()
                    .into_iter()
                    .map(|(k, v)| (k.label(), expand(v)))
                    .collect(),
            ),
            ContainerKind::GenericMap => Value::Dict(
                self.entries()
                    .into_iter()
                    .map(|(k, v)| (k, expand(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.node.id)
            .field("kind", &self.node.kind)
            .finish()
    }
}
