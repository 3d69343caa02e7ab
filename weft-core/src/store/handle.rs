//! Store handles.
//!
//! A [`Store`] names one slot in the tree: an anchor container plus a path of
//! keys below it. Handles are cheap to clone and derive; nothing is resolved
//! until the handle is read or written.
//!
//! # Reading
//!
//! Reads that take a scope (`get`, `get_number`, `count`, ...) subscribe that
//! scope to every (container, key) pair they pass through, so the scope reruns
//! when any step of the path changes. An absent step ends the read with `None`
//! and creates nothing. The `peek` family reads without subscribing.
//!
//! # Writing
//!
//! Writes materialize missing intermediate containers: a Sequence when the next
//! key is an index, an OrderedMap for a string key, a GenericMap otherwise.
//! Either way, continuing a path through a primitive value is an error.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::container::{Container, ContainerKind};
use super::value::{Key, Value};
use super::write::{write, Mode};
use crate::error::{Error, Result};
use crate::reactive::{Runtime, Scope};

/// A handle to one slot of the observable store.
#[derive(Clone)]
pub struct Store {
    rt: Runtime,
    anchor: Container,
    steps: SmallVec<[Key; 4]>,
    key: Key,
}

impl Store {
    /// Root handle holding `value`.
    pub(crate) fn root(rt: &Runtime, value: Value) -> Result<Self> {
        let holder = Container::new(ContainerKind::Sequence);
        let store = Self::entry(rt, &holder, Key::Index(0));
        store.set(value)?;
        Ok(store)
    }

    /// Handle to `container[key]`.
    pub fn entry(rt: &Runtime, container: &Container, key: impl Into<Key>) -> Self {
        Self {
            rt: rt.clone(),
            anchor: container.clone(),
            steps: SmallVec::new(),
            key: key.into(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// The last key of the path.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Child handle at `key`.
    pub fn at(&self, key: impl Into<Key>) -> Store {
        let mut child = self.clone();
        let parent = std::mem::replace(&mut child.key, key.into());
        child.steps.push(parent);
        child
    }

    /// Child handle at sequence index `i`.
    pub fn index(&self, i: usize) -> Store {
        self.at(Key::Index(i))
    }

    /// Descendant handle following `keys`.
    pub fn path<I, K>(&self, keys: I) -> Store
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        keys.into_iter().fold(self.clone(), |store, key| store.at(key))
    }

    fn resolve_read(&self, cx: Option<&Scope>) -> Result<Option<(Container, Key)>> {
        let mut current = self.anchor.clone();
        for key in &self.steps {
            if let Some(cx) = cx {
                cx.track(&current, Some(key));
            }
            match current.get(key)? {
                None => return Ok(None),
                Some(Value::Container(next)) => current = next,
                Some(other) => {
                    return Err(Error::ThroughPrimitive {
                        key: key.clone(),
                        found: other.type_name(),
                    })
                }
            }
        }
        Ok(Some((current, self.key.clone())))
    }

    fn resolve_write(&self) -> Result<(Container, Key)> {
        let mut current = self.anchor.clone();
        for (i, key) in self.steps.iter().enumerate() {
            let next_key = self.steps.get(i + 1).unwrap_or(&self.key);
            current = match current.get(key)? {
                Some(Value::Container(next)) => next,
                None => {
                    let next = Container::new(ContainerKind::for_key(next_key));
                    write(
                        &self.rt,
                        &current,
                        key,
                        Some(Value::Container(next.clone())),
                        Mode::Replace,
                    )?;
                    next
                }
                Some(other) => {
                    return Err(Error::ThroughPrimitive {
                        key: key.clone(),
                        found: other.type_name(),
                    })
                }
            };
        }
        Ok((current, self.key.clone()))
    }

    fn read(&self, cx: Option<&Scope>) -> Result<Option<Value>> {
        let Some((container, key)) = self.resolve_read(cx)? else {
            return Ok(None);
        };
        if let Some(cx) = cx {
            cx.track(&container, Some(&key));
        }
        container.get(&key)
    }

    fn read_depth(&self, cx: Option<&Scope>, depth: usize) -> Result<Option<Value>> {
        Ok(self.read(cx)?.map(|value| match value {
            Value::Container(c) if depth > 0 => c.snapshot_with(depth, cx),
            other => other,
        }))
    }

    /// Subscribing deep read returning a plain snapshot.
    pub fn get(&self, cx: &Scope) -> Result<Option<Value>> {
        self.read_depth(Some(cx), usize::MAX)
    }

    /// Subscribing read expanding at most `depth` container levels. Deeper
    /// containers come back as live [`Value::Container`] references.
    pub fn get_depth(&self, cx: &Scope, depth: usize) -> Result<Option<Value>> {
        self.read_depth(Some(cx), depth)
    }

    /// Deep read without subscribing.
    pub fn peek(&self) -> Result<Option<Value>> {
        self.read_depth(None, usize::MAX)
    }

    pub fn peek_depth(&self, depth: usize) -> Result<Option<Value>> {
        self.read_depth(None, depth)
    }

    pub fn get_number(&self, cx: &Scope) -> Result<Option<f64>> {
        match self.read(Some(cx))? {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(n)),
            Some(other) => Err(Error::Type {
                expected: "number",
                found: other.type_name(),
            }),
        }
    }

    pub fn get_str(&self, cx: &Scope) -> Result<Option<Rc<str>>> {
        match self.read(Some(cx))? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::Type {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    pub fn get_bool(&self, cx: &Scope) -> Result<Option<bool>> {
        match self.read(Some(cx))? {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(Error::Type {
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }

    /// The live container at this slot, if it holds one.
    pub fn container(&self, cx: &Scope) -> Result<Option<Container>> {
        Ok(self.read(Some(cx))?.and_then(|v| v.as_container().cloned()))
    }

    pub fn peek_container(&self) -> Result<Option<Container>> {
        Ok(self.read(None)?.and_then(|v| v.as_container().cloned()))
    }

    fn tracked_container(&self, cx: &Scope) -> Result<Option<Container>> {
        match self.read(Some(cx))? {
            None => Ok(None),
            Some(Value::Container(c)) => {
                cx.track(&c, None);
                Ok(Some(c))
            }
            Some(other) => Err(Error::Type {
                expected: "container",
                found: other.type_name(),
            }),
        }
    }

    /// Number of slots in the container here (0 when absent). Reruns `cx`
    /// on any key change.
    pub fn count(&self, cx: &Scope) -> Result<usize> {
        Ok(self.tracked_container(cx)?.map_or(0, |c| c.len()))
    }

    pub fn is_empty(&self, cx: &Scope) -> Result<bool> {
        Ok(self.count(cx)? == 0)
    }

    /// Live keys of the container here, in enumeration order.
    pub fn keys(&self, cx: &Scope) -> Result<Vec<Key>> {
        Ok(self
            .tracked_container(cx)?
            .map(|c| c.keys())
            .unwrap_or_default())
    }

    /// Replace the value here. Plain collections update an existing container
    /// of the same kind in place, deleting keys the new value lacks.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let (container, key) = self.resolve_write()?;
        write(&self.rt, &container, &key, Some(value.into()), Mode::Replace)
    }

    /// Like [`set`](Self::set), but never deletes keys.
    pub fn merge(&self, value: impl Into<Value>) -> Result<()> {
        let (container, key) = self.resolve_write()?;
        write(&self.rt, &container, &key, Some(value.into()), Mode::Merge)
    }

    /// Remove the value here. Missing intermediates are not created.
    pub fn delete(&self) -> Result<()> {
        match self.resolve_read(None)? {
            Some((container, key)) => write(&self.rt, &container, &key, None, Mode::Replace),
            None => Ok(()),
        }
    }

    /// Append to the Sequence here, creating it when absent. Returns the new
    /// index.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let (container, key) = self.resolve_write()?;
        let seq = match container.get(&key)? {
            Some(Value::Container(c)) if c.kind() == ContainerKind::Sequence => c,
            None => {
                let seq = Container::new(ContainerKind::Sequence);
                write(
                    &self.rt,
                    &container,
                    &key,
                    Some(Value::Container(seq.clone())),
                    Mode::Replace,
                )?;
                seq
            }
            Some(other) => {
                return Err(Error::Type {
                    expected: "sequence",
                    found: other.type_name(),
                })
            }
        };
        let index = seq.len();
        write(&self.rt, &seq, &Key::Index(index), Some(value.into()), Mode::Replace)?;
        Ok(index)
    }

    /// JSON export of the current value, `null` when absent.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(self
            .peek()?
            .map_or(serde_json::Value::Null, |v| v.to_json()))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("anchor", &self.anchor)
            .field("steps", &self.steps)
            .field("key", &self.key)
            .finish()
    }
}
