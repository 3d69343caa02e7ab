//! The write path.
//!
//! Every mutation of the store goes through [`write`], which decides between
//! aliasing, in-place update and fresh materialization, drops no-op writes,
//! and hands each real change to [`Runtime::emit`].

use std::collections::HashSet;

use super::container::Container;
use super::value::{same_value, Key, Value};
use crate::error::{Error, Result};
use crate::reactive::Runtime;

/// How a plain collection is written over an existing container of the same
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Keys missing from the new value are deleted. Sequences are truncated
    /// to the new length.
    Replace,
    /// Keys are only added or overwritten.
    Merge,
}

/// Set `container[key]` to `value` (absent deletes), emitting every change.
pub(crate) fn write(
    rt: &Runtime,
    container: &Container,
    key: &Key,
    value: Option<Value>,
    mode: Mode,
) -> Result<()> {
    let old = container.get(key)?;
    let Some(value) = value else {
        if old.is_some() {
            container.raw_set(key, None)?;
            rt.emit(container, key, None, old);
        }
        return Ok(());
    };

    match value {
        Value::Container(target) => {
            if let Some(Value::Container(current)) = &old {
                if current.ptr_eq(&target) {
                    return Ok(());
                }
            }
            install(rt, container, key, target, old)
        }
        value => match value.collection_kind() {
            Some(kind) => {
                if let Some(Value::Container(current)) = &old {
                    if current.kind() == kind {
                        return update(rt, current, value, mode);
                    }
                }
                let fresh = Container::new(kind);
                fill(&fresh, value)?;
                install(rt, container, key, fresh, old)
            }
            None => {
                if same_value(old.as_ref(), Some(&value)) {
                    return Ok(());
                }
                container.raw_set(key, Some(value.clone()))?;
                rt.emit(container, key, Some(value), old);
                Ok(())
            }
        },
    }
}

/// Store a container reference, refusing to create a cycle.
fn install(
    rt: &Runtime,
    container: &Container,
    key: &Key,
    target: Container,
    old: Option<Value>,
) -> Result<()> {
    if target.ptr_eq(container) || target.reaches(container) {
        return Err(Error::Cycle { key: key.clone() });
    }
    let new = Value::Container(target);
    container.raw_set(key, Some(new.clone()))?;
    rt.emit(container, key, Some(new), old);
    Ok(())
}

/// Write a plain collection into an existing container of the same kind.
fn update(rt: &Runtime, target: &Container, value: Value, mode: Mode) -> Result<()> {
    let entries = value.into_entries();
    if mode == Mode::Replace {
        let stale: Vec<Key> = match target.kind() {
            super::ContainerKind::Sequence => target
                .keys()
                .into_iter()
                .filter(|k| k.as_index().is_some_and(|i| i >= entries.len()))
                .rev()
                .collect(),
            _ => {
                let keep: HashSet<&Key> = entries.iter().map(|(k, _)| k).collect();
                target
                    .keys()
                    .into_iter()
                    .filter(|k| !keep.contains(k))
                    .collect()
            }
        };
        for key in &stale {
            write(rt, target, key, None, mode)?;
        }
    }
    for (key, value) in entries {
        write(rt, target, &key, Some(value), mode)?;
    }
    Ok(())
}

/// Populate a container nobody observes yet. Nested plain collections become
/// fresh containers too.
fn fill(target: &Container, value: Value) -> Result<()> {
    for (key, value) in value.into_entries() {
        let value = match value.collection_kind() {
            Some(kind) => {
                let nested = Container::new(kind);
                fill(&nested, value)?;
                Value::Container(nested)
            }
            None => value,
        };
        target.raw_set(&key, Some(value))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn list_of(rt: &Runtime, items: serde_json::Value) -> (Container, Container) {
        let store = rt.store(json!({ "list": items })).unwrap();
        let root = store.peek_container().unwrap().unwrap();
        let list = store.at("list").peek_container().unwrap().unwrap();
        (root, list)
    }

    #[test]
    fn replace_truncates_sequences_in_place() {
        let rt = Runtime::new();
        let (root, list) = list_of(&rt, json!([1, 2, 3]));
        write(&rt, &root, &Key::from("list"), Some(json!([9]).into()), Mode::Replace).unwrap();

        let now = root.get(&Key::from("list")).unwrap();
        assert_eq!(now, Some(Value::Container(list.clone())));
        assert_eq!(Value::Container(list).to_json(), json!([9]));
    }

    #[test]
    fn merge_never_truncates_sequences() {
        let rt = Runtime::new();
        let (root, list) = list_of(&rt, json!([1, 2, 3]));
        write(&rt, &root, &Key::from("list"), Some(json!([7]).into()), Mode::Merge).unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(Value::Container(list).to_json(), json!([7, 2, 3]));
    }

    #[test]
    fn identical_values_emit_nothing() {
        let rt = Runtime::new();
        let store = rt.store(json!({ "n": 1 })).unwrap();
        store.at("nan").set(f64::NAN).unwrap();
        let root = store.peek_container().unwrap().unwrap();
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let s = store.clone();
        rt.observe(move |cx| {
            s.get(cx)?;
            counter.set(counter.get() + 1);
            Ok(())
        });

        write(&rt, &root, &Key::from("n"), Some(Value::from(1)), Mode::Replace).unwrap();
        write(&rt, &root, &Key::from("nan"), Some(Value::from(f64::NAN)), Mode::Replace).unwrap();
        write(&rt, &root, &Key::from("gone"), None, Mode::Replace).unwrap();
        assert_eq!(rt.pending_count(), 0);

        write(&rt, &root, &Key::from("n"), Some(Value::from(2)), Mode::Replace).unwrap();
        assert_eq!(rt.pending_count(), 1);
        rt.flush().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn aliasing_the_same_container_is_a_no_op() {
        let rt = Runtime::new();
        let (root, list) = list_of(&rt, json!([1]));
        let watcher = rt.observe({
            let root = root.clone();
            move |cx| {
                cx.track(&root, Some(&Key::from("list")));
                Ok(())
            }
        });
        write(&rt, &root, &Key::from("list"), Some(Value::Container(list)), Mode::Replace).unwrap();
        assert_eq!(rt.pending_count(), 0);
        watcher.unmount();
    }
}
