//! Keyed List Reconciliation
//!
//! A list scope keeps one item scope per live key of a target container.
//!
//! # How It Works
//!
//! 1. On activation the list subscribes to the container's wildcard key and
//!    starts an item for every key present.
//!
//! 2. Each change the wildcard reports is classified as an appearance or a
//!    disappearance and stored in a pending set. A key that appears and then
//!    disappears before the list runs (or the other way round) cancels out.
//!    Value updates to existing keys are left to the items themselves.
//!
//! 3. When the scheduler runs the list, it creates and destroys items for the
//!    pending keys. Items are one level deeper than the list, so they run
//!    after it within the same flush.
//!
//! 4. An item computes its sort key, encodes it to a sort string and, when
//!    the string changed, moves itself within the visible array. An empty
//!    sort string means the item is tracked but not shown. It then renders.
//!
//! The visible array is ordered by sort string and searched by bisection.
//! Items with equal sort strings keep insertion order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::scope::{Scope, ScopeKind, ScopeNode};
use super::subscriber::Change;
use crate::error::Result;
use crate::order::{encode, SortKey};
use crate::store::{Container, Key, Store};

pub(crate) type SortFn = Rc<dyn Fn(&Scope, &Store) -> Result<Option<SortKey>>>;
pub(crate) type RenderFn = Rc<dyn Fn(&Scope, Store) -> Result<()>>;

/// Orders items by their key.
pub(crate) fn default_sort_key(_cx: &Scope, item: &Store) -> Result<Option<SortKey>> {
    Ok(Some(match item.key() {
        Key::Index(i) => SortKey::from(*i),
        Key::Str(s) => SortKey::from(s.as_ref()),
        Key::Int(i) => SortKey::from(*i),
        Key::Bool(b) => SortKey::from(i32::from(*b)),
    }))
}

pub(crate) struct ListState {
    target: Container,
    sort_key: SortFn,
    render: RenderFn,
    items: RefCell<IndexMap<Key, Scope>>,
    visible: RefCell<Vec<Scope>>,
    /// Pending membership changes: `true` for appeared.
    changes: RefCell<IndexMap<Key, bool>>,
}

pub(crate) struct ItemState {
    list: Weak<ScopeNode>,
    key: Key,
    store: Store,
    sort: RefCell<String>,
}

impl ItemState {
    pub(crate) fn key(&self) -> &Key {
        &self.key
    }
}

impl ListState {
    pub(crate) fn new(target: Container, sort_key: SortFn, render: RenderFn) -> Self {
        Self {
            target,
            sort_key,
            render,
            items: RefCell::new(IndexMap::new()),
            visible: RefCell::new(Vec::new()),
            changes: RefCell::new(IndexMap::new()),
        }
    }

    pub(crate) fn activate(&self, list: &Scope) {
        list.track(&self.target, None);
        let keys = self.target.keys();
        tracing::debug!(items = keys.len(), "keyed list activated");
        for key in keys {
            self.create_item(list, key);
        }
    }

    fn create_item(&self, list: &Scope, key: Key) {
        let Some(rt) = list.runtime() else {
            return;
        };
        let item = list.item(ItemState {
            list: Rc::downgrade(&list.node),
            key: key.clone(),
            store: Store::entry(&rt, &self.target, key.clone()),
            sort: RefCell::new(String::new()),
        });
        self.items.borrow_mut().insert(key, item.clone());
        item.start();
    }

    /// Record a membership change. Returns whether anything is now pending.
    pub(crate) fn note_change(&self, change: &Change) -> bool {
        let appeared = if change.appeared() {
            true
        } else if change.disappeared() {
            false
        } else {
            return false;
        };
        let mut changes = self.changes.borrow_mut();
        match changes.get(&change.key) {
            Some(&pending) if pending != appeared => {
                changes.shift_remove(&change.key);
            }
            _ => {
                changes.insert(change.key.clone(), appeared);
            }
        }
        !changes.is_empty()
    }

    /// Create and destroy items for the pending membership changes.
    pub(crate) fn apply_changes(&self, list: &Scope) {
        let changes = std::mem::take(&mut *self.changes.borrow_mut());
        if changes.is_empty() {
            return;
        }
        tracing::debug!(changes = changes.len(), "reconciling keyed list");
        for (key, appeared) in changes {
            let present = matches!(self.target.get(&key), Ok(Some(_)));
            if appeared && present {
                let live = self
                    .items
                    .borrow()
                    .get(&key)
                    .is_some_and(|item| !item.is_dead());
                if !live {
                    self.create_item(list, key);
                }
            } else if !appeared && !present {
                let removed = self.items.borrow_mut().shift_remove(&key);
                if let Some(item) = removed {
                    item.destroy();
                }
            }
        }
    }

    pub(crate) fn teardown_items(&self) {
        self.changes.borrow_mut().clear();
        let items = std::mem::take(&mut *self.items.borrow_mut());
        for item in items.into_values() {
            item.destroy();
        }
    }

    pub(crate) fn visible(&self) -> Vec<Scope> {
        self.visible.borrow().clone()
    }

    fn position(&self, item: &Scope, sort: &str) -> Option<usize> {
        let visible = self.visible.borrow();
        let start = visible.partition_point(|s| with_sort(s, |k| k < sort));
        visible[start..]
            .iter()
            .position(|s| s.ptr_eq(item))
            .map(|offset| start + offset)
    }

    fn remove_visible(&self, list: &Scope, item: &Scope, sort: &str) {
        if sort.is_empty() {
            return;
        }
        let Some(index) = self.position(item, sort) else {
            return;
        };
        self.visible.borrow_mut().remove(index);
        if let Some(attach) = list.runtime().and_then(|rt| rt.attach()) {
            attach.removed(list, item);
        }
    }

    fn insert_visible(&self, list: &Scope, item: &Scope, sort: &str) {
        let after = {
            let mut visible = self.visible.borrow_mut();
            let index = visible.partition_point(|s| with_sort(s, |k| k <= sort));
            visible.insert(index, item.clone());
            index.checked_sub(1).map(|i| visible[i].clone())
        };
        if let Some(attach) = list.runtime().and_then(|rt| rt.attach()) {
            attach.inserted(list, item, after.as_ref());
        }
    }
}

fn with_sort<R>(scope: &Scope, f: impl FnOnce(&str) -> R) -> R {
    match &scope.node.kind {
        ScopeKind::Item(item) => f(&item.sort.borrow()),
        _ => f(""),
    }
}

/// The list scope and list state an item belongs to.
fn owner(item: &Scope) -> Option<(&ItemState, Scope)> {
    let ScopeKind::Item(state) = &item.node.kind else {
        return None;
    };
    let node = state.list.upgrade()?;
    Some((state, Scope { node }))
}

/// Run an item: sort, reposition, render.
pub(crate) fn run_item(item: &Scope) {
    let Some((state, list)) = owner(item) else {
        return;
    };
    let ScopeKind::List(list_state) = &list.node.kind else {
        return;
    };

    item.clear_failure();
    let sort = match item.running(|| (list_state.sort_key)(item, &state.store)) {
        Ok(Some(key)) => encode(&key),
        Ok(None) => String::new(),
        Err(error) => {
            item.fail(&error);
            String::new()
        }
    };

    let old = state.sort.borrow().clone();
    if old != sort {
        list_state.remove_visible(&list, item, &old);
        *state.sort.borrow_mut() = sort.clone();
        if !sort.is_empty() {
            list_state.insert_visible(&list, item, &sort);
        }
    }

    if let Err(error) = item.running(|| (list_state.render)(item, state.store.clone())) {
        item.fail(&error);
    }
}

/// Take a destroyed item out of its list's visible order.
pub(crate) fn detach_item(item: &Scope) {
    let Some((state, list)) = owner(item) else {
        return;
    };
    let ScopeKind::List(list_state) = &list.node.kind else {
        return;
    };
    let old = state.sort.borrow().clone();
    list_state.remove_visible(&list, item, &old);
    state.sort.borrow_mut().clear();
}

pub(crate) fn preceding_sibling(item: &Scope) -> Option<Scope> {
    let (state, list) = owner(item)?;
    let ScopeKind::List(list_state) = &list.node.kind else {
        return None;
    };
    let sort = state.sort.borrow().clone();
    if sort.is_empty() {
        return None;
    }
    let index = list_state.position(item, &sort)?;
    let visible = list_state.visible.borrow();
    index.checked_sub(1).map(|i| visible[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use serde_json::json;

    fn keys_of(scopes: &[Scope]) -> Vec<Option<Key>> {
        scopes.iter().map(Scope::key).collect()
    }

    #[test]
    fn appear_then_disappear_creates_nothing() {
        let rt = Runtime::new();
        let store = rt.store(json!({ "a": 1 })).unwrap();
        let renders = Rc::new(RefCell::new(Vec::new()));
        let log = renders.clone();
        let list = rt
            .on_each(&store, move |_, item| {
                log.borrow_mut().push(item.key().clone());
                Ok(())
            })
            .unwrap()
            .unwrap();
        renders.borrow_mut().clear();

        store.at("b").set(2).unwrap();
        store.at("b").delete().unwrap();
        rt.flush().unwrap();

        assert!(renders.borrow().is_empty());
        assert_eq!(keys_of(&list.visible_children()), vec![Some(Key::from("a"))]);
    }

    #[test]
    fn disappear_then_appear_keeps_the_item() {
        let rt = Runtime::new();
        let store = rt.store(json!({ "a": 1 })).unwrap();
        let list = rt.on_each(&store, |_, _| Ok(())).unwrap().unwrap();
        let before = list.visible_children()[0].clone();

        store.at("a").delete().unwrap();
        store.at("a").set(3).unwrap();
        rt.flush().unwrap();

        let after = list.visible_children();
        assert_eq!(after.len(), 1);
        assert!(after[0].ptr_eq(&before));
        assert!(!before.is_dead());
    }

    #[test]
    fn equal_sort_strings_insert_after_existing() {
        let rt = Runtime::new();
        let store = rt.store(json!({ "a": 1, "b": 2, "c": 3 })).unwrap();
        let list = rt
            .on_each_sorted(&store, |_, _| Ok(Some(SortKey::from(0))), |_, _| Ok(()))
            .unwrap()
            .unwrap();

        store.at("d").set(4).unwrap();
        rt.flush().unwrap();

        let visible = list.visible_children();
        assert_eq!(
            keys_of(&visible),
            vec![
                Some(Key::from("a")),
                Some(Key::from("b")),
                Some(Key::from("c")),
                Some(Key::from("d")),
            ]
        );
        assert_eq!(visible[3].preceding_sibling(), Some(visible[2].clone()));
    }

    #[test]
    fn filtered_items_are_skipped_as_siblings() {
        let rt = Runtime::new();
        let store = rt.store(json!({ "a": 1, "b": 0, "c": 3 })).unwrap();
        let list = rt
            .on_each_sorted(
                &store,
                |cx, item| Ok(item.get_number(cx)?.filter(|n| *n > 0.0).map(SortKey::from)),
                |_, _| Ok(()),
            )
            .unwrap()
            .unwrap();

        let visible = list.visible_children();
        assert_eq!(keys_of(&visible), vec![Some(Key::from("a")), Some(Key::from("c"))]);
        assert_eq!(visible[1].preceding_sibling(), Some(visible[0].clone()));
        assert_eq!(visible[0].preceding_sibling(), None);

        store.at("b").set(2).unwrap();
        rt.flush().unwrap();

        let visible = list.visible_children();
        assert_eq!(
            keys_of(&visible),
            vec![Some(Key::from("a")), Some(Key::from("b")), Some(Key::from("c"))]
        );
        assert_eq!(visible[2].preceding_sibling(), Some(visible[1].clone()));
    }
}
