//! Integration Tests for the Reactive Engine
//!
//! These tests verify that the store, scopes, scheduler, keyed lists and
//! predictions work together correctly.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use serde_json::json;
use weft_core::{
    encode, key_between, set_error_handler, Attach, Config, Error, Key, Runtime, Scope, SortKey,
};

type Log<T> = Rc<RefCell<Vec<T>>>;

fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

fn visible_keys(list: &Scope) -> Vec<Key> {
    list.visible_children()
        .iter()
        .filter_map(Scope::key)
        .collect()
}

/// Nested scopes rerun parents first, whatever order they were queued in.
#[test]
fn scopes_rerun_in_depth_order() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "a": 0, "b": 0, "c": 0 })).unwrap();
    let order: Log<&str> = log();

    let (a, b, c) = (store.at("a"), store.at("b"), store.at("c"));
    let seen = order.clone();
    rt.observe(move |cx| {
        a.get(cx)?;
        seen.borrow_mut().push("A");
        let (b, c, seen) = (b.clone(), c.clone(), seen.clone());
        cx.observe(move |cx| {
            b.get(cx)?;
            seen.borrow_mut().push("B");
            let (c, seen) = (c.clone(), seen.clone());
            cx.observe(move |cx| {
                c.get(cx)?;
                seen.borrow_mut().push("C");
                Ok(())
            });
            Ok(())
        });
        Ok(())
    });
    assert_eq!(*order.borrow(), vec!["A", "B", "C"]);

    order.borrow_mut().clear();
    store.at("c").set(1).unwrap();
    store.at("b").set(1).unwrap();
    rt.flush().unwrap();
    assert_eq!(*order.borrow(), vec!["B", "C"]);

    order.borrow_mut().clear();
    store.at("c").set(2).unwrap();
    store.at("b").set(2).unwrap();
    store.at("a").set(2).unwrap();
    rt.flush().unwrap();
    assert_eq!(*order.borrow(), vec!["A", "B", "C"]);
}

/// Two scopes feeding each other stop at the recursion ceiling.
#[test]
fn mutual_feedback_hits_recursion_limit() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "x": 0, "y": 0 })).unwrap();

    let (x, y) = (store.at("x"), store.at("y"));
    rt.observe(move |cx| {
        let v = x.get_number(cx)?.unwrap_or(0.0);
        y.set(v + 1.0)
    });
    let (x, y) = (store.at("x"), store.at("y"));
    rt.observe(move |cx| {
        let v = y.get_number(cx)?.unwrap_or(0.0);
        x.set(v + 1.0)
    });

    assert_eq!(rt.flush(), Err(Error::RecursionLimit { limit: 42 }));
    assert_eq!(rt.pending_count(), 0);
    let x = store.at("x").peek().unwrap().and_then(|v| v.as_f64()).unwrap();
    assert!(x < 100.0, "stopped after {x}");
}

/// Keys inserted one at a time stay in order after every flush.
#[test]
fn keyed_list_keeps_alphabetical_order() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "items": {} })).unwrap();
    let list = rt
        .on_each(&store.at("items"), |_, _| Ok(()))
        .unwrap()
        .unwrap();

    let mut inserted = Vec::new();
    for name in ["d", "a", "b", "f", "c", "e"] {
        store.at("items").at(name).set(true).unwrap();
        rt.flush().unwrap();

        inserted.push(name);
        let mut expected: Vec<Key> = inserted.iter().map(|n| Key::from(*n)).collect();
        expected.sort();
        assert_eq!(visible_keys(&list), expected);
    }

    store.at("items").at("c").delete().unwrap();
    rt.flush().unwrap();
    assert_eq!(
        visible_keys(&list),
        ["a", "b", "d", "e", "f"].map(Key::from).to_vec()
    );
}

/// Items follow their sort key, and items without one are hidden.
#[test]
fn keyed_list_sorts_and_filters() {
    let rt = Runtime::new();
    let store = rt
        .store(json!({ "scores": { "ann": 30, "bob": 10, "cat": null } }))
        .unwrap();
    let list = rt
        .on_each_sorted(
            &store.at("scores"),
            |cx, item| Ok(item.get_number(cx).ok().flatten().map(SortKey::from)),
            |_, _| Ok(()),
        )
        .unwrap()
        .unwrap();
    assert_eq!(visible_keys(&list), vec![Key::from("bob"), Key::from("ann")]);

    store.at("scores").at("cat").set(20).unwrap();
    store.at("scores").at("bob").set(40).unwrap();
    rt.flush().unwrap();
    assert_eq!(
        visible_keys(&list),
        vec![Key::from("cat"), Key::from("ann"), Key::from("bob")]
    );
}

/// A failing sort key hides that item without disturbing its siblings.
#[test]
fn sort_key_failure_filters_one_item() {
    let rt = Runtime::new();
    let store = rt
        .store(json!({ "rows": { "a": 1, "b": "oops", "c": 2 } }))
        .unwrap();
    let rendered: Log<(Key, Scope)> = log();
    let seen = rendered.clone();
    let list = rt
        .on_each_sorted(
            &store.at("rows"),
            |cx, item| Ok(item.get_number(cx)?.map(SortKey::from)),
            move |cx, item| {
                seen.borrow_mut().push((item.key().clone(), cx.clone()));
                Ok(())
            },
        )
        .unwrap()
        .unwrap();

    assert_eq!(visible_keys(&list), vec![Key::from("a"), Key::from("c")]);
    let rendered = rendered.borrow();
    assert_eq!(rendered.len(), 3);
    for (key, scope) in rendered.iter() {
        assert_eq!(scope.has_failed(), *key == Key::from("b"));
    }
}

struct Recorder(Log<String>);

impl Attach for Recorder {
    fn inserted(&self, _list: &Scope, item: &Scope, after: Option<&Scope>) {
        let name = |s: &Scope| s.key().map(|k| k.label()).unwrap_or_default();
        let after = after.map(name).unwrap_or_else(|| "-".into());
        self.0.borrow_mut().push(format!("+{} after {}", name(item), after));
    }

    fn removed(&self, _list: &Scope, item: &Scope) {
        let name = item.key().map(|k| k.label()).unwrap_or_default();
        self.0.borrow_mut().push(format!("-{name}"));
    }
}

/// The attach hook hears about every insertion, move and removal.
#[test]
fn attach_hook_tracks_visible_order() {
    let rt = Runtime::new();
    let events: Log<String> = log();
    rt.set_attach(Recorder(events.clone()));

    let store = rt
        .store(json!({ "items": { "x": 3, "y": 1, "z": 2 } }))
        .unwrap();
    let list = rt
        .on_each_sorted(
            &store.at("items"),
            |cx, item| Ok(item.get_number(cx)?.map(SortKey::from)),
            |_, _| Ok(()),
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        *events.borrow(),
        vec!["+x after -", "+y after -", "+z after y"]
    );

    events.borrow_mut().clear();
    store.at("items").at("x").set(0).unwrap();
    store.at("items").at("y").delete().unwrap();
    rt.flush().unwrap();
    assert_eq!(*events.borrow(), vec!["-y", "-x", "+x after -"]);

    let visible = list.visible_children();
    assert_eq!(visible_keys(&list), vec![Key::from("x"), Key::from("z")]);
    assert_eq!(visible[1].preceding_sibling(), Some(visible[0].clone()));
    assert_eq!(visible[0].preceding_sibling(), None);

    events.borrow_mut().clear();
    list.unmount();
    assert_eq!(events.borrow().len(), 2);
}

/// A list created inside a scope follows the target being replaced.
#[test]
fn nested_list_rebuilds_on_replacement() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "items": [1, 2] })).unwrap();
    let counts: Log<usize> = log();

    let (items, seen) = (store.at("items"), counts.clone());
    rt.observe(move |cx| {
        if let Some(list) = cx.on_each(&items, |_, _| Ok(()))? {
            seen.borrow_mut().push(list.visible_children().len());
        }
        Ok(())
    });
    store.at("items").set(json!({ "a": 1, "b": 2, "c": 3 })).unwrap();
    rt.flush().unwrap();
    assert_eq!(*counts.borrow(), vec![2, 3]);
}

/// Values pushed to a sequence appear as list items.
#[test]
fn pushed_items_join_list() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "todo": [] })).unwrap();
    let titles: Log<String> = log();
    let seen = titles.clone();
    let list = rt
        .on_each(&store.at("todo"), move |cx, item| {
            if let Some(title) = item.get_str(cx)? {
                seen.borrow_mut().push(title.to_string());
            }
            Ok(())
        })
        .unwrap()
        .unwrap();

    assert_eq!(store.at("todo").push("write").unwrap(), 0);
    assert_eq!(store.at("todo").push("test").unwrap(), 1);
    rt.flush().unwrap();
    assert_eq!(*titles.borrow(), vec!["write", "test"]);
    assert_eq!(
        visible_keys(&list),
        vec![Key::Index(0), Key::Index(1)]
    );

    store.at("todo").index(0).set("rewrite").unwrap();
    rt.flush().unwrap();
    assert_eq!(titles.borrow().last().map(String::as_str), Some("rewrite"));
}

/// Settling the same prediction twice changes nothing the second time.
#[test]
fn apply_canon_is_idempotent() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "n": 1 })).unwrap();
    let values: Log<f64> = log();
    let (n, seen) = (store.at("n"), values.clone());
    rt.observe(move |cx| {
        seen.borrow_mut().extend(n.get_number(cx)?);
        Ok(())
    });

    let prediction = rt.apply_prediction(|| store.at("n").set(2)).unwrap();
    rt.flush().unwrap();
    rt.apply_canon(None, &[prediction.clone()]).unwrap();
    rt.flush().unwrap();
    assert_eq!(*values.borrow(), vec![1.0, 2.0, 1.0]);

    rt.apply_canon(None, &[prediction]).unwrap();
    assert_eq!(rt.pending_count(), 0);
    rt.flush().unwrap();
    assert_eq!(*values.borrow(), vec![1.0, 2.0, 1.0]);
    assert_eq!(rt.outstanding_predictions(), 0);
}

/// Observers never see the canonical state without the predictions on top.
#[test]
fn apply_canon_emits_a_single_transition() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "n": 1, "m": 0 })).unwrap();
    let values: Log<(f64, f64)> = log();
    let (n, m, seen) = (store.at("n"), store.at("m"), values.clone());
    rt.immediate(move |cx| {
        let n = n.get_number(cx)?.unwrap_or_default();
        let m = m.get_number(cx)?.unwrap_or_default();
        seen.borrow_mut().push((n, m));
        Ok(())
    });

    let confirmed = rt.apply_prediction(|| store.at("n").set(2)).unwrap();
    rt.apply_prediction(|| store.at("m").set(7)).unwrap();
    assert_eq!(values.borrow().last(), Some(&(2.0, 7.0)));
    values.borrow_mut().clear();

    let s = store.clone();
    rt.apply_canon(Some(Box::new(move || s.at("n").set(3))), &[confirmed])
        .unwrap();
    assert_eq!(*values.borrow(), vec![(3.0, 7.0)]);
    assert_eq!(rt.outstanding_predictions(), 1);

    values.borrow_mut().clear();
    let s = store.clone();
    rt.apply_canon(Some(Box::new(move || s.at("m").set(7))), &[])
        .unwrap();
    assert!(values.borrow().is_empty());
}

/// Containers assigned in two places are shared, and cycles are refused.
#[test]
fn aliasing_shares_and_cycles_fail() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "a": { "v": 1 } })).unwrap();
    let shared = store.at("a").peek_container().unwrap().unwrap();
    store.at("b").set(shared.clone()).unwrap();

    store.path(["b", "v"]).set(2).unwrap();
    assert_eq!(store.path(["a", "v"]).to_json().unwrap(), json!(2));

    assert!(matches!(
        store.path(["a", "me"]).set(shared.clone()),
        Err(Error::Cycle { .. })
    ));
    let root = store.peek_container().unwrap().unwrap();
    assert!(matches!(
        store.path(["a", "up"]).set(root),
        Err(Error::Cycle { .. })
    ));
    assert_eq!(store.path(["a", "me"]).peek().unwrap(), None);
}

/// Replacing a collection in place only wakes readers of changed keys.
#[test]
fn replace_updates_in_place() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "cfg": { "x": 1, "y": 1, "z": 1 } })).unwrap();
    let before = store.at("cfg").peek_container().unwrap().unwrap();
    let runs: Log<&str> = log();

    for key in ["x", "y", "z"] {
        let (slot, seen) = (store.at("cfg").at(key), runs.clone());
        rt.observe(move |cx| {
            slot.get(cx)?;
            seen.borrow_mut().push(key);
            Ok(())
        });
    }
    runs.borrow_mut().clear();

    store.at("cfg").set(json!({ "x": 1, "y": 2 })).unwrap();
    rt.flush().unwrap();
    // Stale keys are deleted before new values are written.
    assert_eq!(*runs.borrow(), vec!["z", "y"]);
    assert!(store.at("cfg").peek_container().unwrap().unwrap().ptr_eq(&before));
    assert_eq!(store.at("cfg").to_json().unwrap(), json!({ "x": 1, "y": 2 }));
}

/// Writes made inside a `LocalSet` flush without an explicit call.
#[tokio::test]
async fn local_set_flushes_automatically() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let rt = Runtime::with_local_flushes();
            let store = rt.store(json!({ "n": 0 })).unwrap();
            let values: Log<f64> = log();
            let (n, seen) = (store.at("n"), values.clone());
            rt.observe(move |cx| {
                seen.borrow_mut().extend(n.get_number(cx)?);
                Ok(())
            });

            store.at("n").set(1).unwrap();
            store.at("n").set(2).unwrap();
            assert_eq!(*values.borrow(), vec![0.0]);

            for _ in 0..100 {
                if values.borrow().len() > 1 {
                    break;
                }
                tokio::task::yield_now().await;
            }
            assert_eq!(*values.borrow(), vec![0.0, 2.0]);
            assert_eq!(rt.pending_count(), 0);
        })
        .await;
}

/// Failures from callbacks, the scheduler and the immediate loop reach the
/// installed handler.
#[test]
fn error_handler_receives_failures() {
    static SEEN: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let previous = set_error_handler(Some(Arc::new(|error: &Error| {
        if let Ok(mut seen) = SEEN.lock() {
            seen.push(error.to_string());
        }
    })));

    let rt = Runtime::with_config(Config {
        recursion_limit: 17,
        ..Config::default()
    });
    let failing = rt.observe(|_| Err(Error::callback("render failed 7f3a")));
    assert!(failing.has_failed());

    let store = rt.store(json!({ "n": 0 })).unwrap();
    let n = store.at("n");
    rt.observe(move |cx| {
        let v = n.get_number(cx)?.unwrap_or(0.0);
        n.set(v + 1.0)
    });
    assert!(rt.flush().is_err());

    let rt = Runtime::with_config(Config {
        immediate_limit: 13,
        ..Config::default()
    });
    let store = rt.store(json!({ "n": 0 })).unwrap();
    let n = store.at("n");
    rt.immediate(move |cx| {
        let v = n.get_number(cx)?.unwrap_or(0.0);
        n.set(v + 1.0)
    });
    store.at("n").set(100).unwrap();
    assert_eq!(store.at("n").to_json().unwrap(), json!(113));

    set_error_handler(previous);
    let seen = SEEN.lock().unwrap();
    assert!(seen.iter().any(|m| m == "render failed 7f3a"));
    assert!(seen.iter().any(|m| m.contains("(17 passes)")));
    // Once at construction, once for the write.
    assert_eq!(seen.iter().filter(|m| m.contains("(13 passes)")).count(), 2);
}

#[test]
fn sort_key_codec_orders_mixed_values() {
    let ordered = [
        SortKey::from(-5),
        SortKey::from(3),
        SortKey::from("ab"),
        SortKey::from(vec!["ab", "c"]),
        SortKey::from(vec!["ab", "d"]),
    ];
    let encoded: Vec<String> = ordered.iter().map(encode).collect();
    for pair in encoded.windows(2) {
        assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
    }
}

#[test]
fn fractional_keys_interleave() {
    let first = key_between(None, None).unwrap();
    let last = key_between(Some(&first), None).unwrap();
    let middle = key_between(Some(&first), Some(&last)).unwrap();
    assert!(first < middle && middle < last);
    assert!(matches!(
        key_between(Some(&last), Some(&first)),
        Err(Error::KeyOrder { .. })
    ));
}

#[test]
fn peek_does_not_subscribe() {
    let rt = Runtime::new();
    let store = rt.store(json!({ "n": 0 })).unwrap();
    let runs: Log<()> = log();
    let (n, seen) = (store.at("n"), runs.clone());
    rt.observe(move |_| {
        n.peek()?;
        seen.borrow_mut().push(());
        Ok(())
    });
    store.at("n").set(1).unwrap();
    rt.flush().unwrap();
    assert_eq!(runs.borrow().len(), 1);
}
