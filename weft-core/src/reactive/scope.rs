//! Reactive Scope Implementation
//!
//! A Scope is a unit of re-computation. It owns a callback, the subscriptions
//! that callback made while it last ran, and a list of cleanup actions.
//!
//! # How Scopes Work
//!
//! 1. When created, the scope runs its callback immediately, passing itself as
//!    the context. Reads made with that context subscribe the scope to the
//!    (container, key) pairs they touched.
//!
//! 2. When one of those pairs changes, the scope is queued on the scheduler
//!    (or, for immediate scopes, rerun before the write returns).
//!
//! 3. Before rerunning, the scope tears down: child scopes are destroyed,
//!    user cleanups fire, and every subscription is dropped. The callback then
//!    runs from scratch and subscribes afresh.
//!
//! # Nesting
//!
//! Scopes form a tree. A child created inside a callback gets depth
//! `parent + 1` and is destroyed when the parent reruns or is unmounted, so
//! the scheduler can always run parents before children.
//!
//! # Lifecycle
//!
//! `Constructing -> Live -> (Running -> Live)* -> Dead`. A dead scope never
//! runs again; queued reruns for it are silently skipped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::list::{self, ItemState, ListState};
use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::{Change, Observer, ObserverId};
use crate::error::{report_error, Error, Result};
use crate::order::SortKey;
use crate::store::{Container, Key, Store};

pub(crate) type Callback = Rc<dyn Fn(&Scope) -> Result<()>>;

pub(crate) enum ScopeKind {
    Plain(Callback),
    Immediate(Callback),
    List(ListState),
    Item(ItemState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeState {
    Constructing,
    Live,
    Running,
    Dead,
}

pub(crate) enum Cleanup {
    Child(Scope),
    Unsubscribe {
        container: Container,
        key: Option<Key>,
    },
    User(Box<dyn FnOnce()>),
}

pub(crate) struct ScopeNode {
    id: ObserverId,
    rt: Weak<RuntimeInner>,
    parent: Option<Weak<ScopeNode>>,
    depth: usize,
    pub(crate) kind: ScopeKind,
    state: Cell<ScopeState>,
    /// Set while the scope sits in a scheduler or immediate queue.
    pub(crate) queued: Cell<bool>,
    failed: Cell<bool>,
    cleanups: RefCell<Vec<Cleanup>>,
}

/// A handle to a reactive scope.
///
/// Cloning creates another handle to the same scope. A scope stays subscribed
/// until it is unmounted or its parent reruns; dropping handles does not
/// stop it.
#[derive(Clone)]
pub struct Scope {
    pub(crate) node: Rc<ScopeNode>,
}

impl Scope {
    pub(crate) fn new(rt: &Weak<RuntimeInner>, parent: Option<&Scope>, kind: ScopeKind) -> Scope {
        Scope {
            node: Rc::new(ScopeNode {
                id: ObserverId::new(),
                rt: rt.clone(),
                parent: parent.map(|p| Rc::downgrade(&p.node)),
                depth: parent.map_or(0, |p| p.node.depth + 1),
                kind,
                state: Cell::new(ScopeState::Constructing),
                queued: Cell::new(false),
                failed: Cell::new(false),
                cleanups: RefCell::new(Vec::new()),
            }),
        }
    }

    /// First run.
    pub(crate) fn start(&self) {
        match &self.node.kind {
            ScopeKind::Plain(callback) => self.run_callback(callback),
            ScopeKind::Immediate(callback) => match self.runtime() {
                Some(rt) => rt.settle_immediate(|| self.run_callback(callback)),
                None => self.run_callback(callback),
            },
            ScopeKind::List(state) => state.activate(self),
            ScopeKind::Item(_) => list::run_item(self),
        }
        if self.node.state.get() == ScopeState::Constructing {
            self.node.state.set(ScopeState::Live);
        }
    }

    /// Rerun after a dependency changed. No-op once dead.
    pub(crate) fn rerun(&self) {
        if self.is_dead() {
            return;
        }
        match &self.node.kind {
            ScopeKind::Plain(callback) | ScopeKind::Immediate(callback) => {
                self.teardown();
                self.run_callback(callback);
            }
            ScopeKind::List(state) => state.apply_changes(self),
            ScopeKind::Item(_) => {
                self.teardown();
                list::run_item(self);
            }
        }
    }

    fn run_callback(&self, callback: &Callback) {
        self.node.failed.set(false);
        let result = self.running(|| callback(self));
        if let Err(error) = result {
            self.fail(&error);
        }
    }

    /// Run `f` with the scope marked as running.
    pub(crate) fn running<R>(&self, f: impl FnOnce() -> R) -> R {
        self.node.state.set(ScopeState::Running);
        let result = f();
        if self.node.state.get() == ScopeState::Running {
            self.node.state.set(ScopeState::Live);
        }
        result
    }

    pub(crate) fn clear_failure(&self) {
        self.node.failed.set(false);
    }

    /// Mark the scope failed and report the error.
    pub(crate) fn fail(&self, error: &Error) {
        self.node.failed.set(true);
        report_error(error);
    }

    pub(crate) fn teardown(&self) {
        let cleanups = std::mem::take(&mut *self.node.cleanups.borrow_mut());
        for cleanup in cleanups {
            match cleanup {
                Cleanup::Child(child) => child.destroy(),
                Cleanup::Unsubscribe { container, key } => {
                    container.unsubscribe(key.as_ref(), self.node.id)
                }
                Cleanup::User(f) => f(),
            }
        }
        if let ScopeKind::List(state) = &self.node.kind {
            state.teardown_items();
        }
    }

    pub(crate) fn destroy(&self) {
        if self.is_dead() {
            return;
        }
        self.node.state.set(ScopeState::Dead);
        self.teardown();
        if let ScopeKind::Item(_) = &self.node.kind {
            list::detach_item(self);
        }
    }

    /// Destroy this scope and everything below it.
    pub fn unmount(&self) {
        self.destroy();
    }

    /// Subscribe this scope to `container[key]`, or to every key when `key`
    /// is `None`.
    pub(crate) fn track(&self, container: &Container, key: Option<&Key>) {
        if self.is_dead() {
            return;
        }
        let observer: Rc<dyn Observer> = self.node.clone();
        if container.subscribe(key, observer) {
            self.node.cleanups.borrow_mut().push(Cleanup::Unsubscribe {
                container: container.clone(),
                key: key.cloned(),
            });
        }
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.node.rt.upgrade().map(|inner| Runtime { inner })
    }

    /// A keyed-list item below this list scope. The list owns it; it is not
    /// started here.
    pub(crate) fn item(&self, state: ItemState) -> Scope {
        Scope::new(&self.node.rt, Some(self), ScopeKind::Item(state))
    }

    /// Create and start a child scope owned by this one.
    pub(crate) fn child(&self, kind: ScopeKind) -> Scope {
        let child = Scope::new(&self.node.rt, Some(self), kind);
        if self.is_dead() {
            child.node.state.set(ScopeState::Dead);
            return child;
        }
        self.node
            .cleanups
            .borrow_mut()
            .push(Cleanup::Child(child.clone()));
        child.start();
        child
    }

    /// Run `f` now and again whenever something it read changes. The new
    /// scope is destroyed when this one reruns.
    pub fn observe<F>(&self, f: F) -> Scope
    where
        F: Fn(&Scope) -> Result<()> + 'static,
    {
        self.child(ScopeKind::Plain(Rc::new(f)))
    }

    /// Like [`observe`](Self::observe), but reruns synchronously inside the
    /// write that invalidated it.
    pub fn immediate<F>(&self, f: F) -> Scope
    where
        F: Fn(&Scope) -> Result<()> + 'static,
    {
        self.child(ScopeKind::Immediate(Rc::new(f)))
    }

    /// Register `f` to run when this scope next tears down.
    pub fn clean<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        if self.is_dead() {
            f();
            return;
        }
        self.node.cleanups.borrow_mut().push(Cleanup::User(Box::new(f)));
    }

    /// Render one child scope per key of the container at `target`, ordered
    /// by key. Returns `None` when `target` holds no container.
    pub fn on_each<R>(&self, target: &Store, render: R) -> Result<Option<Scope>>
    where
        R: Fn(&Scope, Store) -> Result<()> + 'static,
    {
        self.on_each_sorted(target, list::default_sort_key, render)
    }

    /// Like [`on_each`](Self::on_each), ordering items by `sort_key`. Items
    /// whose sort key is `None` are kept but not shown.
    pub fn on_each_sorted<S, R>(&self, target: &Store, sort_key: S, render: R) -> Result<Option<Scope>>
    where
        S: Fn(&Scope, &Store) -> Result<Option<SortKey>> + 'static,
        R: Fn(&Scope, Store) -> Result<()> + 'static,
    {
        let Some(container) = target.container(self)? else {
            return Ok(None);
        };
        let state = ListState::new(container, Rc::new(sort_key), Rc::new(render));
        Ok(Some(self.child(ScopeKind::List(state))))
    }

    pub fn id(&self) -> ObserverId {
        self.node.id
    }

    pub fn depth(&self) -> usize {
        self.node.depth
    }

    pub fn parent(&self) -> Option<Scope> {
        self.node
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|node| Scope { node })
    }

    pub fn is_dead(&self) -> bool {
        self.node.state.get() == ScopeState::Dead
    }

    /// Whether the last run returned an error.
    pub fn has_failed(&self) -> bool {
        self.node.failed.get()
    }

    /// For a list item, the key it renders.
    pub fn key(&self) -> Option<Key> {
        match &self.node.kind {
            ScopeKind::Item(item) => Some(item.key().clone()),
            _ => None,
        }
    }

    /// For a list item, the visible item ordered directly before it.
    pub fn preceding_sibling(&self) -> Option<Scope> {
        list::preceding_sibling(self)
    }

    /// For a list scope, its visible items in order.
    pub fn visible_children(&self) -> Vec<Scope> {
        match &self.node.kind {
            ScopeKind::List(state) => state.visible(),
            _ => Vec::new(),
        }
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.node.id)
            .field("depth", &self.node.depth)
            .field("state", &self.node.state.get())
            .finish()
    }
}

impl Observer for ScopeNode {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn on_change(self: Rc<Self>, change: &Change) {
        let scope = Scope { node: self };
        if scope.is_dead() {
            return;
        }
        let Some(rt) = scope.runtime() else {
            return;
        };
        match &scope.node.kind {
            ScopeKind::Immediate(_) => rt.run_immediate(scope),
            ScopeKind::List(state) => {
                if state.note_change(change) {
                    rt.enqueue(scope);
                }
            }
            ScopeKind::Plain(_) | ScopeKind::Item(_) => rt.enqueue(scope),
        }
    }
}
