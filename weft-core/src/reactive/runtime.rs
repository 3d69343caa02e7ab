//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects the store, the scopes
//! and the scheduler. It owns the pending-scope queue, the immediate loop, the
//! prediction state and the hooks the host installs.
//!
//! # How It Works
//!
//! 1. A write to the store reaches [`Runtime::emit`] with the point change.
//!
//! 2. Unless a patch is being recorded, the runtime hands the change to every
//!    observer of that key and of the container's wildcard key.
//!
//! 3. Each observing scope enqueues itself. The first enqueue on an idle
//!    runtime calls the flush hook, which is expected to arrange a
//!    [`flush`](Runtime::flush) soon (see [`Runtime::spawn_local_flushes`]).
//!
//! 4. The flush reruns queued scopes in depth order.
//!
//! # Threading
//!
//! A runtime is single-threaded: handles are `Rc`-based and `!Send`. Create
//! one runtime per thread that needs reactivity.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::attach::Attach;
use super::scheduler::{ImmediateQueue, Queue};
use super::scope::{Scope, ScopeKind};
use super::subscriber::Change;
use super::list::{self, ListState};
use crate::config::Config;
use crate::error::Result;
use crate::order::SortKey;
use crate::predict::Patch;
use crate::store::{Container, Key, Store, Value};

type FlushHook = Rc<dyn Fn(&Runtime)>;

pub(crate) struct RuntimeInner {
    pub(crate) config: Config,
    pub(crate) queue: RefCell<Queue>,
    pub(crate) immediate: RefCell<ImmediateQueue>,
    /// Patch receiving changes instead of observers, while recording.
    pub(crate) recorder: RefCell<Option<Patch>>,
    /// Outstanding predictions, oldest first.
    pub(crate) predictions: RefCell<Vec<Patch>>,
    pub(crate) flush_hook: RefCell<Option<FlushHook>>,
    attach: RefCell<Option<Rc<dyn Attach>>>,
}

/// Handle to a reactive runtime.
///
/// Cloning creates another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    ///
    /// No flush hook is installed: queued scopes wait for an explicit
    /// [`flush`](Self::flush). Inside a tokio `LocalSet`, use
    /// [`with_local_flushes`](Self::with_local_flushes) to flush
    /// automatically.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a runtime that flushes on the current tokio `LocalSet` as soon
    /// as work is queued. See [`spawn_local_flushes`](Self::spawn_local_flushes).
    pub fn with_local_flushes() -> Self {
        let rt = Self::new();
        rt.spawn_local_flushes();
        rt
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                queue: RefCell::new(Queue::default()),
                immediate: RefCell::new(ImmediateQueue::default()),
                recorder: RefCell::new(None),
                predictions: RefCell::new(Vec::new()),
                flush_hook: RefCell::new(None),
                attach: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Create a store holding `value`.
    ///
    /// Plain collections are copied into fresh containers; a
    /// [`Value::Container`] is adopted as is.
    pub fn store(&self, value: impl Into<Value>) -> Result<Store> {
        Store::root(self, value.into())
    }

    fn root(&self, kind: ScopeKind) -> Scope {
        let scope = Scope::new(&Rc::downgrade(&self.inner), None, kind);
        scope.start();
        scope
    }

    /// Create a top-level scope running `f` now and whenever something it
    /// read changes.
    pub fn observe<F>(&self, f: F) -> Scope
    where
        F: Fn(&Scope) -> Result<()> + 'static,
    {
        self.root(ScopeKind::Plain(Rc::new(f)))
    }

    /// Create a top-level scope that reruns synchronously inside the write
    /// that invalidated it.
    pub fn immediate<F>(&self, f: F) -> Scope
    where
        F: Fn(&Scope) -> Result<()> + 'static,
    {
        self.root(ScopeKind::Immediate(Rc::new(f)))
    }

    /// Top-level keyed list over the container at `target`, ordered by key.
    ///
    /// Returns `None` if `target` does not hold a container. Unlike
    /// [`Scope::on_each`], the list does not follow `target` being replaced.
    pub fn on_each<R>(&self, target: &Store, render: R) -> Result<Option<Scope>>
    where
        R: Fn(&Scope, Store) -> Result<()> + 'static,
    {
        self.on_each_sorted(target, list::default_sort_key, render)
    }

    pub fn on_each_sorted<S, R>(&self, target: &Store, sort_key: S, render: R) -> Result<Option<Scope>>
    where
        S: Fn(&Scope, &Store) -> Result<Option<SortKey>> + 'static,
        R: Fn(&Scope, Store) -> Result<()> + 'static,
    {
        let Some(container) = target.peek_container()? else {
            return Ok(None);
        };
        let state = ListState::new(container, Rc::new(sort_key), Rc::new(render));
        Ok(Some(self.root(ScopeKind::List(state))))
    }

    /// Install the callback run when the first scope is queued on an idle
    /// runtime. It should arrange for [`flush`](Self::flush) to run soon.
    pub fn set_flush_hook<F>(&self, hook: F)
    where
        F: Fn(&Runtime) + 'static,
    {
        *self.inner.flush_hook.borrow_mut() = Some(Rc::new(hook));
    }

    pub fn clear_flush_hook(&self) {
        self.inner.flush_hook.borrow_mut().take();
    }

    /// Flush on the current `tokio` `LocalSet` whenever work is queued.
    ///
    /// The hook calls `tokio::task::spawn_local`, so writes that queue work
    /// must happen inside a `LocalSet`.
    pub fn spawn_local_flushes(&self) {
        self.set_flush_hook(|rt| {
            let rt = rt.clone();
            tokio::task::spawn_local(async move {
                // Failures were already reported to the error handler.
                let _ = rt.flush();
            });
        });
    }

    /// Install the hook told about keyed-list insertions and removals.
    pub fn set_attach(&self, attach: impl Attach + 'static) {
        *self.inner.attach.borrow_mut() = Some(Rc::new(attach));
    }

    pub(crate) fn attach(&self) -> Option<Rc<dyn Attach>> {
        self.inner.attach.borrow().clone()
    }

    /// Publish a change that was just applied to `container[key]`.
    pub(crate) fn emit(&self, container: &Container, key: &Key, new: Option<Value>, old: Option<Value>) {
        {
            let mut recorder = self.inner.recorder.borrow_mut();
            if let Some(patch) = recorder.as_mut() {
                patch.record(container, key, new, old);
                return;
            }
        }
        self.notify(&Change {
            container: container.clone(),
            key: key.clone(),
            new,
            old,
        });
    }

    /// Hand a change to its observers, key observers first.
    pub(crate) fn notify(&self, change: &Change) {
        for observer in change.container.observers_for(&change.key) {
            observer.on_change(change);
        }
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .field("predictions", &self.inner.predictions.borrow().len())
            .finish()
    }
}
