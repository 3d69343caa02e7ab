//! Observer types for the reactive system.
//!
//! An Observer is anything registered with a container to hear about point
//! changes. In practice that is a [`Scope`](super::Scope), but containers only
//! see this trait.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::{Container, Key, Value};

/// Unique identifier for an observer.
///
/// Containers use it to deduplicate subscriptions and to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// One point change: `container[key]` went from `old` to `new`.
#[derive(Debug, Clone)]
pub struct Change {
    pub container: Container,
    pub key: Key,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

impl Change {
    /// The key went from absent to present.
    pub fn appeared(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    /// The key went from present to absent.
    pub fn disappeared(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }
}

/// Something that reacts to point changes in a container.
pub trait Observer {
    /// Identity used for subscription bookkeeping.
    fn observer_id(&self) -> ObserverId;

    /// Called synchronously for every change to a key this observer watches.
    fn on_change(self: Rc<Self>, change: &Change);
}
