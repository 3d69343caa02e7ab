//! Observable Store
//!
//! The store is a tree of [`Container`]s holding [`Value`]s. Scopes read it
//! through [`Store`] handles and are subscribed to exactly the (container, key)
//! pairs they touched; writes emit one point change per slot that actually
//! changed.
//!
//! Two handles may alias the same container. Assigning a container that would
//! make some container reachable from itself is rejected.

mod container;
mod handle;
mod value;
mod write;

pub use container::{Container, ContainerId, ContainerKind, MAX_SEQUENCE_GAP};
pub use handle::Store;
pub use value::{same_value, Func, Key, Value};
