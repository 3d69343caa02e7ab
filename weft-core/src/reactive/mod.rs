//! Reactive Scopes and Scheduling
//!
//! This module implements the computation side of the engine: scopes that
//! rerun when what they read changes, the scheduler that orders those reruns,
//! and keyed lists that keep one scope per element of a container.
//!
//! # Concepts
//!
//! ## Scopes
//!
//! A [`Scope`] runs a callback and remembers every store slot the callback
//! read through it. The scope is passed to the callback explicitly; there is
//! no ambient "current scope". Nested scopes are children: they are destroyed
//! whenever the parent reruns.
//!
//! ## Scheduling
//!
//! Changes do not rerun scopes directly. Invalidated scopes are queued and
//! rerun together by [`Runtime::flush`], shallowest first. Immediate scopes are
//! the exception: they rerun before the write that invalidated them returns.
//!
//! ## Keyed Lists
//!
//! [`Scope::on_each`] creates one item scope per key of a container and keeps
//! the visible items ordered by a sort key, creating and destroying items as
//! keys come and go.

mod attach;
mod list;
mod runtime;
mod scheduler;
mod scope;
mod subscriber;

pub use attach::Attach;
pub use runtime::Runtime;
pub use scope::Scope;
pub use subscriber::{Change, Observer, ObserverId};
