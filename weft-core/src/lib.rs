//! Weft Core
//!
//! This crate provides a fine-grained reactive computation engine:
//!
//! - An observable, tree-shaped store that tracks readers per key
//! - Reactive scopes that rerun only when something they read changes
//! - A depth-ordered batch scheduler with a recursion ceiling
//! - Keyed lists that keep one scope per element in sort order
//! - Order-maintenance primitives (sort-key codec, skip list, fractional keys)
//! - Optimistic predictions rebased onto canonical updates
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: values, containers and store handles
//! - `reactive`: the runtime, scopes, scheduling and keyed lists
//! - `order`: the sort-key codec, skip list and fractional keys
//! - `predict`: patches and prediction rebasing
//! - `error` / `config`: the error type, the global error handler and tunables
//!
//! # Example
//!
//! ```rust
//! use weft_core::{Runtime, Result};
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let rt = Runtime::new();
//! let store = rt.store(json!({ "count": 0 }))?;
//!
//! let count = store.at("count");
//! rt.observe(move |cx| {
//!     println!("count is {:?}", count.get_number(cx)?);
//!     Ok(())
//! });
//!
//! store.at("count").set(5)?;
//! rt.flush()?; // prints "count is Some(5.0)"
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod order;
pub mod predict;
pub mod reactive;
pub mod store;

pub use config::Config;
pub use error::{report_error, set_error_handler, Error, ErrorHandler, Result};
pub use order::{encode, key_between, SkipList, SortKey};
pub use predict::{Canon, Patch, PatchEntry, PatchId};
pub use reactive::{Attach, Runtime, Scope};
pub use store::{Container, ContainerKind, Func, Key, Store, Value};
