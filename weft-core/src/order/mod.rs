//! Order Maintenance
//!
//! Primitives for keeping things in a stable, externally visible order:
//!
//! - [`sort_key`]: turns numbers, strings and lists into strings that compare
//!   the way their inputs do. The keyed-list reconciler sorts by these.
//! - [`SkipList`]: a sorted set keyed on a field of each item.
//! - [`key_between`]: fractional string keys for placing an item between two
//!   neighbours.

pub mod sort_key;
mod skip_list;
mod fractional;

pub use sort_key::{encode, SortKey};
pub use skip_list::{Iter, SkipList, MAX_LEVEL};
pub use fractional::key_between;
