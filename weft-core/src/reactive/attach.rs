//! Attachment hook.
//!
//! The engine does not know where list items end up. A host that mirrors
//! keyed lists into some ordered output (a widget tree, a document, a log)
//! installs an [`Attach`] implementation with
//! [`Runtime::set_attach`](super::Runtime::set_attach) and receives every
//! change to a list's visible order.

use super::scope::Scope;

/// Receiver for keyed-list visibility changes.
pub trait Attach {
    /// `item` became visible in `list`, directly after `after` (or first).
    fn inserted(&self, list: &Scope, item: &Scope, after: Option<&Scope>);

    /// `item` left the visible order of `list`.
    fn removed(&self, list: &Scope, item: &Scope);
}
