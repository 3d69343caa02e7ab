//! Update Scheduler
//!
//! The scheduler decides when and in which order invalidated scopes rerun. It
//! guarantees that a parent reruns before its children within a flush, so a
//! child about to be destroyed by its parent's rerun never runs for nothing.
//!
//! # Algorithm
//!
//! Scopes are queued in arrival order. The queue remembers whether it is still
//! sorted by depth: appending a scope shallower than the last one clears the
//! flag. A flush then works in passes:
//!
//! 1. Drop the scopes already run. If the queue is unsorted, stable-sort the
//!    rest by depth (arrival order is kept among equal depths).
//! 2. Run the scopes present at the start of the pass, in order. Scopes
//!    queued meanwhile wait for the next pass; if one of them breaks the
//!    order, the current pass stops early so the next one can re-sort.
//! 3. Count the pass. More passes than `Config::recursion_limit` means the
//!    scopes keep invalidating each other: the flush fails with
//!    [`Error::RecursionLimit`] and the queue is discarded.
//!
//! Immediate scopes bypass the queue. They rerun inside the write that
//! invalidated them, in their own loop bounded by `Config::immediate_limit`.

use super::runtime::Runtime;
use super::scope::Scope;
use crate::error::{report_error, Error, Result};

#[derive(Default)]
pub(crate) struct Queue {
    pending: Vec<Scope>,
    unsorted: bool,
    flushing: bool,
    /// The flush hook was called and no flush has run since.
    scheduled: bool,
}

#[derive(Default)]
pub(crate) struct ImmediateQueue {
    pending: Vec<Scope>,
    running: bool,
}

impl Runtime {
    /// Queue `scope` to rerun on the next flush.
    pub(crate) fn enqueue(&self, scope: Scope) {
        if scope.node.queued.replace(true) {
            return;
        }
        let wake = {
            let mut queue = self.inner.queue.borrow_mut();
            if queue
                .pending
                .last()
                .is_some_and(|last| scope.depth() < last.depth())
            {
                queue.unsorted = true;
            }
            tracing::trace!(depth = scope.depth(), pending = queue.pending.len() + 1, "enqueue");
            queue.pending.push(scope);
            let idle = !queue.flushing && !queue.scheduled;
            if idle {
                queue.scheduled = true;
            }
            idle
        };
        if wake {
            let hook = self.inner.flush_hook.borrow().clone();
            if let Some(hook) = hook {
                hook(self);
            }
        }
    }

    /// Number of scopes waiting for a flush.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.borrow().pending.len()
    }

    /// Rerun every queued scope, including those queued along the way.
    ///
    /// Returns immediately when called from inside a flush; the outer flush
    /// picks up whatever was queued. Errors from scope callbacks are reported
    /// to the error handler, not returned. The only error returned is
    /// [`Error::RecursionLimit`], which is also reported.
    pub fn flush(&self) -> Result<()> {
        {
            let mut queue = self.inner.queue.borrow_mut();
            if queue.flushing {
                return Ok(());
            }
            queue.flushing = true;
        }

        let limit = self.inner.config.recursion_limit;
        let mut index = 0;
        let mut passes = 0;
        let mut outcome = Ok(());
        loop {
            let batch = {
                let mut queue = self.inner.queue.borrow_mut();
                queue.pending.drain(..index);
                index = 0;
                if queue.pending.is_empty() {
                    break;
                }
                if queue.unsorted {
                    queue.pending.sort_by_key(Scope::depth);
                    queue.unsorted = false;
                }
                queue.pending.len()
            };

            passes += 1;
            if passes > limit {
                outcome = Err(Error::RecursionLimit { limit });
                break;
            }
            tracing::debug!(pass = passes, scopes = batch, "flush pass");

            while index < batch {
                let scope = {
                    let queue = self.inner.queue.borrow();
                    if queue.unsorted {
                        break;
                    }
                    queue.pending[index].clone()
                };
                index += 1;
                scope.node.queued.set(false);
                scope.rerun();
            }
        }

        {
            let mut queue = self.inner.queue.borrow_mut();
            for scope in queue.pending.drain(..) {
                scope.node.queued.set(false);
            }
            queue.unsorted = false;
            queue.flushing = false;
            queue.scheduled = false;
        }
        if let Err(error) = &outcome {
            report_error(error);
        }
        outcome
    }

    /// Rerun an immediate scope now, or as soon as the running immediate loop
    /// gets to it.
    pub(crate) fn run_immediate(&self, scope: Scope) {
        let drain = {
            let mut immediate = self.inner.immediate.borrow_mut();
            if !scope.node.queued.replace(true) {
                immediate.pending.push(scope);
            }
            !immediate.running
        };
        if drain {
            self.drain_immediate();
        }
    }

    /// Run `f` with the immediate loop held, then settle anything it
    /// triggered.
    pub(crate) fn settle_immediate(&self, f: impl FnOnce()) {
        let outer = std::mem::replace(&mut self.inner.immediate.borrow_mut().running, true);
        f();
        if !outer {
            self.drain_immediate();
        }
    }

    fn drain_immediate(&self) {
        self.inner.immediate.borrow_mut().running = true;
        let limit = self.inner.config.immediate_limit;
        let mut passes = 0;
        loop {
            let batch = std::mem::take(&mut self.inner.immediate.borrow_mut().pending);
            if batch.is_empty() {
                break;
            }
            passes += 1;
            if passes > limit {
                for scope in batch {
                    scope.node.queued.set(false);
                }
                let rest = std::mem::take(&mut self.inner.immediate.borrow_mut().pending);
                for scope in rest {
                    scope.node.queued.set(false);
                }
                report_error(&Error::RecursionLimit { limit });
                break;
            }
            for scope in batch {
                scope.node.queued.set(false);
                scope.rerun();
            }
        }
        self.inner.immediate.borrow_mut().running = false;
    }
}
