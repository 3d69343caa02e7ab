//! Predictions
//!
//! Optimistic updates layered over canonical state. A prediction is a block
//! of writes applied (and shown) right away, remembered as a [`Patch`] until
//! the authoritative result arrives.
//!
//! # How It Works
//!
//! 1. [`Runtime::record_patch`] diverts every change emitted while its
//!    closure runs into a patch. The writes land in the store, but no
//!    observer hears about them.
//!
//! 2. [`Runtime::apply_prediction`] records a block, then emits it and keeps
//!    the patch in the outstanding list.
//!
//! 3. [`Runtime::apply_canon`] rebases: it silently rolls every outstanding
//!    prediction back, drops the ones the canonical update settles, applies
//!    the canonical writes, replays the remaining predictions on top, and only
//!    then emits the combined net change. Observers see one transition per
//!    slot, never the intermediate canonical-only state.

mod patch;

pub use patch::{Patch, PatchEntry, PatchId};

use crate::error::{Error, Result};
use crate::reactive::Runtime;
use crate::store::{same_value, Value};

/// A canonical update passed to [`Runtime::apply_canon`].
pub type Canon<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "absent".to_owned(), |v| v.to_json().to_string())
}

impl Runtime {
    /// Run `f`, capturing its changes in a patch instead of emitting them.
    ///
    /// When `f` fails, its partial changes are undone and the error returned.
    /// Inside another recording, the patch is also folded into the outer one.
    pub fn record_patch<F>(&self, f: F) -> Result<Patch>
    where
        F: FnOnce() -> Result<()>,
    {
        let outer = self.inner.recorder.replace(Some(Patch::new()));
        let result = f();
        let patch = self.inner.recorder.replace(outer).unwrap_or_default();
        if let Err(error) = result {
            if let Err(revert) = patch.inverse().apply_silently() {
                tracing::error!(%revert, "failed to undo a partial patch");
            }
            return Err(error);
        }
        if let Some(outer) = self.inner.recorder.borrow_mut().as_mut() {
            outer.merge(&patch);
        }
        Ok(patch)
    }

    /// Apply `f` as a prediction: emit its changes now and keep the patch
    /// until [`apply_canon`](Self::apply_canon) settles it.
    pub fn apply_prediction<F>(&self, f: F) -> Result<Patch>
    where
        F: FnOnce() -> Result<()>,
    {
        let patch = self.record_patch(f)?;
        self.inner.predictions.borrow_mut().push(patch.clone());
        self.emit_patch(&patch);
        Ok(patch)
    }

    /// Apply a canonical update beneath the outstanding predictions.
    ///
    /// Predictions listed in `drop` are discarded. Remaining predictions are
    /// replayed unless a slot they touched no longer holds the value they
    /// started from, in which case they are discarded with a warning.
    ///
    /// Fails with [`Error::RollbackMismatch`] if a predicted slot was changed
    /// behind the predictions' back. On any failure the store and the
    /// outstanding list are left as they were.
    pub fn apply_canon(&self, canon: Option<Canon<'_>>, drop: &[Patch]) -> Result<()> {
        let outstanding = std::mem::take(&mut *self.inner.predictions.borrow_mut());
        let mut net = Patch::new();

        match self.rebase(canon, drop, &outstanding, &mut net) {
            Ok(kept) => {
                self.restore_predictions(kept);
                self.emit_patch(&net);
                Ok(())
            }
            Err(error) => {
                if let Err(revert) = net.inverse().apply_silently() {
                    tracing::error!(%revert, "failed to undo an aborted rebase");
                }
                self.restore_predictions(outstanding);
                Err(error)
            }
        }
    }

    fn rebase(
        &self,
        canon: Option<Canon<'_>>,
        drop: &[Patch],
        outstanding: &[Patch],
        net: &mut Patch,
    ) -> Result<Vec<Patch>> {
        for prediction in outstanding.iter().rev() {
            for entry in prediction.entries().rev() {
                let live = entry.container.get(&entry.key)?;
                if !same_value(live.as_ref(), entry.new.as_ref()) {
                    return Err(Error::RollbackMismatch {
                        key: entry.key.clone(),
                        expected: describe(entry.new.as_ref()),
                        found: describe(live.as_ref()),
                    });
                }
                entry.container.raw_set(&entry.key, entry.old.clone())?;
                net.record(&entry.container, &entry.key, entry.old.clone(), live);
            }
        }

        if let Some(canon) = canon {
            let patch = self.record_patch(canon)?;
            net.merge(&patch);
        }

        let mut kept = Vec::new();
        for prediction in outstanding {
            if drop.iter().any(|d| d.id() == prediction.id()) {
                continue;
            }
            if prediction.matches_prior() {
                prediction.apply_silently()?;
                net.merge(prediction);
                kept.push(prediction.clone());
            } else {
                tracing::warn!(
                    prediction = prediction.id().raw(),
                    "dropping prediction that no longer applies"
                );
            }
        }
        Ok(kept)
    }

    /// Put `kept` back as the outstanding list, ahead of any prediction made
    /// while it was taken out.
    fn restore_predictions(&self, kept: Vec<Patch>) {
        let mut predictions = self.inner.predictions.borrow_mut();
        let added = std::mem::replace(&mut *predictions, kept);
        predictions.extend(added);
    }

    pub(crate) fn emit_patch(&self, patch: &Patch) {
        for entry in patch.entries() {
            self.emit(&entry.container, &entry.key, entry.new.clone(), entry.old.clone());
        }
    }

    /// Number of predictions not yet settled by a canonical update.
    pub fn outstanding_predictions(&self) -> usize {
        self.inner.predictions.borrow().len()
    }
}
