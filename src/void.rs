//! The void promise shape.
//!
//! A promise that carries no value is simply `Promise<()>`; the generic
//! combinator surface applies unchanged. What lives here are the
//! aggregates whose void form differs from the value form: `all_void` and
//! `race_void` settle without collecting a results vector, and `sequence`
//! runs promise factories strictly one after another.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::combinators::PromiseThunk;
use crate::events;
use crate::graph;
use crate::promise::Promise;

/// A promise carrying no value.
pub type PromiseVoid = Promise<()>;

impl Promise<()> {
    /// Resolve once every input has resolved, with no collected values.
    ///
    /// Same rules as [`Promise::all`]: inputs become children of the
    /// result, progress is the mean, the first rejection wins silently,
    /// and a cancelled input cancels the result.
    pub fn all_void(promises: impl IntoIterator<Item = Promise<()>>) -> Promise<()> {
        let inputs: Vec<Promise<()>> = promises.into_iter().collect();
        if inputs.is_empty() {
            return Promise::resolved(());
        }
        let count = inputs.len();
        let result = Promise::<()>::create(Some("All".into()));
        let remaining = Rc::new(Cell::new(count));
        let progress = Rc::new(RefCell::new(vec![0.0f32; count]));
        for (i, input) in inputs.into_iter().enumerate() {
            graph::link_parent(&input, &result);
            {
                let progress = progress.clone();
                let report_to = result.clone();
                input.subscribe_progress(move |amount| {
                    progress.borrow_mut()[i] = amount;
                    if report_to.state().is_pending() {
                        let mean = progress.borrow().iter().sum::<f32>() / count as f32;
                        report_to.report_progress(mean);
                    }
                });
            }
            let on_resolve = result.clone();
            let on_reject = result.clone();
            let on_cancel = result.clone();
            let progress = progress.clone();
            let remaining = remaining.clone();
            input.actions(
                move |()| {
                    progress.borrow_mut()[i] = 1.0;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 && on_resolve.state().is_pending() {
                        on_resolve.resolve(());
                    }
                    Ok(())
                },
                move |err| {
                    if on_reject.state().is_pending() {
                        on_reject.reject_silent(err);
                    }
                    Ok(())
                },
                move || {
                    on_cancel.cancel();
                    Ok(())
                },
                Box::new(result.clone()),
            );
        }
        result
    }

    /// Settle with the first input to settle, carrying no value.
    pub fn race_void(promises: impl IntoIterator<Item = Promise<()>>) -> Promise<()> {
        Promise::race(promises)
    }

    /// Run promise factories strictly in order.
    ///
    /// Each factory starts only after the previous promise resolved. The
    /// result resolves when the last one does and rejects on the first
    /// error, leaving the remaining factories unattempted. Progress over
    /// attempt `k` of `n` is sliced as `(k + p) / n`.
    pub fn sequence(thunks: Vec<PromiseThunk<()>>) -> Promise<()> {
        let total = thunks.len();
        let result = Promise::<()>::create(Some("Sequence".into()));
        if total == 0 {
            result.resolve(());
            return result;
        }
        let pool: Rc<RefCell<Vec<Option<PromiseThunk<()>>>>> =
            Rc::new(RefCell::new(thunks.into_iter().map(Some).collect()));
        advance_sequence(result.clone(), pool, 0, total);
        result
    }
}

/// Run step `k` of the sequence, wiring its outcome into `result` and
/// starting step `k + 1` once it resolves.
fn advance_sequence(
    result: Promise<()>,
    pool: Rc<RefCell<Vec<Option<PromiseThunk<()>>>>>,
    k: usize,
    total: usize,
) {
    let Some(thunk) = pool.borrow_mut().get_mut(k).and_then(Option::take) else {
        return;
    };
    let step = match thunk() {
        Ok(step) => step,
        Err(fault) => {
            // The factory itself faulted, which ends the sequence.
            if result.state().is_pending() {
                events::receiver().on_exception(&fault);
                result.reject_silent(fault);
            }
            return;
        }
    };
    {
        let report_to = result.clone();
        step.subscribe_progress(move |amount| {
            if report_to.state().is_pending() {
                report_to.report_progress((k as f32 + amount) / total as f32);
            }
        });
    }
    let on_resolve = result.clone();
    let on_reject = result.clone();
    let on_cancel = result.clone();
    let pool_next = pool.clone();
    step.actions(
        move |()| {
            if k + 1 < total {
                advance_sequence(on_resolve, pool_next, k + 1, total);
            } else if on_resolve.state().is_pending() {
                on_resolve.report_progress(1.0);
                on_resolve.resolve(());
            }
            Ok(())
        },
        move |err| {
            if on_reject.state().is_pending() {
                on_reject.reject_silent(err);
            }
            Ok(())
        },
        move || {
            on_cancel.cancel();
            Ok(())
        },
        Box::new(result.clone()),
    );
}
