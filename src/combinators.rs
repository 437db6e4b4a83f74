//! Aggregate combinators over collections of promises.
//!
//! `all` resolves once every input has, `race` settles with the first
//! input to settle, and `first` tries a sequence of promise factories
//! until one succeeds. All three create a named result promise and install
//! per-input handlers that fold input outcomes into it; a settled result
//! ignores every later arrival.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::errors::{PromiseError, Rejection};
use crate::graph;
use crate::promise::Promise;

/// A deferred promise factory, as consumed by [`Promise::first`] and the
/// void `sequence` combinator.
pub type PromiseThunk<T> = Box<dyn FnOnce() -> Result<Promise<T>, Rejection>>;

impl<T: Clone + 'static> Promise<T> {
    /// Resolve with every input's value, in input order, once all inputs
    /// have resolved.
    ///
    /// An empty input resolves immediately with an empty vector. Inputs
    /// are attached as children of the result, inverting the usual edge
    /// direction, so cancelling the aggregate with
    /// [`cancel_self_and_children`](Promise::cancel_self_and_children)
    /// sweeps the inputs. Progress is the mean of all input progress; the
    /// first rejection wins and is forwarded silently; a cancelled input
    /// cancels the result.
    pub fn all(promises: impl IntoIterator<Item = Promise<T>>) -> Promise<Vec<T>> {
        let inputs: Vec<Promise<T>> = promises.into_iter().collect();
        if inputs.is_empty() {
            return Promise::resolved(Vec::new());
        }
        let count = inputs.len();
        let result = Promise::<Vec<T>>::create(Some("All".into()));
        let remaining = Rc::new(Cell::new(count));
        let results = Rc::new(RefCell::new(vec![None::<T>; count]));
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
            let slots = results.clone();
            let progress = progress.clone();
            let remaining = remaining.clone();
            input.actions(
                move |value| {
                    progress.borrow_mut()[i] = 1.0;
                    slots.borrow_mut()[i] = Some(value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 && on_resolve.state().is_pending() {
                        let collected: Vec<T> = slots.take().into_iter().flatten().collect();
                        on_resolve.resolve(collected);
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

    /// Settle with the first input to settle.
    ///
    /// Later arrivals are ignored. Progress is the maximum over input
    /// progress. No chain edges are recorded between the result and the
    /// inputs. An empty input set can never settle, so it is reported
    /// through the sink and returned already rejected.
    pub fn race(promises: impl IntoIterator<Item = Promise<T>>) -> Promise<T> {
        let inputs: Vec<Promise<T>> = promises.into_iter().collect();
        let result = Promise::<T>::create(Some("Race".into()));
        if inputs.is_empty() {
            result.reject(PromiseError::EmptyRace);
            return result;
        }
        let count = inputs.len();
        let progress = Rc::new(RefCell::new(vec![0.0f32; count]));
        for (i, input) in inputs.into_iter().enumerate() {
            {
                let progress = progress.clone();
                let report_to = result.clone();
                input.subscribe_progress(move |amount| {
                    progress.borrow_mut()[i] = amount;
                    if report_to.state().is_pending() {
                        let max = progress.borrow().iter().cloned().fold(0.0f32, f32::max);
                        report_to.report_progress(max);
                    }
                });
            }
            let on_resolve = result.clone();
            let on_reject = result.clone();
            let on_cancel = result.clone();
            input.actions(
                move |value| {
                    if on_resolve.state().is_pending() {
                        on_resolve.resolve(value);
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

    /// Try each thunk in order, resolving with the first success.
    ///
    /// A rejected attempt (or a thunk failing outright) moves on to the
    /// next candidate; once every candidate has failed, the result rejects
    /// with the last error. While attempt `k` of `n` is in flight its
    /// progress is reported as `(k + p) / n`, reaching `1` on completion
    /// or exhaustion.
    pub fn first(thunks: Vec<PromiseThunk<T>>) -> Promise<T> {
        let total = thunks.len();
        let result = Promise::<T>::create(Some("First".into()));
        if total == 0 {
            result.reject(PromiseError::EmptyFirst);
            return result;
        }
        let pool: Rc<RefCell<Vec<Option<PromiseThunk<T>>>>> =
            Rc::new(RefCell::new(thunks.into_iter().map(Some).collect()));
        attempt_first(result.clone(), pool, 0, total);
        result
    }
}

/// Run attempt `k` against the candidate pool, wiring its outcome into
/// `result` and falling through to attempt `k + 1` on failure.
fn attempt_first<T: Clone + 'static>(
    result: Promise<T>,
    pool: Rc<RefCell<Vec<Option<PromiseThunk<T>>>>>,
    k: usize,
    total: usize,
) {
    let Some(thunk) = pool.borrow_mut().get_mut(k).and_then(Option::take) else {
        return;
    };
    let attempt = match thunk() {
        Ok(attempt) => attempt,
        Err(fault) => {
            if k + 1 < total {
                attempt_first(result, pool, k + 1, total);
            } else if result.state().is_pending() {
                result.report_progress(1.0);
                result.reject_silent(fault);
            }
            return;
        }
    };
    {
        let report_to = result.clone();
        attempt.subscribe_progress(move |amount| {
            if report_to.state().is_pending() {
                report_to.report_progress((k as f32 + amount) / total as f32);
            }
        });
    }
    let on_resolve = result.clone();
    let on_reject = result.clone();
    let on_cancel = result.clone();
    let pool_next = pool.clone();
    attempt.actions(
        move |value| {
            if on_resolve.state().is_pending() {
                on_resolve.report_progress(1.0);
                on_resolve.resolve(value);
            }
            Ok(())
        },
        move |err| {
            if k + 1 < total {
                attempt_first(on_reject, pool_next, k + 1, total);
            } else if on_reject.state().is_pending() {
                on_reject.report_progress(1.0);
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
