//! The promise handle and its combinator surface.
//!
//! `Promise<T>` is a cheap-clone handle over shared single-threaded state.
//! Producers drive it with `resolve`, `reject`, `report_progress` and
//! `cancel`; consumers derive new promises with the combinators. Every
//! combinator creates a result promise, attaches it as a child of the
//! source, and installs handlers translating the source's outcome into the
//! result's outcome. A source that is already resolved short-circuits:
//! the callback runs synchronously and no chain edge is recorded.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::{self, CoreCell, PromiseCore};
use crate::errors::Rejection;
use crate::events;
use crate::graph::{self, Cancelable, Rejectable, WeakCancelable};
use crate::handlers::{CancelHandler, RejectHandler, ResolveHandler};
use crate::state::{PromiseId, PromiseState};

/// A one-shot container for an asynchronous outcome: a value, an error,
/// or a cancellation.
pub struct Promise<T> {
    core: CoreCell<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            core: self.core.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Promise")
            .field("id", &core.id)
            .field("name", &core.name)
            .field("state", &core.state)
            .finish()
    }
}

impl<T: Clone + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A fresh pending promise, awaiting its producer.
    pub fn new() -> Self {
        Self::create(None)
    }

    /// A fresh pending promise with a diagnostic name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::create(Some(name.into()))
    }

    pub(crate) fn create(name: Option<String>) -> Self {
        Self::from_core(PromiseCore::pending(name))
    }

    fn from_core(core: PromiseCore<T>) -> Self {
        Promise {
            core: Rc::new(RefCell::new(core)),
        }
    }

    /// A promise born resolved with `value`. Never tracked.
    pub fn resolved(value: T) -> Self {
        Self::from_core(PromiseCore::settled(
            PromiseState::Resolved,
            Some(value),
            None,
        ))
    }

    /// A promise born rejected with `err`. Never tracked, and the sink is
    /// not notified.
    pub fn rejected(err: impl Into<Rejection>) -> Self {
        Self::from_core(PromiseCore::settled(
            PromiseState::Rejected,
            None,
            Some(err.into()),
        ))
    }

    /// A promise born cancelled.
    pub fn canceled() -> Self {
        Self::from_core(PromiseCore::settled(PromiseState::Cancelled, None, None))
    }

    /// Unique id of this promise.
    pub fn id(&self) -> PromiseId {
        self.core.borrow().id
    }

    /// Diagnostic name, when one was given.
    pub fn name(&self) -> Option<String> {
        self.core.borrow().name.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PromiseState {
        self.core.borrow().state
    }

    /// The resolved value, present exactly when the state is `Resolved`.
    pub fn value(&self) -> Option<T> {
        self.core.borrow().value.clone()
    }

    /// The rejection, present exactly when the state is `Rejected`.
    pub fn error(&self) -> Option<Rejection> {
        self.core.borrow().error.clone()
    }

    /// The recorded upstream promise, if any.
    pub fn parent(&self) -> Option<Box<dyn Cancelable>> {
        self.parent_handle()
    }

    /// The recorded downstream promises.
    pub fn children(&self) -> Vec<Box<dyn Cancelable>> {
        self.child_handles()
    }

    /// Record `parent` as this promise's upstream. See
    /// [`Cancelable::attach_parent`].
    pub fn attach_parent(&self, parent: &dyn Cancelable) {
        graph::link_parent(self, parent);
    }

    pub(crate) fn label(&self) -> String {
        self.core.borrow().label()
    }

    /// Resolve with `value`. Illegal unless pending; an illegal attempt is
    /// suppressed and reported through the sink.
    pub fn resolve(&self, value: T) {
        core::resolve_core(&self.core, value, false);
    }

    /// Resolve if still pending. Returns `false`, without any sink event,
    /// when the promise has already settled.
    pub fn try_resolve(&self, value: T) -> bool {
        core::resolve_core(&self.core, value, true)
    }

    /// Reject with `err`, reporting it through the sink first.
    pub fn reject(&self, err: impl Into<Rejection>) {
        core::reject_core(&self.core, err.into(), true);
    }

    /// Reject without notifying the sink. For errors the sink has already
    /// seen, typically faults surfacing out of a handler.
    pub fn reject_silent(&self, err: impl Into<Rejection>) {
        core::reject_core(&self.core, err.into(), false);
    }

    /// Report fractional progress, conventionally in `[0, 1]`. Dispatches
    /// progress handlers in registration order; pending-only.
    pub fn report_progress(&self, amount: f32) {
        core::progress_core(&self.core, amount);
    }

    /// Cancel the pending prefix of this promise's lineage, from the
    /// topmost still-pending ancestor down to this promise.
    pub fn cancel(&self) {
        graph::cancel_upward(Box::new(self.clone()));
    }

    /// Cancel only this promise. No-op unless pending.
    pub fn cancel_self(&self) {
        core::cancel_core(&self.core);
    }

    /// Cancel this promise and every transitively pending descendant.
    pub fn cancel_self_and_children(&self) {
        graph::cancel_subtree(Box::new(self.clone()));
    }

    /// Chain a promise-returning continuation.
    ///
    /// On resolution the continuation runs and the returned promise's
    /// outcome (value, error, progress, cancellation) is forwarded to the
    /// result. Rejection and cancellation of the source pass through. If
    /// the source has already resolved, the continuation runs now and its
    /// promise is returned directly, with no chain edge.
    pub fn then<U, F>(&self, on_resolved: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Promise<U>, Rejection> + 'static,
    {
        if let Some(value) = self.resolved_value() {
            return match on_resolved(value) {
                Ok(next) => next,
                Err(fault) => Promise::rejected(fault),
            };
        }
        let result = Promise::<U>::create(self.name());
        result.attach_parent(self);
        let chained = result.clone();
        let forward_err = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |value| {
                let inner = on_resolved(value)?;
                chain_into(&inner, &chained);
                Ok(())
            },
            move |err| {
                forward_err.reject(err);
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Chain a promise-returning continuation with a recovery handler.
    ///
    /// Like [`then`](Self::then), except a rejection of the source is
    /// given to `on_rejected`, whose returned promise determines the
    /// result. A fault inside `on_rejected` itself rejects the result
    /// loudly.
    pub fn then_or_else<U, F, G>(&self, on_resolved: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Promise<U>, Rejection> + 'static,
        G: FnOnce(Rejection) -> Result<Promise<U>, Rejection> + 'static,
    {
        if let Some(value) = self.resolved_value() {
            return match on_resolved(value) {
                Ok(next) => next,
                Err(fault) => Promise::rejected(fault),
            };
        }
        let result = Promise::<U>::create(self.name());
        result.attach_parent(self);
        let chained = result.clone();
        let recovered = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |value| {
                let inner = on_resolved(value)?;
                chain_into(&inner, &chained);
                Ok(())
            },
            move |err| {
                match on_rejected(err) {
                    Ok(inner) => chain_into(&inner, &recovered),
                    Err(fault) => recovered.reject(fault),
                }
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Chain a value transformation: `then_map(f)` is
    /// `then(|v| Ok(Promise::resolved(f(v)?)))`.
    pub fn then_map<U, F>(&self, transform: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, Rejection> + 'static,
    {
        self.then(move |value| Ok(Promise::resolved(transform(value)?)))
    }

    /// Chain a side effect on the value; the result is a void promise that
    /// resolves once the effect ran.
    pub fn then_do<F>(&self, on_resolved: F) -> Promise<()>
    where
        F: FnOnce(T) -> Result<(), Rejection> + 'static,
    {
        if let Some(value) = self.resolved_value() {
            return match on_resolved(value) {
                Ok(()) => Promise::resolved(()),
                Err(fault) => Promise::rejected(fault),
            };
        }
        let result = Promise::<()>::create(self.name());
        result.attach_parent(self);
        let done = result.clone();
        let forward_err = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |value| {
                on_resolved(value)?;
                done.resolve(());
                Ok(())
            },
            move |err| {
                forward_err.reject(err);
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Side effect on the value plus an error observer.
    ///
    /// The observer does not consume the rejection: the result is still
    /// rejected with the same error, silently, so the chain propagates
    /// without the sink hearing about it twice.
    pub fn then_do_or<F, G>(&self, on_resolved: F, on_rejected: G) -> Promise<()>
    where
        F: FnOnce(T) -> Result<(), Rejection> + 'static,
        G: FnOnce(Rejection) -> Result<(), Rejection> + 'static,
    {
        if let Some(value) = self.resolved_value() {
            return match on_resolved(value) {
                Ok(()) => Promise::resolved(()),
                Err(fault) => Promise::rejected(fault),
            };
        }
        let result = Promise::<()>::create(self.name());
        result.attach_parent(self);
        let done = result.clone();
        let observed = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |value| {
                on_resolved(value)?;
                done.resolve(());
                Ok(())
            },
            move |err| {
                on_rejected(err.clone())?;
                observed.reject_silent(err);
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Observe a rejection; the error stops here.
    ///
    /// The result resolves whether the source resolved or the handler
    /// consumed its rejection. A fault inside the handler rejects the
    /// result silently. On an already-resolved source this is a fresh
    /// pre-resolved void promise, with no chain edge.
    pub fn catch<F>(&self, on_rejected: F) -> Promise<()>
    where
        F: FnOnce(Rejection) -> Result<(), Rejection> + 'static,
    {
        if self.state() == PromiseState::Resolved {
            return Promise::resolved(());
        }
        let result = Promise::<()>::create(self.name());
        result.attach_parent(self);
        let settled = result.clone();
        let recovered = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |_value| {
                settled.resolve(());
                Ok(())
            },
            move |err| {
                match on_rejected(err) {
                    Ok(()) => recovered.resolve(()),
                    Err(fault) => recovered.reject_silent(fault),
                }
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Map a rejection back into a value of the same type.
    ///
    /// A resolved source passes its value through untouched; on an
    /// already-resolved source the source handle itself is returned. A
    /// fault inside the mapper rejects the result silently.
    pub fn catch_map<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(Rejection) -> Result<T, Rejection> + 'static,
    {
        if self.state() == PromiseState::Resolved {
            return self.clone();
        }
        let result = Promise::<T>::create(self.name());
        result.attach_parent(self);
        let passthrough = result.clone();
        let recovered = result.clone();
        let forward_cancel = result.clone();
        self.actions(
            move |value| {
                passthrough.resolve(value);
                Ok(())
            },
            move |err| {
                match on_rejected(err) {
                    Ok(value) => recovered.resolve(value),
                    Err(fault) => recovered.reject_silent(fault),
                }
                Ok(())
            },
            move || {
                forward_cancel.cancel();
                Ok(())
            },
            Box::new(result.clone()),
        );
        result
    }

    /// Install a cancel handler on this promise itself. Resolution and
    /// rejection are ignored; no new promise is created.
    pub fn on_cancel<F>(&self, on_cancelled: F)
    where
        F: FnOnce() -> Result<(), Rejection> + 'static,
    {
        self.actions(
            |_value| Ok(()),
            |_err| Ok(()),
            on_cancelled,
            Box::new(self.clone()),
        );
    }

    /// Run an action exactly once, whatever the outcome.
    ///
    /// The returned void promise resolves on any terminal transition of
    /// the source; the action runs on a side chain of it, so a fault in
    /// the action rejects only that unobserved side chain.
    pub fn finally<F>(&self, on_complete: F) -> Promise<()>
    where
        F: FnOnce() -> Result<(), Rejection> + 'static,
    {
        let bridge = Promise::<()>::create(self.name());
        bridge.attach_parent(self);
        let b_resolve = bridge.clone();
        let b_reject = bridge.clone();
        let b_cancel = bridge.clone();
        self.actions(
            move |_value| {
                b_resolve.resolve(());
                Ok(())
            },
            move |_err| {
                b_reject.resolve(());
                Ok(())
            },
            move || {
                b_cancel.resolve(());
                Ok(())
            },
            Box::new(bridge.clone()),
        );
        let _ = bridge.then_do(move |()| on_complete());
        bridge
    }

    /// Chain a continuation that runs whatever the outcome; the preceding
    /// outcome is entirely masked by the promise the continuation returns.
    pub fn continue_with<U, F>(&self, on_complete: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce() -> Result<Promise<U>, Rejection> + 'static,
    {
        let bridge = Promise::<()>::create(self.name());
        bridge.attach_parent(self);
        let b_resolve = bridge.clone();
        let b_reject = bridge.clone();
        let b_cancel = bridge.clone();
        self.actions(
            move |_value| {
                b_resolve.resolve(());
                Ok(())
            },
            move |_err| {
                b_reject.resolve(());
                Ok(())
            },
            move || {
                b_cancel.resolve(());
                Ok(())
            },
            Box::new(bridge.clone()),
        );
        bridge.then(move |()| on_complete())
    }

    /// Observe progress reports. Ignored silently when the promise has
    /// already settled. Returns a handle to this same promise.
    pub fn progress<F>(&self, on_progress: F) -> Promise<T>
    where
        F: FnMut(f32) + 'static,
    {
        self.subscribe_progress(on_progress);
        self.clone()
    }

    /// Chain into an aggregate: `then_all(f)` is
    /// `then(|v| Ok(Promise::all(f(v)?)))`.
    pub fn then_all<U, F>(&self, chain: F) -> Promise<Vec<U>>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Vec<Promise<U>>, Rejection> + 'static,
    {
        self.then(move |value| Ok(Promise::all(chain(value)?)))
    }

    /// Chain into a race: `then_race(f)` is
    /// `then(|v| Ok(Promise::race(f(v)?)))`.
    pub fn then_race<U, F>(&self, chain: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Vec<Promise<U>>, Rejection> + 'static,
    {
        self.then(move |value| Ok(Promise::race(chain(value)?)))
    }

    /// Terminate the chain: any rejection still unclaimed here is routed
    /// to the sink as unhandled. No-op on an already-resolved promise.
    pub fn done(&self) {
        if self.state() == PromiseState::Resolved {
            return;
        }
        let label = self.label();
        let _ = self.catch(move |err| {
            events::propagate_unhandled(label, &err);
            Ok(())
        });
    }

    /// Terminate the chain with a final consumer of the value.
    pub fn done_with<F>(&self, on_resolved: F)
    where
        F: FnOnce(T) -> Result<(), Rejection> + 'static,
    {
        let label = self.label();
        let _ = self.then_do(on_resolved).catch(move |err| {
            events::propagate_unhandled(label, &err);
            Ok(())
        });
    }

    /// Terminate the chain with a final consumer and an error observer.
    pub fn done_or<F, G>(&self, on_resolved: F, on_rejected: G)
    where
        F: FnOnce(T) -> Result<(), Rejection> + 'static,
        G: FnOnce(Rejection) -> Result<(), Rejection> + 'static,
    {
        let label = self.label();
        let _ = self.then_do_or(on_resolved, on_rejected).catch(move |err| {
            events::propagate_unhandled(label, &err);
            Ok(())
        });
    }

    /// Install the outcome-handler triple on this promise.
    ///
    /// Pending sources enqueue all three; a settled source invokes the
    /// matching handler synchronously under the dispatch guard, against
    /// `target` as the downstream for faults.
    pub(crate) fn actions<F, G, H>(
        &self,
        on_resolved: F,
        on_rejected: G,
        on_cancelled: H,
        target: Box<dyn Rejectable>,
    ) where
        F: FnOnce(T) -> Result<(), Rejection> + 'static,
        G: FnOnce(Rejection) -> Result<(), Rejection> + 'static,
        H: FnOnce() -> Result<(), Rejection> + 'static,
    {
        match self.state() {
            PromiseState::Pending => {
                let mut core = self.core.borrow_mut();
                core.handlers
                    .push_resolve(Box::new(on_resolved), target.clone_rejectable());
                core.handlers
                    .push_reject(Box::new(on_rejected), target.clone_rejectable());
                core.handlers.push_cancel(Box::new(on_cancelled), target);
            }
            PromiseState::Resolved => {
                if let Some(value) = self.value() {
                    core::run_resolve(
                        ResolveHandler {
                            callback: Box::new(on_resolved),
                            target,
                        },
                        value,
                    );
                }
            }
            PromiseState::Rejected => {
                if let Some(err) = self.error() {
                    core::run_reject(
                        RejectHandler {
                            callback: Box::new(on_rejected),
                            target,
                        },
                        err,
                    );
                }
            }
            PromiseState::Cancelled => {
                core::run_cancel(CancelHandler {
                    callback: Box::new(on_cancelled),
                    target,
                });
            }
        }
    }

    /// Register a progress observer while pending; dropped silently on a
    /// settled promise.
    pub(crate) fn subscribe_progress<F>(&self, on_progress: F)
    where
        F: FnMut(f32) + 'static,
    {
        let mut core = self.core.borrow_mut();
        if core.state.is_pending() {
            core.handlers.push_progress(Box::new(on_progress));
        }
    }

    fn resolved_value(&self) -> Option<T> {
        let core = self.core.borrow();
        match core.state {
            PromiseState::Resolved => core.value.clone(),
            _ => None,
        }
    }

    fn parent_handle(&self) -> Option<Box<dyn Cancelable>> {
        self.core
            .borrow()
            .parent
            .as_ref()
            .and_then(|weak| weak.upgrade())
    }

    fn child_handles(&self) -> Vec<Box<dyn Cancelable>> {
        self.core
            .borrow()
            .children
            .iter()
            .map(|child| child.clone_node())
            .collect()
    }
}

/// Forward the outcome of `inner` into `result`: value resolves, error
/// rejects, progress is re-reported, cancellation cancels.
fn chain_into<U: Clone + 'static>(inner: &Promise<U>, result: &Promise<U>) {
    let forward_progress = result.clone();
    inner.subscribe_progress(move |amount| forward_progress.report_progress(amount));
    let on_resolve = result.clone();
    let on_reject = result.clone();
    let on_cancel = result.clone();
    inner.actions(
        move |value| {
            on_resolve.resolve(value);
            Ok(())
        },
        move |err| {
            on_reject.reject(err);
            Ok(())
        },
        move || {
            on_cancel.cancel();
            Ok(())
        },
        Box::new(result.clone()),
    );
}

impl<T: Clone + 'static> Rejectable for Promise<T> {
    fn reject(&self, err: Rejection) {
        core::reject_core(&self.core, err, true);
    }

    fn reject_silent(&self, err: Rejection) {
        core::reject_core(&self.core, err, false);
    }

    fn clone_rejectable(&self) -> Box<dyn Rejectable> {
        Box::new(self.clone())
    }
}

impl<T: Clone + 'static> Cancelable for Promise<T> {
    fn id(&self) -> PromiseId {
        self.core.borrow().id
    }

    fn name(&self) -> Option<String> {
        self.core.borrow().name.clone()
    }

    fn state(&self) -> PromiseState {
        self.core.borrow().state
    }

    fn parent(&self) -> Option<Box<dyn Cancelable>> {
        self.parent_handle()
    }

    fn children(&self) -> Vec<Box<dyn Cancelable>> {
        self.child_handles()
    }

    fn attach_parent(&self, parent: &dyn Cancelable) {
        graph::link_parent(self, parent);
    }

    fn cancel(&self) {
        graph::cancel_upward(Box::new(self.clone()));
    }

    fn cancel_self(&self) {
        core::cancel_core(&self.core);
    }

    fn cancel_self_and_children(&self) {
        graph::cancel_subtree(Box::new(self.clone()));
    }

    fn clone_node(&self) -> Box<dyn Cancelable> {
        Box::new(self.clone())
    }

    fn downgrade(&self) -> Box<dyn WeakCancelable> {
        Box::new(WeakPromise {
            core: Rc::downgrade(&self.core),
        })
    }

    fn adopt(&self, child: Box<dyn Cancelable>) {
        let child_id = child.id();
        if child_id == self.id() {
            return;
        }
        let mut core = self.core.borrow_mut();
        if core.children.iter().any(|c| c.id() == child_id) {
            return;
        }
        core.children.push(child);
    }

    fn disown(&self, child: PromiseId) {
        self.core.borrow_mut().children.retain(|c| c.id() != child);
    }

    fn set_parent_link(&self, parent: Option<Box<dyn WeakCancelable>>) {
        self.core.borrow_mut().parent = parent;
    }
}

/// Weak promise handle used for parent back-references, so a finished
/// chain does not keep its ancestry alive.
struct WeakPromise<T> {
    core: Weak<RefCell<PromiseCore<T>>>,
}

impl<T: Clone + 'static> WeakCancelable for WeakPromise<T> {
    fn upgrade(&self) -> Option<Box<dyn Cancelable>> {
        self.core
            .upgrade()
            .map(|core| Box::new(Promise { core }) as Box<dyn Cancelable>)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::events::recording::RecordingReceiver;

    #[test]
    fn test_then_fast_path_skips_chain_edge() {
        let source = Promise::resolved(20);
        let calls = Rc::new(Cell::new(0));
        let calls_in = calls.clone();
        let next = source.then(move |v| {
            calls_in.set(calls_in.get() + 1);
            Ok(Promise::resolved(v + 1))
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(next.value(), Some(21));
        assert!(source.children().is_empty());
    }

    #[test]
    fn test_then_fast_path_wraps_fault() {
        let source = Promise::resolved(1);
        let next: Promise<i32> = source.then(|_| Err(Rejection::from_message("nope")));
        assert_eq!(next.state(), PromiseState::Rejected);
    }

    #[test]
    fn test_then_forwards_rejection_to_result() {
        let source = Promise::<i32>::new();
        let next = source.then(|v| Ok(Promise::resolved(v)));
        source.reject(Rejection::from_message("upstream"));
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(
            next.error().map(|e| e.to_string()),
            Some("upstream".to_string())
        );
    }

    #[test]
    fn test_then_forwards_inner_progress_and_cancel() {
        let source = Promise::<i32>::new();
        let inner = Promise::<i32>::new();
        let inner_for_then = inner.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = seen.clone();
        let next = source.then(move |_| Ok(inner_for_then));
        next.progress(move |p| seen_in.borrow_mut().push(p));
        source.resolve(0);
        inner.report_progress(0.5);
        assert_eq!(seen.borrow().clone(), vec![0.5]);
        inner.cancel();
        assert_eq!(next.state(), PromiseState::Cancelled);
    }

    #[test]
    fn test_then_map_transforms() {
        let source = Promise::<i32>::new();
        let next = source.then_map(|v| Ok(v * 2));
        source.resolve(4);
        assert_eq!(next.value(), Some(8));
    }

    #[test]
    fn test_then_or_else_recovers_with_promise() {
        let source = Promise::<i32>::new();
        let next = source.then_or_else(
            |v| Ok(Promise::resolved(v)),
            |_err| Ok(Promise::resolved(-1)),
        );
        source.reject(Rejection::from_message("x"));
        assert_eq!(next.value(), Some(-1));
    }

    #[test]
    fn test_then_or_else_fault_in_recovery_rejects_loudly() {
        let recorder = RecordingReceiver::install();
        let source = Promise::<i32>::new();
        let next = source.then_or_else(
            |v| Ok(Promise::resolved(v)),
            |_err| Err(Rejection::from_message("recovery failed")),
        );
        source.reject_silent(Rejection::from_message("x"));
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(recorder.exceptions(), vec!["recovery failed".to_string()]);
    }

    #[test]
    fn test_then_do_or_observes_and_propagates_silently() {
        let recorder = RecordingReceiver::install();
        let source = Promise::<i32>::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_in = seen.clone();
        let next = source.then_do_or(
            |_v| Ok(()),
            move |err| {
                *seen_in.borrow_mut() = Some(err.to_string());
                Ok(())
            },
        );
        source.reject_silent(Rejection::from_message("seen once"));
        assert_eq!(seen.borrow().clone(), Some("seen once".to_string()));
        assert_eq!(next.state(), PromiseState::Rejected);
        assert!(recorder.exceptions().is_empty());
    }

    #[test]
    fn test_catch_consumes_rejection() {
        let source = Promise::<i32>::new();
        let seen = Rc::new(Cell::new(false));
        let seen_in = seen.clone();
        let next = source.catch(move |_err| {
            seen_in.set(true);
            Ok(())
        });
        source.reject_silent(Rejection::from_message("x"));
        assert!(seen.get());
        assert_eq!(next.state(), PromiseState::Resolved);
    }

    #[test]
    fn test_catch_on_resolved_source_is_fresh_void() {
        let source = Promise::resolved(1);
        let next = source.catch(|_err| Ok(()));
        assert_eq!(next.state(), PromiseState::Resolved);
        assert!(source.children().is_empty());
    }

    #[test]
    fn test_catch_map_recovers_value() {
        let source = Promise::<i32>::new();
        let next = source.catch_map(|_err| Ok(-1));
        source.reject(Rejection::from_message("x"));
        assert_eq!(next.value(), Some(-1));
    }

    #[test]
    fn test_catch_map_on_resolved_source_returns_self() {
        let source = Promise::resolved(9);
        let next = source.catch_map(|_err| Ok(0));
        assert_eq!(next.id(), source.id());
        assert_eq!(next.value(), Some(9));
    }

    #[test]
    fn test_catch_map_fault_is_silent() {
        let recorder = RecordingReceiver::install();
        let source = Promise::<i32>::new();
        let next = source.catch_map(|_err| Err(Rejection::from_message("mapper died")));
        source.reject_silent(Rejection::from_message("x"));
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(
            next.error().map(|e| e.to_string()),
            Some("mapper died".to_string())
        );
        assert!(recorder.exceptions().is_empty());
    }

    #[test]
    fn test_on_cancel_installs_on_self() {
        let p = Promise::<i32>::new();
        let fired = Rc::new(Cell::new(0));
        let fired_in = fired.clone();
        p.on_cancel(move || {
            fired_in.set(fired_in.get() + 1);
            Ok(())
        });
        p.cancel();
        assert_eq!(fired.get(), 1);
        assert_eq!(p.state(), PromiseState::Cancelled);
    }

    #[test]
    fn test_finally_runs_once_per_outcome() {
        for settle in [
            (|p: &Promise<i32>| p.resolve(1)) as fn(&Promise<i32>),
            |p| p.reject_silent(Rejection::from_message("x")),
            |p| p.cancel(),
        ] {
            let p = Promise::<i32>::new();
            let runs = Rc::new(Cell::new(0));
            let runs_in = runs.clone();
            p.finally(move || {
                runs_in.set(runs_in.get() + 1);
                Ok(())
            });
            settle(&p);
            assert_eq!(runs.get(), 1);
        }
    }

    #[test]
    fn test_continue_with_masks_rejection() {
        let source = Promise::<i32>::new();
        let next = source.continue_with(|| Ok(Promise::resolved("fresh")));
        source.reject_silent(Rejection::from_message("masked"));
        assert_eq!(next.value(), Some("fresh"));
    }

    #[test]
    fn test_progress_returns_self_and_ignores_settled() {
        let p = Promise::<i32>::new();
        let same = p.progress(|_| {});
        assert_eq!(same.id(), p.id());
        p.resolve(1);
        // Settled promise: registration is silently dropped.
        let same = p.progress(|_| panic!("must never fire"));
        assert_eq!(same.id(), p.id());
    }

    #[test]
    fn test_done_routes_unhandled_rejection_to_sink() {
        let recorder = RecordingReceiver::install();
        let p = Promise::<i32>::named("Job");
        p.done();
        p.reject_silent(Rejection::from_message("dropped"));
        let exceptions = recorder.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].contains("Job"));
        assert!(exceptions[0].contains("dropped"));
    }

    #[test]
    fn test_done_is_noop_on_resolved() {
        let recorder = RecordingReceiver::install();
        let p = Promise::resolved(1);
        p.done();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_result_promise_inherits_source_name() {
        let p = Promise::<i32>::named("Fetch");
        let next = p.then_map(|v| Ok(v));
        assert_eq!(next.name(), Some("Fetch".to_string()));
    }
}
