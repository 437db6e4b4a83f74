//! The promise state machine.
//!
//! One `PromiseCore` backs every promise handle. Transitions are gated so
//! `Pending` is the only source state: a second terminal transition is
//! suppressed and reported as a state exception. Handler queues are taken
//! out of the core atomically with the transition and dispatched after the
//! borrow is released, so handlers are free to create, settle or cancel
//! promises reentrantly, including this one.

use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::{PromiseError, Rejection};
use crate::events;
use crate::graph::{Cancelable, WeakCancelable};
use crate::handlers::{CancelHandler, HandlerStore, RejectHandler, ResolveHandler};
use crate::state::{PromiseId, PromiseState};

pub(crate) type CoreCell<T> = Rc<RefCell<PromiseCore<T>>>;

/// Shared state behind a promise handle.
pub(crate) struct PromiseCore<T> {
    pub(crate) id: PromiseId,
    pub(crate) name: Option<String>,
    pub(crate) state: PromiseState,
    pub(crate) value: Option<T>,
    pub(crate) error: Option<Rejection>,
    pub(crate) parent: Option<Box<dyn WeakCancelable>>,
    pub(crate) children: Vec<Box<dyn Cancelable>>,
    pub(crate) handlers: HandlerStore<T>,
}

impl<T> PromiseCore<T> {
    /// A fresh pending core, registered with the pending-promise registry
    /// when tracking is enabled.
    pub(crate) fn pending(name: Option<String>) -> Self {
        let id = PromiseId::next();
        if events::tracking_enabled() {
            events::track(id, name.clone());
        }
        PromiseCore {
            id,
            name,
            state: PromiseState::Pending,
            value: None,
            error: None,
            parent: None,
            children: Vec::new(),
            handlers: HandlerStore::new(),
        }
    }

    /// A core born settled. Never enters the registry: it was never
    /// pending.
    pub(crate) fn settled(
        state: PromiseState,
        value: Option<T>,
        error: Option<Rejection>,
    ) -> Self {
        PromiseCore {
            id: PromiseId::next(),
            name: None,
            state,
            value,
            error,
            parent: None,
            children: Vec::new(),
            handlers: HandlerStore::new(),
        }
    }

    /// Diagnostic label: the id, plus the name when one was given.
    pub(crate) fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.id, name),
            None => self.id.to_string(),
        }
    }
}

/// Dispatch a resolve handler under the fault guard: a fault is reported
/// to the sink and silently rejects the paired downstream.
pub(crate) fn run_resolve<T>(handler: ResolveHandler<T>, value: T) {
    if let Err(fault) = (handler.callback)(value) {
        events::receiver().on_exception(&fault);
        handler.target.reject_silent(fault);
    }
}

/// Dispatch a reject handler under the fault guard.
pub(crate) fn run_reject(handler: RejectHandler, err: Rejection) {
    if let Err(fault) = (handler.callback)(err) {
        events::receiver().on_exception(&fault);
        handler.target.reject_silent(fault);
    }
}

/// Dispatch a cancel handler. Same guard, except the sink is not told:
/// the fault surfaces only as the downstream rejection.
pub(crate) fn run_cancel(handler: CancelHandler) {
    if let Err(fault) = (handler.callback)() {
        handler.target.reject_silent(fault);
    }
}

/// Resolve transition. Returns whether the transition happened. With
/// `quiet` set the settled case is a plain `false` instead of a state
/// exception, which is all `try_resolve` adds.
pub(crate) fn resolve_core<T: Clone + 'static>(cell: &CoreCell<T>, value: T, quiet: bool) -> bool {
    let (taken, dispatch_value) = {
        let mut core = cell.borrow_mut();
        if !core.state.is_pending() {
            let err = illegal(&core, "resolve");
            drop(core);
            if !quiet {
                events::receiver().on_state_exception(&err);
            }
            return false;
        }
        core.state = PromiseState::Resolved;
        core.value = Some(value);
        events::untrack(core.id);
        (core.handlers.take_terminal(), core.value.clone())
    };
    if let Some(value) = dispatch_value {
        for handler in taken.resolve {
            run_resolve(handler, value.clone());
        }
    }
    true
}

/// Reject transition. With `notify` set the sink sees `on_exception`
/// before the transition; the silent variant skips that, for errors the
/// sink has already been told about.
pub(crate) fn reject_core<T: Clone + 'static>(cell: &CoreCell<T>, err: Rejection, notify: bool) {
    if notify && cell.borrow().state.is_pending() {
        events::receiver().on_exception(&err);
    }
    let taken = {
        let mut core = cell.borrow_mut();
        if !core.state.is_pending() {
            let err = illegal(&core, "reject");
            drop(core);
            events::receiver().on_state_exception(&err);
            return;
        }
        core.state = PromiseState::Rejected;
        core.error = Some(err.clone());
        events::untrack(core.id);
        core.handlers.take_terminal()
    };
    for handler in taken.reject {
        run_reject(handler, err.clone());
    }
}

/// Cancel transition for a single promise. Silent no-op unless pending.
pub(crate) fn cancel_core<T: Clone + 'static>(cell: &CoreCell<T>) {
    let taken = {
        let mut core = cell.borrow_mut();
        if !core.state.is_pending() {
            return;
        }
        core.state = PromiseState::Cancelled;
        events::untrack(core.id);
        core.handlers.take_terminal()
    };
    for handler in taken.cancel {
        run_cancel(handler);
    }
}

/// Progress dispatch. Does not change state; gated on pending like the
/// terminal transitions.
pub(crate) fn progress_core<T: Clone + 'static>(cell: &CoreCell<T>, amount: f32) {
    let mut taken = {
        let mut core = cell.borrow_mut();
        if !core.state.is_pending() {
            let err = illegal(&core, "report progress on");
            drop(core);
            events::receiver().on_state_exception(&err);
            return;
        }
        core.handlers.take_progress()
    };
    for handler in taken.iter_mut() {
        handler(amount);
    }
    let mut core = cell.borrow_mut();
    if core.state.is_pending() {
        core.handlers.restore_progress(taken);
    }
}

fn illegal<T>(core: &PromiseCore<T>, op: &'static str) -> PromiseError {
    PromiseError::IllegalTransition {
        op,
        promise: core.label(),
        state: core.state,
    }
}
