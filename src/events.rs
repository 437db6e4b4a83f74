//! Diagnostic sink and pending-promise tracking.
//!
//! The library reports everything noteworthy through a single
//! `EventsReceiver`: handler faults, illegal transitions, chain-graph
//! anomalies and verbose notes. It never branches on what the receiver
//! does with them. The default receiver forwards to the `tracing` facade;
//! hosts install their own with [`set_events_receiver`].
//!
//! When tracking is enabled, every pending promise is registered by id and
//! name and removed again on its terminal transition, so tooling can list
//! promises that never settled.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{PromiseError, Rejection};
use crate::state::PromiseId;

/// Sink for diagnostic events emitted by the promise machinery.
pub trait EventsReceiver {
    /// Informational message.
    fn on_verbose(&self, msg: &str);
    /// Something looks wrong but the operation proceeded.
    fn on_warning(&self, msg: &str);
    /// Something looks slightly off; the operation was refused or ignored.
    fn on_warning_minor(&self, msg: &str);
    /// A user callback faulted, or a rejection went unhandled.
    fn on_exception(&self, err: &Rejection);
    /// A producer attempted an illegal state transition.
    fn on_state_exception(&self, err: &PromiseError);
}

/// Default receiver, forwarding every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReceiver;

impl EventsReceiver for TracingReceiver {
    fn on_verbose(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn on_warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn on_warning_minor(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn on_exception(&self, err: &Rejection) {
        tracing::error!("promise fault: {err}");
    }

    fn on_state_exception(&self, err: &PromiseError) {
        tracing::warn!("{err}");
    }
}

static TRACKING: AtomicBool = AtomicBool::new(false);

thread_local! {
    static RECEIVER: RefCell<Rc<dyn EventsReceiver>> =
        RefCell::new(Rc::new(TracingReceiver));
    static PENDING: RefCell<BTreeMap<PromiseId, Option<String>>> =
        RefCell::new(BTreeMap::new());
}

/// Install the diagnostic sink for promises on this thread.
///
/// Intended to be called once at program start, before any promise is
/// created.
pub fn set_events_receiver(receiver: Rc<dyn EventsReceiver>) {
    RECEIVER.with(|r| *r.borrow_mut() = receiver);
}

/// Enable or disable the pending-promise registry.
pub fn set_promise_tracking(enabled: bool) {
    TRACKING.store(enabled, Ordering::Relaxed);
}

pub(crate) fn tracking_enabled() -> bool {
    TRACKING.load(Ordering::Relaxed)
}

/// Snapshot of the current receiver, cloned out so event delivery never
/// holds the slot borrowed while user code runs.
pub(crate) fn receiver() -> Rc<dyn EventsReceiver> {
    RECEIVER.with(|r| r.borrow().clone())
}

pub(crate) fn track(id: PromiseId, name: Option<String>) {
    PENDING.with(|p| {
        p.borrow_mut().insert(id, name);
    });
}

pub(crate) fn untrack(id: PromiseId) {
    PENDING.with(|p| {
        p.borrow_mut().remove(&id);
    });
}

/// List the promises created while tracking was enabled that have not yet
/// reached a terminal state, ordered by id.
pub fn pending_promises() -> Vec<(PromiseId, Option<String>)> {
    PENDING.with(|p| {
        p.borrow()
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    })
}

/// Route a rejection nobody handled to the sink, labelled with the promise
/// it fell off of.
pub(crate) fn propagate_unhandled(promise: String, cause: &Rejection) {
    let wrapped = PromiseError::Unhandled {
        promise,
        cause: cause.clone(),
    };
    receiver().on_exception(&Rejection::new(wrapped));
}
