//! Per-promise handler storage.
//!
//! Each promise keeps four queues: resolve, reject, cancel and progress
//! handlers, in registration order. The outcome queues pair every callback
//! with the downstream rejectable that should receive the callback's fault.
//! Most promises are observed at most once, so the queues are allocated
//! lazily and released wholesale on the terminal transition.

use crate::errors::Rejection;
use crate::graph::Rejectable;

pub(crate) type ResolveFn<T> = Box<dyn FnOnce(T) -> Result<(), Rejection>>;
pub(crate) type RejectFn = Box<dyn FnOnce(Rejection) -> Result<(), Rejection>>;
pub(crate) type CancelFn = Box<dyn FnOnce() -> Result<(), Rejection>>;
pub(crate) type ProgressFn = Box<dyn FnMut(f32)>;

/// A resolve callback and the rejectable its fault lands on.
pub(crate) struct ResolveHandler<T> {
    pub(crate) callback: ResolveFn<T>,
    pub(crate) target: Box<dyn Rejectable>,
}

/// A reject callback and the rejectable its fault lands on.
pub(crate) struct RejectHandler {
    pub(crate) callback: RejectFn,
    pub(crate) target: Box<dyn Rejectable>,
}

/// A cancel callback and the rejectable its fault lands on.
pub(crate) struct CancelHandler {
    pub(crate) callback: CancelFn,
    pub(crate) target: Box<dyn Rejectable>,
}

/// The three outcome queues, drained together on a terminal transition.
pub(crate) struct TerminalHandlers<T> {
    pub(crate) resolve: Vec<ResolveHandler<T>>,
    pub(crate) reject: Vec<RejectHandler>,
    pub(crate) cancel: Vec<CancelHandler>,
}

/// Lazily allocated handler queues for one promise.
pub(crate) struct HandlerStore<T> {
    resolve: Option<Vec<ResolveHandler<T>>>,
    reject: Option<Vec<RejectHandler>>,
    cancel: Option<Vec<CancelHandler>>,
    progress: Option<Vec<ProgressFn>>,
}

impl<T> HandlerStore<T> {
    pub(crate) fn new() -> Self {
        HandlerStore {
            resolve: None,
            reject: None,
            cancel: None,
            progress: None,
        }
    }

    pub(crate) fn push_resolve(&mut self, callback: ResolveFn<T>, target: Box<dyn Rejectable>) {
        self.resolve
            .get_or_insert_with(Vec::new)
            .push(ResolveHandler { callback, target });
    }

    pub(crate) fn push_reject(&mut self, callback: RejectFn, target: Box<dyn Rejectable>) {
        self.reject
            .get_or_insert_with(Vec::new)
            .push(RejectHandler { callback, target });
    }

    pub(crate) fn push_cancel(&mut self, callback: CancelFn, target: Box<dyn Rejectable>) {
        self.cancel
            .get_or_insert_with(Vec::new)
            .push(CancelHandler { callback, target });
    }

    pub(crate) fn push_progress(&mut self, callback: ProgressFn) {
        self.progress.get_or_insert_with(Vec::new).push(callback);
    }

    /// Take every queue, leaving the store empty. Progress handlers are
    /// dropped: a settled promise reports no further progress.
    pub(crate) fn take_terminal(&mut self) -> TerminalHandlers<T> {
        let taken = TerminalHandlers {
            resolve: self.resolve.take().unwrap_or_default(),
            reject: self.reject.take().unwrap_or_default(),
            cancel: self.cancel.take().unwrap_or_default(),
        };
        self.progress = None;
        taken
    }

    /// Take the progress queue for dispatch outside any borrow.
    pub(crate) fn take_progress(&mut self) -> Vec<ProgressFn> {
        self.progress.take().unwrap_or_default()
    }

    /// Put dispatched progress handlers back, ahead of any registered
    /// during dispatch, preserving registration order.
    pub(crate) fn restore_progress(&mut self, mut handlers: Vec<ProgressFn>) {
        if handlers.is_empty() {
            return;
        }
        if let Some(newer) = self.progress.take() {
            handlers.extend(newer);
        }
        self.progress = Some(handlers);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.resolve.as_ref().is_none_or(Vec::is_empty)
            && self.reject.as_ref().is_none_or(Vec::is_empty)
            && self.cancel.as_ref().is_none_or(Vec::is_empty)
            && self.progress.as_ref().is_none_or(Vec::is_empty)
    }
}
