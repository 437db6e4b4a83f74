//! Error handling for promise chains.
//!
//! Two kinds of error live here. `PromiseError` enumerates the faults the
//! library itself raises: illegal state transitions, degenerate combinator
//! input, and the wrapper attached to unhandled rejections. `Rejection` is
//! the payload carried by a rejected promise: a cheaply clonable handle to
//! any error value, shared by every reject handler downstream of it.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::state::PromiseState;

/// Errors raised by the library itself.
#[derive(Error, Debug)]
pub enum PromiseError {
    /// A producer attempted a transition on a promise that is no longer
    /// pending. The transition is suppressed and reported through the sink.
    #[error("cannot {op} promise {promise}: state is {state}")]
    IllegalTransition {
        /// Which operation was attempted.
        op: &'static str,
        /// Label of the offending promise (id, plus name when present).
        promise: String,
        /// The state observed at the time of the attempt.
        state: PromiseState,
    },

    /// `race` was invoked with no input promises, so no outcome can ever
    /// arrive.
    #[error("cannot race an empty set of promises")]
    EmptyRace,

    /// `first` was invoked with no candidate thunks.
    #[error("cannot select the first of zero promise candidates")]
    EmptyFirst,

    /// A rejection reached the end of a chain terminated by `done` without
    /// any handler claiming it.
    #[error("unhandled rejection in promise {promise}: {cause}")]
    Unhandled {
        /// Label of the promise the chain was terminated on.
        promise: String,
        /// The rejection that went unobserved.
        cause: Rejection,
    },
}

/// The error payload carried by a rejected promise.
///
/// Every reject handler of a promise observes the same rejection, so the
/// inner error is reference-counted rather than moved. Construct one from
/// any `std::error::Error` via `From`, or from a bare message.
#[derive(Clone, Debug)]
pub struct Rejection(Rc<dyn StdError + 'static>);

impl Rejection {
    /// Wrap an error value.
    pub fn new<E: StdError + 'static>(err: E) -> Self {
        Rejection(Rc::new(err))
    }

    /// Build a rejection from a plain message.
    pub fn from_message(msg: impl Into<String>) -> Self {
        Rejection(Rc::new(Message(msg.into())))
    }

    /// Borrow the wrapped error.
    pub fn inner(&self) -> &(dyn StdError + 'static) {
        &*self.0
    }

    /// Downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// Deliberately not an `std::error::Error` itself: that keeps the blanket
// conversion below coherent, so `?` lifts any error into a rejection
// inside promise callbacks.
impl<E: StdError + 'static> From<E> for Rejection {
    fn from(err: E) -> Self {
        Rejection::new(err)
    }
}

/// Message-only error used by `Rejection::from_message`.
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}
