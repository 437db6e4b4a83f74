//! Promise identity and lifecycle state.
//!
//! Every promise carries an id drawn from a process-wide monotonic counter
//! and a four-state lifecycle with a single non-terminal state. Terminal
//! states never change once entered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique promise identifier, monotonically increasing per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromiseId(u64);

impl PromiseId {
    /// Draw the next id from the global counter.
    ///
    /// The counter is atomic so ids stay unique even when promises are
    /// created on several threads, although a promise itself must stay on
    /// the thread that created it.
    pub(crate) fn next() -> Self {
        PromiseId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a promise.
///
/// `Pending` is the only source state; `Resolved`, `Rejected` and
/// `Cancelled` are terminal and mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseState {
    /// Awaiting an outcome from its producer.
    Pending,
    /// Completed with a value.
    Resolved,
    /// Completed with an error.
    Rejected,
    /// Cancelled before completion.
    Cancelled,
}

impl PromiseState {
    /// True while the promise can still transition.
    pub fn is_pending(self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    /// True once a terminal transition has occurred.
    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PromiseState::Pending => "pending",
            PromiseState::Resolved => "resolved",
            PromiseState::Rejected => "rejected",
            PromiseState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_monotonic() {
        let a = PromiseId::next();
        let b = PromiseId::next();
        let c = PromiseId::next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_state_predicates() {
        assert!(PromiseState::Pending.is_pending());
        assert!(!PromiseState::Pending.is_terminal());
        for s in [
            PromiseState::Resolved,
            PromiseState::Rejected,
            PromiseState::Cancelled,
        ] {
            assert!(s.is_terminal());
            assert!(!s.is_pending());
        }
    }
}
