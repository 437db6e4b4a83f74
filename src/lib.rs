//! Single-threaded promise library: one-shot asynchronous outcomes with a
//! composable algebra over them.
//!
//! A [`Promise`] settles exactly once as resolved, rejected or cancelled.
//! Combinators derive new promises from existing ones and record the
//! parent/child chain between them, which is what lets [`Promise::cancel`]
//! sweep the pending prefix of a lineage. Progress reports flow through
//! the same handlers, diagnostics flow through a pluggable
//! [`EventsReceiver`] sink, and unsettled promises can be tracked down
//! with [`pending_promises`]. Everything is cooperative and
//! single-threaded: producers settle promises synchronously from wherever
//! their callbacks run, and handlers fire before the settling call
//! returns.

// Declare internal modules
mod combinators;
mod convert;
mod core;
mod errors;
mod events;
mod graph;
mod handlers;
mod promise;
mod state;
mod void;

#[cfg(test)]
mod tests;

// Re-export public items
pub use combinators::PromiseThunk;
pub use convert::from_cancellation_token;
pub use errors::{PromiseError, Rejection};
pub use events::{
    pending_promises, set_events_receiver, set_promise_tracking, EventsReceiver, TracingReceiver,
};
pub use graph::{Cancelable, Rejectable, WeakCancelable};
pub use promise::Promise;
pub use state::{PromiseId, PromiseState};
pub use void::PromiseVoid;
