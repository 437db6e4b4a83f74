//! Chain graph: parent/child edges and cancellation walks.
//!
//! Combinators record where a result promise came from. The parent holds
//! its children strongly; each child keeps a weak back-reference to its
//! parent, so completed subtrees are not retained by the chain alone. The
//! edges exist for exactly one purpose: deciding which promises a
//! `cancel()` call reaches.

use std::collections::HashSet;

use crate::errors::Rejection;
use crate::events;
use crate::state::{PromiseId, PromiseState};

/// Anything that can receive a rejection, loudly or silently.
///
/// Every result promise is one; handler faults are delivered to the
/// rejectable paired with the handler at registration time.
pub trait Rejectable {
    /// Reject, reporting the error through the diagnostic sink first.
    fn reject(&self, err: Rejection);
    /// Reject without notifying the sink, for errors it has already seen.
    fn reject_silent(&self, err: Rejection);
    /// Clone this rejectable as a boxed handle.
    fn clone_rejectable(&self) -> Box<dyn Rejectable>;
}

/// A participant in the chain graph that can be cancelled.
pub trait Cancelable {
    /// Unique id of this promise.
    fn id(&self) -> PromiseId;
    /// Diagnostic name, when one was given.
    fn name(&self) -> Option<String>;
    /// Current lifecycle state.
    fn state(&self) -> PromiseState;
    /// The recorded upstream promise, if it is still alive.
    fn parent(&self) -> Option<Box<dyn Cancelable>>;
    /// The recorded downstream promises.
    fn children(&self) -> Vec<Box<dyn Cancelable>>;
    /// Record `parent` as this promise's upstream, registering the edge in
    /// both directions. Cycle attempts are refused with a minor warning;
    /// reattachment warns and the most recent parent wins.
    fn attach_parent(&self, parent: &dyn Cancelable);
    /// Cancel the pending prefix of this promise's lineage, topmost first.
    fn cancel(&self);
    /// Cancel only this promise; no-op unless pending.
    fn cancel_self(&self);
    /// Cancel this promise and every transitively pending descendant.
    fn cancel_self_and_children(&self);
    /// Clone this node as a boxed handle.
    fn clone_node(&self) -> Box<dyn Cancelable>;
    /// Downgrade to a weak handle for parent back-references.
    fn downgrade(&self) -> Box<dyn WeakCancelable>;
    /// Edge bookkeeping: add a child, ignoring duplicates by id.
    fn adopt(&self, child: Box<dyn Cancelable>);
    /// Edge bookkeeping: drop the child with the given id.
    fn disown(&self, child: PromiseId);
    /// Edge bookkeeping: overwrite the parent back-reference.
    fn set_parent_link(&self, parent: Option<Box<dyn WeakCancelable>>);
}

/// Weak counterpart of a [`Cancelable`] handle.
pub trait WeakCancelable {
    /// Recover a strong handle if the promise is still alive.
    fn upgrade(&self) -> Option<Box<dyn Cancelable>>;
}

/// Record a parent edge, enforcing the graph invariants.
pub(crate) fn link_parent(child: &dyn Cancelable, parent: &dyn Cancelable) {
    if parent.id() == child.id()
        || parent.parent().is_some_and(|gp| gp.id() == child.id())
    {
        events::receiver().on_warning_minor(&format!(
            "promise {} refused as its own ancestor",
            child.id()
        ));
        return;
    }
    if let Some(previous) = child.parent() {
        events::receiver().on_warning(&format!(
            "promise {} reattached from parent {} to parent {}",
            child.id(),
            previous.id(),
            parent.id()
        ));
        previous.disown(child.id());
    }
    child.set_parent_link(Some(parent.downgrade()));
    parent.adopt(child.clone_node());
}

/// Cancel the pending prefix of a lineage.
///
/// Walks from `leaf` to the root, finds the topmost still-pending
/// ancestor, and applies `cancel_self` from that ancestor down to `leaf`
/// inclusive. Already-settled promises along the way are left alone.
pub(crate) fn cancel_upward(leaf: Box<dyn Cancelable>) {
    let mut chain: Vec<Box<dyn Cancelable>> = Vec::new();
    let mut seen: HashSet<PromiseId> = HashSet::new();
    seen.insert(leaf.id());
    chain.push(leaf);
    while let Some(parent) = chain.last().and_then(|node| node.parent()) {
        if !seen.insert(parent.id()) {
            break;
        }
        chain.push(parent);
    }
    let Some(top) = chain.iter().rposition(|node| node.state().is_pending()) else {
        return;
    };
    for node in chain[..=top].iter().rev() {
        node.cancel_self();
    }
}

/// Cancel `root` plus every transitively pending descendant.
///
/// Settled descendants are skipped and their subtrees pruned. The set is
/// collected before the first `cancel_self`, so handlers that mutate the
/// graph mid-cancellation cannot extend the sweep.
pub(crate) fn cancel_subtree(root: Box<dyn Cancelable>) {
    let mut pending: Vec<Box<dyn Cancelable>> = Vec::new();
    let mut stack = vec![root];
    let mut seen: HashSet<PromiseId> = HashSet::new();
    while let Some(node) = stack.pop() {
        if !node.state().is_pending() || !seen.insert(node.id()) {
            continue;
        }
        stack.extend(node.children());
        pending.push(node);
    }
    for node in &pending {
        node.cancel_self();
    }
}
