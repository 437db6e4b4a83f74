//! Property tests over the state machine invariants.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use proptest::prelude::*;

use crate::{Cancelable, Promise, PromiseState, Rejection};

#[derive(Debug, Clone)]
enum Op {
    Resolve(u8),
    Reject,
    Cancel,
    Progress,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::Resolve),
        Just(Op::Reject),
        Just(Op::Cancel),
        Just(Op::Progress),
    ]
}

fn expected_state(ops: &[Op]) -> PromiseState {
    for op in ops {
        match op {
            Op::Resolve(_) => return PromiseState::Resolved,
            Op::Reject => return PromiseState::Rejected,
            Op::Cancel => return PromiseState::Cancelled,
            Op::Progress => {}
        }
    }
    PromiseState::Pending
}

proptest! {
    #[test]
    fn prop_ids_unique_and_increasing(count in 1usize..64) {
        let ids: Vec<_> = (0..count).map(|_| Promise::<u8>::new().id()).collect();
        let distinct: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(distinct.len(), ids.len());
        prop_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn prop_at_most_one_terminal_transition(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let p = Promise::<u8>::new();
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        let resolved = outcomes.clone();
        let rejected = outcomes.clone();
        let cancelled = outcomes.clone();
        p.then_do_or(
            move |_| {
                resolved.borrow_mut().push("resolve");
                Ok(())
            },
            move |_| {
                rejected.borrow_mut().push("reject");
                Ok(())
            },
        );
        p.on_cancel(move || {
            cancelled.borrow_mut().push("cancel");
            Ok(())
        });

        for op in &ops {
            match op {
                Op::Resolve(v) => p.resolve(*v),
                Op::Reject => p.reject_silent(Rejection::from_message("op")),
                Op::Cancel => p.cancel(),
                Op::Progress => p.report_progress(0.5),
            }
        }

        prop_assert!(outcomes.borrow().len() <= 1);
        prop_assert_eq!(p.state(), expected_state(&ops));
        // Value and error presence track the final state exactly.
        prop_assert_eq!(p.value().is_some(), p.state() == PromiseState::Resolved);
        prop_assert_eq!(p.error().is_some(), p.state() == PromiseState::Rejected);
    }

    #[test]
    fn prop_late_handlers_fire_synchronously(value in any::<u8>()) {
        let p = Promise::<u8>::new();
        p.resolve(value);
        let seen = Rc::new(RefCell::new(None));
        let seen_in = seen.clone();
        p.then_do(move |v| {
            *seen_in.borrow_mut() = Some(v);
            Ok(())
        });
        prop_assert_eq!(*seen.borrow(), Some(value));
    }

    #[test]
    fn prop_chain_edges_are_bidirectional(depth in 1usize..8) {
        let root = Promise::<u8>::new();
        let mut tip = root.then_map(|v| Ok(v));
        for _ in 1..depth {
            tip = tip.then_map(|v| Ok(v));
        }
        // Walk back up: every parent must list the child it came from,
        // and the walk must terminate at the root.
        let mut node: Box<dyn Cancelable> = Box::new(tip.clone());
        while let Some(parent) = node.parent() {
            prop_assert!(parent.children().iter().any(|c| c.id() == node.id()));
            node = parent;
        }
        prop_assert_eq!(node.id(), root.id());
    }
}
