//! End-to-end chain behavior across combinators.

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::recording::RecordingReceiver;
use crate::{pending_promises, set_promise_tracking, Promise, PromiseState, Rejection};

#[test]
fn test_basic_chain_transforms_in_order() {
    let p = Promise::<i32>::new();
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    p.then_map(|x| Ok(x + 1))
        .then_map(|x| Ok(x * 2))
        .done_with(move |v| {
            *seen_in.borrow_mut() = Some(v);
            Ok(())
        });
    p.resolve(3);
    assert_eq!(*seen.borrow(), Some(8));
}

#[test]
fn test_rejection_recovery_chain() {
    let recorder = RecordingReceiver::install();
    let p = Promise::<i32>::new();
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    p.catch_map(|_err| Ok(-1)).done_with(move |v| {
        *seen_in.borrow_mut() = Some(v);
        Ok(())
    });
    p.reject(Rejection::from_message("x"));
    assert_eq!(*seen.borrow(), Some(-1));
    // Exactly one sink exception: the producer-side reject itself.
    assert_eq!(recorder.exceptions(), vec!["x".to_string()]);
}

#[test]
fn test_all_with_progress_end_to_end() {
    let a = Promise::<String>::new();
    let b = Promise::<String>::new();
    let r = Promise::all([a.clone(), b.clone()]);
    let reports = Rc::new(RefCell::new(Vec::new()));
    let reports_in = reports.clone();
    r.progress(move |amount| reports_in.borrow_mut().push(amount));

    a.report_progress(0.5);
    assert_eq!(reports.borrow().clone(), vec![0.25]);
    b.report_progress(1.0);
    assert_eq!(reports.borrow().clone(), vec![0.25, 0.75]);
    a.resolve("x".into());
    b.resolve("y".into());
    assert_eq!(r.value(), Some(vec!["x".to_string(), "y".to_string()]));
}

#[test]
fn test_race_first_wins_end_to_end() {
    let a = Promise::<i32>::new();
    let b = Promise::<i32>::new();
    let r = Promise::race([a.clone(), b.clone()]);
    let fired = Rc::new(RefCell::new(Vec::new()));
    let fired_in = fired.clone();
    r.done_with(move |v| {
        fired_in.borrow_mut().push(v);
        Ok(())
    });

    b.resolve(2);
    a.resolve(1);
    assert_eq!(fired.borrow().clone(), vec![2]);
    assert_eq!(r.value(), Some(2));
}

#[test]
fn test_finally_ordering_after_then() {
    let p = Promise::<i32>::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let t = calls.clone();
    let f = calls.clone();
    p.then_do(move |_| {
        t.borrow_mut().push("t");
        Ok(())
    })
    .finally(move || {
        f.borrow_mut().push("f");
        Ok(())
    });
    p.resolve(1);
    assert_eq!(calls.borrow().clone(), vec!["t", "f"]);
}

#[test]
fn test_finally_runs_without_then_on_rejection() {
    let p = Promise::<i32>::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let t = calls.clone();
    let f = calls.clone();
    p.then_do(move |_| {
        t.borrow_mut().push("t");
        Ok(())
    })
    .finally(move || {
        f.borrow_mut().push("f");
        Ok(())
    });
    p.reject_silent(Rejection::from_message("e"));
    assert_eq!(calls.borrow().clone(), vec!["f"]);
}

#[test]
fn test_law_resolved_then_equals_applying_f() {
    let direct = Promise::resolved(21).then(|v| Ok(Promise::resolved(v * 2)));
    assert_eq!(direct.value(), Some(42));
}

#[test]
fn test_law_rejected_catch_map_equals_resolved_mapping() {
    let mapped = Promise::<i32>::rejected(Rejection::from_message("e")).catch_map(|err| {
        assert_eq!(err.to_string(), "e");
        Ok(5)
    });
    assert_eq!(mapped.value(), Some(5));
}

#[test]
fn test_law_all_of_single_resolved() {
    let r = Promise::all([Promise::resolved(9)]);
    assert_eq!(r.value(), Some(vec![9]));
}

#[test]
fn test_late_handler_runs_synchronously() {
    let p = Promise::<i32>::new();
    p.resolve(4);
    let seen = Rc::new(RefCell::new(None));
    let seen_in = seen.clone();
    p.then_do(move |v| {
        *seen_in.borrow_mut() = Some(v);
        Ok(())
    });
    assert_eq!(*seen.borrow(), Some(4));
}

#[test]
fn test_then_all_and_then_race_chain() {
    let p = Promise::<i32>::new();
    let summed = p
        .then_all(|n| Ok(vec![Promise::resolved(n), Promise::resolved(n + 1)]))
        .then_map(|values| Ok(values.into_iter().sum::<i32>()));
    let raced = p.then_race(|n| Ok(vec![Promise::resolved(n * 10), Promise::<i32>::new()]));
    p.resolve(1);
    assert_eq!(summed.value(), Some(3));
    assert_eq!(raced.value(), Some(10));
}

#[test]
fn test_continue_with_runs_after_any_outcome() {
    let p = Promise::<i32>::new();
    let followed = p.continue_with(|| Ok(Promise::resolved("after")));
    p.cancel();
    assert_eq!(followed.value(), Some("after"));
}

#[test]
fn test_tracking_sees_unsettled_promises() {
    set_promise_tracking(true);
    let leaked = Promise::<i32>::named("Leaky");
    let settled = Promise::<i32>::named("Settled");
    settled.resolve(1);
    set_promise_tracking(false);

    let pending = pending_promises();
    assert!(pending.contains(&(leaked.id(), Some("Leaky".to_string()))));
    assert!(!pending.iter().any(|(id, _)| *id == settled.id()));
    leaked.cancel();
    assert!(!pending_promises().iter().any(|(id, _)| *id == leaked.id()));
}

#[test]
fn test_unhandled_rejection_reaches_sink_with_label() {
    let recorder = RecordingReceiver::install();
    let p = Promise::<i32>::named("Pipeline");
    p.then_map(|v| Ok(v + 1)).done();
    p.reject_silent(Rejection::from_message("lost downstream"));
    let exceptions = recorder.exceptions();
    // One from the forwarding reject, one from the unhandled propagation.
    assert!(exceptions.iter().any(|e| e.contains("unhandled rejection")));
    assert!(exceptions.iter().any(|e| e.contains("lost downstream")));
}

#[test]
fn test_progress_not_clamped() {
    let p = Promise::<i32>::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    p.progress(move |amount| seen_in.borrow_mut().push(amount));
    p.report_progress(1.5);
    p.report_progress(-0.25);
    assert_eq!(seen.borrow().clone(), vec![1.5, -0.25]);
}

#[test]
fn test_state_invariants_value_and_error_exclusive() {
    let resolved = Promise::resolved(1);
    assert!(resolved.value().is_some());
    assert!(resolved.error().is_none());

    let rejected = Promise::<i32>::rejected(Rejection::from_message("e"));
    assert!(rejected.value().is_none());
    assert!(rejected.error().is_some());

    let cancelled = Promise::<i32>::canceled();
    assert!(cancelled.value().is_none());
    assert!(cancelled.error().is_none());
    assert_eq!(cancelled.state(), PromiseState::Cancelled);
}
