use promise_chain::{
    pending_promises, set_promise_tracking, Promise, PromiseVoid, Rejection,
};

fn main() {
    tracing_subscriber::fmt().init();
    set_promise_tracking(true);

    // A producer-driven download pipeline: parse, then fan out.
    let download = Promise::<Vec<u8>>::named("download");
    download
        .progress(|amount| println!("download {:3.0}%", amount * 100.0))
        .then_map(|bytes| Ok(String::from_utf8(bytes)?))
        .then_all(|text| {
            Ok(text
                .split_whitespace()
                .map(|word| Promise::resolved(word.len()))
                .collect())
        })
        .done_with(|lengths| {
            println!("word lengths: {lengths:?}");
            Ok(())
        });

    download.report_progress(0.4);
    download.report_progress(1.0);
    download.resolve(b"promises all the way down".to_vec());

    // Recovery: a failing fetch falls back to a default.
    let fetch = Promise::<String>::named("fetch");
    fetch
        .catch_map(|err| {
            println!("fetch failed ({err}), using fallback");
            Ok("fallback".to_string())
        })
        .done_with(|body| {
            println!("body: {body}");
            Ok(())
        });
    fetch.reject(Rejection::from_message("connection reset"));

    // Cancellation sweeps the pending prefix of the lineage.
    let job = Promise::<u32>::named("job");
    let step = job.then_map(|n| Ok(n * 2));
    step.finally(|| {
        println!("job finished one way or another");
        Ok(())
    });
    step.cancel();

    // Sequencing void steps.
    let chores = PromiseVoid::sequence(vec![
        Box::new(|| {
            println!("step one");
            Ok(Promise::resolved(()))
        }),
        Box::new(|| {
            println!("step two");
            Ok(Promise::resolved(()))
        }),
    ]);
    chores.done();

    let leaked = Promise::<u32>::named("forgotten");
    for (id, name) in pending_promises() {
        println!("still pending: {id} {:?}", name);
    }
    leaked.cancel();
}
