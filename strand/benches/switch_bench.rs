//! Benchmarks for context switching.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::rc::Rc;
use strand::prelude::*;

fn echo_loop(fiber: &Fiber<'_>, mut value: Value) -> Outcome {
    loop {
        value = fiber.switch_to_parent(value)?;
    }
}

fn switch_benchmark(c: &mut Criterion) {
    c.bench_function("switch_round_trip", |b| {
        let engine = Engine::new();
        let echo = engine.spawn(echo_loop);
        b.iter(|| engine.switch(echo, black_box(json!(1))));
    });

    c.bench_function("switch_round_trip_traced", |b| {
        let engine = Engine::new();
        engine.set_trace(Some(Rc::new(LoggingObserver::default()) as Rc<dyn TraceObserver>));
        let echo = engine.spawn(echo_loop);
        b.iter(|| engine.switch(echo, black_box(json!(1))));
    });

    c.bench_function("switch_round_trip_profiled", |b| {
        let engine = Engine::new();
        engine.set_profile_sink(Some(Rc::new(LoggingProfileSink::default()) as Rc<dyn ProfileSink>));
        let _outer = engine.enter_frame("outer");
        let echo = engine.spawn(echo_loop);
        b.iter(|| engine.switch(echo, black_box(json!(1))));
    });

    c.bench_function("spawn_and_finish", |b| {
        let engine = Engine::new();
        b.iter(|| {
            let context = engine.spawn(|_, value| Ok(value));
            engine.switch(context, black_box(Value::Null))
        });
    });
}

criterion_group!(benches, switch_benchmark);
criterion_main!(benches);
