use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use foundation_concurrent::{assert_concurrently, Task, TimeUnit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Benchmark a full run of no-op tasks: pool start, gate release, teardown.
fn bench_noop_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_run");

    for repetitions in [1_usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(repetitions),
            &repetitions,
            |b, &repetitions| {
                b.iter(|| {
                    assert_concurrently([Task::new(|| {}), Task::new(|| {})])
                        .and_then(|assertions| assertions.repeated_calls(black_box(repetitions)))
                        .and_then(|assertions| assertions.timeout_after(10, TimeUnit::Seconds))
                        .expect("valid configuration")
                        .should_not_panic();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark contended atomic increments released through the start gate.
fn bench_contended_counter(c: &mut Criterion) {
    c.bench_function("contended_counter_100_repetitions", |b| {
        let counter = Arc::new(AtomicUsize::new(0));

        b.iter(|| {
            let tasks = (0..4).map(|_| {
                let counter = Arc::clone(&counter);
                Task::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            });

            assert_concurrently(tasks)
                .and_then(|assertions| assertions.repeated_calls(100))
                .and_then(|assertions| assertions.timeout_after(10, TimeUnit::Seconds))
                .expect("valid configuration")
                .should_not_panic();
        });

        black_box(counter.load(Ordering::Relaxed));
    });
}

criterion_group!(benches, bench_noop_runs, bench_contended_counter);
criterion_main!(benches);
