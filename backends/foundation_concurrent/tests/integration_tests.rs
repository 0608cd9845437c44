//! End to end behaviour of concurrent assertions.

use foundation_concurrent::{
    assert_concurrently, concurrently, AssertionFailure, CapturedFailure, ConfigError, Task,
    TimeUnit,
};
use ntest::timeout;
use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
#[timeout(10000)]
fn noop_tasks_pass_for_any_repetition_count() {
    for repetitions in [1, 10, 100, 1000] {
        concurrently![|| {}, || {}, || {}]
            .and_then(|assertions| assertions.repeated_calls(repetitions))
            .and_then(|assertions| assertions.timeout_after(5, TimeUnit::Seconds))
            .expect("valid configuration")
            .run()
            .expect("no-op tasks never fail");
    }
}

#[test]
fn non_positive_timeout_fails_before_anything_runs() {
    let calls = Arc::new(AtomicUsize::new(0));

    for amount in [0, -1, i64::MIN] {
        let counter = Arc::clone(&calls);
        let result = assert_concurrently([Task::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })])
        .and_then(|assertions| assertions.timeout_after(amount, TimeUnit::Milliseconds));

        let err = result.expect_err("non-positive timeout");
        assert_eq!(err, ConfigError::NonPositiveTimeout);
        assert_eq!(err.to_string(), "Timeout must have positive value");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_repetitions_are_rejected() {
    let err = concurrently![|| {}]
        .and_then(|assertions| assertions.repeated_calls(0))
        .expect_err("zero repetitions");
    assert_eq!(err.to_string(), "Repetitions must have positive value");
}

#[test]
#[timeout(10000)]
fn sleeping_task_reports_timeout_with_unit_name() {
    let failure = concurrently![|| thread::sleep(Duration::from_millis(200))]
        .and_then(|assertions| assertions.repeated_calls(1))
        .and_then(|assertions| assertions.timeout_after(1, TimeUnit::Milliseconds))
        .expect("valid configuration")
        .run()
        .expect_err("task sleeps past the timeout");

    assert!(failure.is_timeout());
    assert!(failure.consolidated().is_none());
    assert_eq!(failure.to_string(), "Timeout after 1 milliseconds");
}

#[test]
#[should_panic(expected = "Timeout after 2 milliseconds")]
fn should_not_panic_raises_timeouts() {
    concurrently![|| thread::sleep(Duration::from_millis(100))]
        .and_then(|assertions| assertions.repeated_calls(1))
        .and_then(|assertions| assertions.timeout_after(2, TimeUnit::Milliseconds))
        .expect("valid configuration")
        .should_not_panic();
}

#[test]
#[timeout(10000)]
fn cause_is_one_of_the_captured_failures() {
    let failure = concurrently![
        fallible: || Err(io::Error::other("left")),
        || Err(io::Error::other("right")),
    ]
    .and_then(|assertions| assertions.repeated_calls(20))
    .and_then(|assertions| assertions.timeout_after(5, TimeUnit::Seconds))
    .expect("valid configuration")
    .run()
    .expect_err("every task fails");

    let report = failure.consolidated().expect("task failures reported");
    assert_eq!(report.len(), 40);

    let cause = failure
        .source()
        .and_then(|source| source.downcast_ref::<CapturedFailure>())
        .expect("first captured failure attached as source");
    assert!(report
        .failures()
        .iter()
        .any(|captured| std::ptr::eq(captured.as_ref(), cause)));

    let rendered: Vec<String> = report.failures().iter().map(ToString::to_string).collect();
    assert_eq!(
        failure.to_string(),
        format!(
            "Test failed with the following exception(s): {}",
            rendered.join(", ")
        )
    );
}

#[test]
#[timeout(10000)]
fn failing_tasks_do_not_disturb_their_siblings() {
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);

    let failure = assert_concurrently([
        Task::new(|| panic!("one bad task")),
        Task::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    ])
    .and_then(|assertions| assertions.repeated_calls(50))
    .and_then(|assertions| assertions.threads(2))
    .and_then(|assertions| assertions.timeout_after(5, TimeUnit::Seconds))
    .expect("valid configuration")
    .run()
    .expect_err("one task always panics");

    assert_eq!(successes.load(Ordering::SeqCst), 50);
    let report = failure.consolidated().expect("task failures reported");
    assert_eq!(report.len(), 50);
    assert!(report.failures().iter().all(|captured| captured.task() == 0));
}

#[test]
#[timeout(10000)]
fn workers_start_together_once_released() {
    // Passes only if all four tasks are inside their body at the same time.
    let rendezvous = Arc::new(Barrier::new(4));
    let tasks = (0..4).map(|_| {
        let rendezvous = Arc::clone(&rendezvous);
        Task::new(move || {
            rendezvous.wait();
        })
    });

    assert_concurrently(tasks)
        .and_then(|assertions| assertions.repeated_calls(1))
        .and_then(|assertions| assertions.threads(4))
        .and_then(|assertions| assertions.timeout_after(5, TimeUnit::Seconds))
        .expect("valid configuration")
        .should_not_panic();
}

#[test]
#[timeout(10000)]
fn cancellation_stops_the_wait() {
    let assertions = concurrently![|| thread::sleep(Duration::from_millis(300))]
        .and_then(|assertions| assertions.repeated_calls(1))
        .and_then(|assertions| assertions.timeout_after(30, TimeUnit::Seconds))
        .expect("valid configuration");

    let handle = assertions.cancellation();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.cancel();
    });

    let started = Instant::now();
    let failure = assertions.run().expect_err("run cancelled");
    canceller.join().unwrap();

    assert!(matches!(failure, AssertionFailure::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
#[timeout(10000)]
fn completed_runs_ignore_late_cancellation() {
    let assertions = concurrently![|| {}]
        .and_then(|assertions| assertions.repeated_calls(5))
        .expect("valid configuration");
    let handle = assertions.cancellation();

    assertions.run().expect("no-op tasks pass");
    handle.cancel();
    assert!(handle.is_cancelled());
}
