//! End-to-end promise behavior through a real runtime

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pexec::{
    blocking, set_log_level, Downstream, ExecConfig, ExecError, ExecResult, ExecSpec, ExecutionBacking,
    LogLevel, Promise, Runtime, ThreadBinding, ThreadRole,
};

fn runtime() -> Runtime {
    set_log_level(LogLevel::Off);
    Runtime::new(ExecConfig::new().compute_threads(2).max_blocking_threads(8)).unwrap()
}

/// Run one execution to completion and return what reached its error channel
fn run<F>(rt: &Runtime, entry: F) -> Vec<ExecError>
where
    F: FnOnce() -> ExecResult<()> + Send + 'static,
{
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let spec = ExecSpec::new(entry).on_error(move |e| sink.lock().unwrap().push(e));
    rt.exec_spec(spec).unwrap().join().unwrap();

    let mut errors = errors.lock().unwrap();
    std::mem::take(&mut *errors)
}

fn recorder<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Fails with "boom" for the first `failures` connects, then yields 7
fn flaky(failures: usize, attempts: Arc<AtomicUsize>) -> Promise<u32> {
    Promise::of(move |downstream: Downstream<u32>| {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            downstream.error(ExecError::msg("boom"));
        } else {
            downstream.success(7);
        }
    })
}

fn counting(connects: Arc<AtomicUsize>) -> Promise<u32> {
    Promise::of(move |downstream: Downstream<u32>| {
        connects.fetch_add(1, Ordering::SeqCst);
        downstream.success(1);
    })
}

#[test]
fn then_invokes_continuation_once() {
    let rt = runtime();
    let seen = recorder();
    let out = Arc::clone(&seen);

    let errors = run(&rt, move || {
        Promise::value(42u32).then(move |v| {
            out.lock().unwrap().push(v);
            Ok(())
        })
    });

    assert!(errors.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![42]);
}

#[test]
fn failing_continuation_reports_exactly_one_error() {
    let rt = runtime();
    let errors = run(&rt, || Promise::value(42u32).then(|_| Err(ExecError::msg("bad"))));

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "bad");
}

#[test]
fn upstream_failure_reaches_error_channel() {
    let rt = runtime();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);

    let errors = run(&rt, move || {
        Promise::<u32>::error(ExecError::msg("upstream")).then(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    });

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "upstream");
}

#[test]
fn empty_promise_skips_continuation() {
    let rt = runtime();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);

    let errors = run(&rt, move || {
        Promise::<u32>::empty().then(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    });

    assert!(errors.is_empty());
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn dropped_downstream_surfaces_as_internal_error() {
    let rt = runtime();
    let errors = run(&rt, || Promise::of(|downstream: Downstream<u32>| drop(downstream)).then(|_| Ok(())));

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ExecError::Internal(_)));
}

#[test]
fn retry_succeeds_after_failures() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = recorder();
    let out = Arc::clone(&seen);
    let source = flaky(2, Arc::clone(&attempts));

    let errors = run(&rt, move || {
        source.retry(2).then(move |v| {
            out.lock().unwrap().push(v);
            Ok(())
        })
    });

    assert!(errors.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![7]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_exhausted_forwards_last_failure() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky(usize::MAX, Arc::clone(&attempts));

    let errors = run(&rt, move || source.retry(2).then(|_| Ok(())));

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "boom");
}

#[test]
fn retry_zero_is_one_attempt() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky(usize::MAX, Arc::clone(&attempts));

    let errors = run(&rt, move || source.retry(0).then(|_| Ok(())));

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(errors.len(), 1);
}

#[test]
fn retry_passes_usage_errors_through() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let source = Promise::of(move |downstream: Downstream<u32>| {
        counter.fetch_add(1, Ordering::SeqCst);
        downstream.error(ExecError::NoExecution);
    });

    let errors = run(&rt, move || source.retry(5).then(|_| Ok(())));

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(errors.as_slice(), [ExecError::NoExecution]));
}

#[test]
fn long_retry_runs_in_bounded_stack() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky(usize::MAX, Arc::clone(&attempts));

    // Every attempt fails synchronously; each retry must go through the
    // event loop rather than nest inside the previous attempt.
    let errors = run(&rt, move || source.retry(100_000).then(|_| Ok(())));

    assert_eq!(attempts.load(Ordering::SeqCst), 100_001);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "boom");
}

#[test]
fn retry_of_blocking_work_stays_sequential() {
    let rt = runtime();
    let attempts = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (a, f, o) = (Arc::clone(&attempts), Arc::clone(&in_flight), Arc::clone(&overlapped));

    let errors = run(&rt, move || {
        blocking(move || {
            if f.fetch_add(1, Ordering::SeqCst) != 0 {
                o.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(5));
            let n = a.fetch_add(1, Ordering::SeqCst);
            f.fetch_sub(1, Ordering::SeqCst);
            if n < 3 {
                Err(ExecError::msg("flaky"))
            } else {
                Ok(n)
            }
        })
        .retry(4)
        .then(|n| {
            assert_eq!(n, 3);
            Ok(())
        })
    });

    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn block_returns_value_error_or_empty() {
    let rt = runtime();
    let results = recorder();
    let out = Arc::clone(&results);

    let errors = run(&rt, move || {
        blocking(move || {
            let mut out = out.lock().unwrap();
            out.push(Promise::value(5u32).block());
            out.push(Promise::<u32>::error(ExecError::msg("boom")).block());
            out.push(Promise::<u32>::empty().block());
            Ok(())
        })
        .then(|()| Ok(()))
    });

    assert!(errors.is_empty());
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(*results[0].as_ref().unwrap(), Some(5));
    assert_eq!(results[1].as_ref().unwrap_err().to_string(), "boom");
    assert_eq!(*results[2].as_ref().unwrap(), None);
}

#[test]
fn block_waits_for_nested_blocking_work() {
    let rt = runtime();
    let seen = recorder();
    let out = Arc::clone(&seen);

    let errors = run(&rt, move || {
        blocking(|| {
            blocking(|| {
                thread::sleep(Duration::from_millis(10));
                Ok("inner")
            })
            .map(|s| Ok(s.len()))
            .block()
        })
        .then(move |len| {
            out.lock().unwrap().push(len);
            Ok(())
        })
    });

    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(*seen.lock().unwrap(), vec![Some(5)]);
}

#[test]
fn then_on_blocking_thread_fails_without_connecting() {
    let rt = runtime();
    let connects = Arc::new(AtomicUsize::new(0));
    let results = recorder();
    let (c, out) = (Arc::clone(&connects), Arc::clone(&results));

    let errors = run(&rt, move || {
        blocking(move || {
            out.lock().unwrap().push(counting(Arc::clone(&c)).then(|_| Ok(())));
            Ok(())
        })
        .then(|()| Ok(()))
    });

    assert!(errors.is_empty());
    assert_eq!(connects.load(Ordering::SeqCst), 0);
    let results = results.lock().unwrap();
    let err = results[0].as_ref().unwrap_err();
    assert!(matches!(
        err,
        ExecError::WrongThreadRole { required: ThreadRole::Compute, actual: ThreadRole::Blocking, .. }
    ));
}

#[test]
fn block_on_compute_thread_fails_without_connecting() {
    let rt = runtime();
    let connects = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&connects);

    let errors = run(&rt, move || counting(c).block().map(|_| ()));

    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        ExecError::WrongThreadRole { required: ThreadRole::Blocking, actual: ThreadRole::Compute, .. }
    ));
    assert!(errors[0].to_string().contains("use blocking()"));
}

#[test]
fn blocking_runs_on_blocking_thread_of_same_execution() {
    let rt = runtime();
    let seen = recorder();
    let out = Arc::clone(&seen);

    let errors = run(&rt, move || {
        let id = ExecutionBacking::require()?.id();
        blocking(move || {
            let backing = ExecutionBacking::require()?;
            Ok((ThreadBinding::role(), backing.id() == id))
        })
        .then(move |(role, same)| {
            out.lock().unwrap().push((role, same, ThreadBinding::role()));
            Ok(())
        })
    });

    assert!(errors.is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ThreadRole::Blocking, true, ThreadRole::Compute)]
    );
}

#[test]
fn blocking_panic_becomes_error() {
    let rt = runtime();
    let errors = run(&rt, || blocking(|| -> ExecResult<u32> { panic!("in the pool") }).then(|_| Ok(())));

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], ExecError::Panicked(m) if m == "in the pool"));
}

#[test]
fn panicking_connect_reports_one_error() {
    let rt = runtime();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);

    let errors = run(&rt, move || {
        Promise::of(|_downstream: Downstream<u32>| panic!("connect blew up")).then(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    });

    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(matches!(&errors[0], ExecError::Panicked(m) if m == "connect blew up"));
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn panicking_connect_fails_block() {
    let rt = runtime();
    let seen = recorder();
    let out = Arc::clone(&seen);

    let errors = run(&rt, move || {
        blocking(move || {
            let result = Promise::of(|_downstream: Downstream<u32>| panic!("connect blew up")).block();
            out.lock().unwrap().push(result);
            Ok(())
        })
        .then(|()| Ok(()))
    });

    assert!(errors.is_empty(), "{errors:?}");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(matches!(&seen[0], Err(ExecError::Panicked(m)) if m == "connect blew up"));
}

#[test]
fn jobs_run_in_fifo_order() {
    let rt = runtime();
    let order = recorder();
    let out = Arc::clone(&order);

    let errors = run(&rt, move || {
        let backing = ExecutionBacking::require()?;
        for i in 0..5 {
            let out = Arc::clone(&out);
            backing.enqueue(move || {
                out.lock().unwrap().push(i);
                Ok(())
            });
        }
        Ok(())
    });

    assert!(errors.is_empty());
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn continuations_of_one_execution_never_overlap() {
    let rt = runtime();
    let active = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicUsize::new(0));
    let (a, o, d) = (Arc::clone(&active), Arc::clone(&overlapped), Arc::clone(&done));

    let errors = run(&rt, move || {
        for i in 0..8u64 {
            let (a, o, d) = (Arc::clone(&a), Arc::clone(&o), Arc::clone(&d));
            blocking(move || {
                thread::sleep(Duration::from_millis(i % 3));
                Ok(i)
            })
            .then(move |_| {
                if a.swap(true, Ordering::SeqCst) {
                    o.store(true, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(1));
                a.store(false, Ordering::SeqCst);
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
        }
        Ok(())
    });

    assert!(errors.is_empty());
    assert_eq!(done.load(Ordering::SeqCst), 8);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn on_complete_fires_after_outstanding_work() {
    let rt = runtime();
    let events = recorder();
    let (value, complete) = (Arc::clone(&events), Arc::clone(&events));

    let spec = ExecSpec::new(move || {
        blocking(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(1u32)
        })
        .then(move |_| {
            value.lock().unwrap().push("value");
            Ok(())
        })
    })
    .on_complete(move || complete.lock().unwrap().push("complete"));

    rt.exec_spec(spec).unwrap().join().unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["value", "complete"]);
}

#[test]
fn stream_handle_event_keeps_execution_open() {
    let rt = runtime();
    let events = recorder();
    let out = Arc::clone(&events);

    let errors = run(&rt, move || {
        let backing = ExecutionBacking::require()?;
        let handle = backing.open_stream();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let first = Arc::clone(&out);
            handle.event(move || {
                first.lock().unwrap().push("event");
                Ok(())
            });
            handle.complete_with(move || {
                out.lock().unwrap().push("last");
                Ok(())
            });
        });
        Ok(())
    });

    assert!(errors.is_empty());
    assert_eq!(*events.lock().unwrap(), vec!["event", "last"]);
}

#[test]
fn executions_run_in_parallel() {
    let rt = runtime();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            rt.exec(|| {
                blocking(|| {
                    thread::sleep(Duration::from_millis(50));
                    Ok(())
                })
                .then(|()| Ok(()))
            })
            .unwrap()
        })
        .collect();

    let start = std::time::Instant::now();
    for handle in &handles {
        handle.join().unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(190));
}

#[test]
fn block_on_bridges_to_caller() {
    let rt = runtime();
    let value = rt
        .block_on(|| Ok(blocking(|| Ok(6u32)).map(|v| Ok(v * 7))))
        .unwrap();
    assert_eq!(value, Some(42));
}
