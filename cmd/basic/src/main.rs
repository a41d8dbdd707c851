//! Basic pexec example
//!
//! Starts a few executions that each do blocking work, retry a flaky
//! step, and chain the results on their compute thread.
//!
//! # Environment Variables
//!
//! - `PEXEC_FLUSH_EPRINT=1` - Flush log output immediately
//! - `PEXEC_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `PEXEC_COMPUTE_THREADS=N` - Number of compute threads

use pexec::{blocking, kdebug, kinfo, kwarn, ExecConfig, ExecError, ExecResult, ExecSpec, Promise, Runtime};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// PEXEC_LOG_LEVEL=debug PEXEC_FLUSH_EPRINT=1 cargo run -p pexec-basic
fn main() -> ExecResult<()> {
    println!("=== pexec Basic Example ===\n");

    let config = ExecConfig::from_env().compute_threads(2);
    let runtime = Runtime::new(config)?;

    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for i in 1..=3u64 {
        let attempts = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&completed);

        let spec = ExecSpec::new(move || {
            kdebug!("[request {}] started", i);

            let lookup = blocking(move || {
                std::thread::sleep(Duration::from_millis(10 * i));
                Ok(i * 100)
            });

            // Fails on the first attempt, succeeds on the second.
            let flaky = Promise::from_fn(move || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExecError::msg("transient failure"))
                } else {
                    Ok(i)
                }
            })
            .retry(1);

            lookup.then(move |base| {
                flaky.map(move |bonus| Ok(base + bonus)).then(move |total| {
                    kinfo!("[request {}] total = {}", i, total);
                    Ok(())
                })
            })
        })
        .on_error(move |e| kwarn!("[request {}] failed: {}", i, e))
        .on_complete(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let handle = runtime.exec_spec(spec)?;
        println!("Started execution {}", handle.id());
        handles.push(handle);
    }

    // Blocking bridge: wait on a compute-side promise from a blocking thread.
    let bridged = runtime.block_on(|| {
        Ok(blocking(|| Promise::value(21u32).map(|v| Ok(v * 2)).block()))
    })?;
    println!("Bridged value: {:?}", bridged.flatten());

    for handle in &handles {
        handle.join()?;
    }
    println!("\n{} execution(s) completed", completed.load(Ordering::SeqCst));

    runtime.shutdown();
    println!("\n=== Example Complete ===");
    Ok(())
}
