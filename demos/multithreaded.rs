use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use tracing_live_logs::init::start_logging_with;
use tracing_live_logs::{eprintln_captured, fields, println_captured, Severity};

/// Several threads write through `tracing`, the captured stdout/stderr
/// slots and manual calls at the same time.
///
/// Run with `LIVE_LOGS_FILE_PATH=multithreaded.log cargo run --example multithreaded`.
fn worker_task(worker_id: usize, iterations: usize) {
    for i in 0..iterations {
        println_captured!("[Worker {}] Print message #{}", worker_id, i + 1);
        eprintln_captured!("[Worker {}] Stderr message #{}", worker_id, i + 1);

        info!(worker_id, "Worker {} - Info log #{}", worker_id, i + 1);
        warn!(worker_id, "Worker {} - Warning log #{}", worker_id, i + 1);
        if i % 3 == 0 {
            error!(worker_id, "Worker {} - Error log #{}", worker_id, i + 1);
        }

        thread::sleep(Duration::from_millis(10));
    }
    info!(worker_id, "Worker {} completed all iterations", worker_id);
}

fn main() {
    let handle = match start_logging_with(|config| {
        config
            .capture_streams(true)
            .echo_to_console(true)
            .queue_capacity(5_000)
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let threads: Vec<_> = (0..10)
        .map(|i| {
            thread::Builder::new()
                .name(format!("Worker-{}", i))
                .spawn(move || worker_task(i, 50))
                .expect("spawn worker")
        })
        .collect();
    for thread in threads {
        thread.join().expect("worker panicked");
    }

    handle.log(Severity::Info, "all workers finished", fields! { "workers" => 10 });
    handle.stop();

    let stats = handle.stats();
    println!(
        "wrote {} records to {} ({} dropped)",
        stats.written,
        handle.target_path().display(),
        stats.dropped
    );
}
