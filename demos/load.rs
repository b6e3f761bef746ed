use std::time::{Duration, Instant};
use tracing::error;

use tracing_live_logs::{CaptureConfig, Controller};

fn main() {
    let path = std::env::temp_dir().join("tracing-live-logs-load.log");

    let controller = Controller::new();
    let config = CaptureConfig::new(&path)
        .queue_capacity(50_000)
        .max_drain(Duration::from_secs(60));
    let handle = match controller.start(config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "load test error");
    }

    let elapsed = start.elapsed();
    println!("submitted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let drain_start = Instant::now();
    handle.stop();
    let stats = handle.stats();
    println!("drained in {:?}: {} written, {} dropped -> {}",
        drain_start.elapsed(),
        stats.written,
        stats.dropped,
        path.display()
    );
}
