mod common;

use common::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tracing_live_logs::stream::{self, SharedWriter, StdStream};
use tracing_live_logs::{println_captured, eprintln_captured, Controller};

// Stream slots are process-wide; tests in this binary run one at a time.
static SERIAL: Mutex<()> = parking_lot::const_mutex(());

fn same(a: &SharedWriter, b: &SharedWriter) -> bool {
    Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}

/// Point both slots at in-memory buffers; returns the buffers and the
/// writers that were installed before.
fn buffers() -> (Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>, SharedWriter, SharedWriter) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let err = Arc::new(Mutex::new(Vec::new()));
    let out_writer: SharedWriter = out.clone();
    let err_writer: SharedWriter = err.clone();
    let prev_out = stream::redirect(StdStream::Stdout, out_writer);
    let prev_err = stream::redirect(StdStream::Stderr, err_writer);
    (out, err, prev_out, prev_err)
}

fn reset(prev_out: SharedWriter, prev_err: SharedWriter) {
    stream::redirect(StdStream::Stdout, prev_out);
    stream::redirect(StdStream::Stderr, prev_err);
}

#[test]
fn stdout_line_is_forwarded_and_recorded() {
    let _serial = SERIAL.lock();
    let (out, _err, prev_out, prev_err) = buffers();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let controller = Controller::new();
    let handle = controller
        .start(quiet_config(&path).capture_streams(true))
        .unwrap();
    stream::stdout().write_all(b"hello\n").unwrap();
    handle.stop();
    reset(prev_out, prev_err);

    assert_eq!(String::from_utf8(out.lock().clone()).unwrap(), "hello\n");
    let records = read_records(&path);
    let lines = with_source(&records, "stream");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["body"], "hello");
    assert_eq!(lines[0]["severity"], "INFO");
    assert_eq!(lines[0]["stream_name"], "stdout");
    assert_mandatory_fields(lines[0]);
}

#[test]
fn stderr_lines_are_errors() {
    let _serial = SERIAL.lock();
    let (_out, err, prev_out, prev_err) = buffers();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let controller = Controller::new();
    let handle = controller
        .start(quiet_config(&path).capture_streams(true))
        .unwrap();
    eprintln_captured!("disk {} failed", 3);
    println_captured!();
    handle.stop();
    reset(prev_out, prev_err);

    assert_eq!(String::from_utf8(err.lock().clone()).unwrap(), "disk 3 failed\n");
    let records = read_records(&path);
    let lines = with_source(&records, "stream");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["severity"], "ERROR");
    assert_eq!(lines[0]["stream_name"], "stderr");
    assert_eq!(lines[0]["body"], "disk 3 failed");
}

#[test]
fn streams_are_restored_to_the_exact_originals() {
    let _serial = SERIAL.lock();
    let before_out = stream::current(StdStream::Stdout);
    let before_err = stream::current(StdStream::Stderr);
    let dir = tempfile::tempdir().unwrap();

    let controller = Controller::new();
    let handle = controller
        .start(quiet_config(dir.path().join("app.log")).capture_streams(true))
        .unwrap();
    assert!(!same(&stream::current(StdStream::Stdout), &before_out));
    assert!(!same(&stream::current(StdStream::Stderr), &before_err));

    handle.stop();
    assert!(same(&stream::current(StdStream::Stdout), &before_out));
    assert!(same(&stream::current(StdStream::Stderr), &before_err));

    // A second stop has nothing left to restore.
    controller.stop();
    assert!(same(&stream::current(StdStream::Stdout), &before_out));
}

#[test]
fn streams_untouched_when_capture_disabled() {
    let _serial = SERIAL.lock();
    let (out, _err, prev_out, prev_err) = buffers();
    let installed = stream::current(StdStream::Stdout);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let controller = Controller::new();
    let handle = controller.start(quiet_config(&path)).unwrap();
    assert!(same(&stream::current(StdStream::Stdout), &installed));
    println_captured!("not captured");
    handle.stop();
    reset(prev_out, prev_err);

    assert_eq!(String::from_utf8(out.lock().clone()).unwrap(), "not captured\n");
    assert!(with_source(&read_records(&path), "stream").is_empty());
}

#[test]
fn concurrent_writers_during_teardown() {
    let _serial = SERIAL.lock();
    let (out, _err, prev_out, prev_err) = buffers();
    let installed = stream::current(StdStream::Stdout);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let controller = Controller::new();
    let handle = controller
        .start(quiet_config(&path).capture_streams(true))
        .unwrap();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            thread::spawn(move || {
                for i in 0..200 {
                    writeln!(stream::stdout(), "writer {w} line {i}").unwrap();
                }
            })
        })
        .collect();
    thread::sleep(std::time::Duration::from_millis(5));
    handle.stop();
    for writer in writers {
        writer.join().unwrap();
    }

    assert!(same(&stream::current(StdStream::Stdout), &installed));
    reset(prev_out, prev_err);

    // Every line reached the underlying writer whole, captured or not.
    let text = String::from_utf8(out.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 800);
    assert!(lines.iter().all(|l| l.starts_with("writer ")));

    let records = read_records(&path);
    for record in with_source(&records, "stream") {
        assert!(record["body"].as_str().unwrap().starts_with("writer "));
    }
}

#[test]
fn overlapping_sessions_stop_in_any_order() {
    let _serial = SERIAL.lock();
    let (out, _err, prev_out, prev_err) = buffers();
    let original = stream::current(StdStream::Stdout);
    let dir = tempfile::tempdir().unwrap();
    let first_path = dir.path().join("first.log");
    let second_path = dir.path().join("second.log");

    let first = Controller::new();
    let second = Controller::new();
    let first_handle = first
        .start(quiet_config(&first_path).capture_streams(true))
        .unwrap();
    let second_handle = second
        .start(quiet_config(&second_path).capture_streams(true))
        .unwrap();
    println_captured!("both running");

    first_handle.stop();
    assert!(!same(&stream::current(StdStream::Stdout), &original));
    println_captured!("second only");

    second_handle.stop();
    assert!(same(&stream::current(StdStream::Stdout), &original));
    println_captured!("nobody");
    reset(prev_out, prev_err);

    assert_eq!(
        String::from_utf8(out.lock().clone()).unwrap(),
        "both running\nsecond only\nnobody\n"
    );
    let first_records = read_records(&first_path);
    assert_eq!(with_body(&first_records, "both running").len(), 1);
    assert!(with_body(&first_records, "second only").is_empty());
    let second_records = read_records(&second_path);
    assert_eq!(with_body(&second_records, "both running").len(), 1);
    assert_eq!(with_body(&second_records, "second only").len(), 1);
    assert!(with_body(&second_records, "nobody").is_empty());
}
