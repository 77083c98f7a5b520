//! Integration Test: Sleep Prohibition
//!
//! Production code waits on I/O, channels and cancellation, never on a timer.
//! Streams are forwarded as fragments arrive; a sleep anywhere on that path
//! would add latency to every reply.
//!
//! Test code and the scripted test backend are exempt.

use architectural_enforcement::{scan_workspace, SourceLine};

fn sleep_violation(line: &SourceLine) -> Option<String> {
    let code = &line.code;
    if code.contains("thread::sleep") {
        return Some(line.describe("Blocking sleep"));
    }
    if code.contains("::sleep(") || code.contains("sleep_until(") {
        return Some(line.describe("Timer sleep"));
    }
    None
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_workspace(sleep_violation);

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse instead:");
        eprintln!("  - tokio::time::timeout() around the awaited operation");
        eprintln!("  - channel receives and CancellationToken::cancelled()");

        panic!("Found {} sleep violation(s)", violations.len());
    }
}

#[test]
fn test_detector_flags_sleep() {
    let lines = architectural_enforcement::production_lines(
        std::path::Path::new("x.rs"),
        "async fn poll() {\n    tokio::time::sleep(d).await;\n    std::thread::sleep(d);\n}\n",
    );
    let found: Vec<String> = lines.iter().filter_map(sleep_violation).collect();
    assert_eq!(found.len(), 2);
}
