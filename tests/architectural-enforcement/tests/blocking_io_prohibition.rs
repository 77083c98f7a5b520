//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the relay and client uses tokio and async reqwest.
//! **Allowed**: blocking calls in plain `fn`s that run before the runtime
//! does real work (config loading), and terminal output in the REPL binary.

use architectural_enforcement::{production_lines, scan_workspace, SourceLine};

fn blocking_violation(line: &SourceLine) -> Option<String> {
    let code = &line.code;

    // Anywhere, async or not
    if code.contains("reqwest::blocking") {
        return Some(line.describe("Blocking HTTP client"));
    }
    if code.contains("std::net::TcpListener") || code.contains("std::net::TcpStream") {
        return Some(line.describe("Blocking socket"));
    }

    if !line.in_async_fn {
        return None;
    }
    if code.contains("std::fs::") {
        return Some(line.describe("Blocking file I/O in async fn"));
    }
    if code.contains("std::process::Command") {
        return Some(line.describe("Blocking process I/O in async fn"));
    }
    if code.contains("std::io::stdin()") {
        return Some(line.describe("Blocking stdin in async fn"));
    }
    None
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan_workspace(blocking_violation);

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::net, tokio::io::stdin and async reqwest.");

        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}

#[test]
fn test_blocking_io_detection() {
    let lines = production_lines(
        std::path::Path::new("x.rs"),
        "async fn handle() {\n    let s = std::fs::read_to_string(p);\n}\n",
    );
    assert!(blocking_violation(&lines[1]).is_some());
}

#[test]
fn test_sync_config_loading_is_allowed() {
    let lines = production_lines(
        std::path::Path::new("x.rs"),
        "pub fn load() {\n    let s = std::fs::read_to_string(p);\n}\n",
    );
    assert!(blocking_violation(&lines[1]).is_none());
}

#[test]
fn test_blocking_client_always_flagged() {
    let lines = production_lines(
        std::path::Path::new("x.rs"),
        "fn fetch() {\n    let c = reqwest::blocking::Client::new();\n}\n",
    );
    assert!(blocking_violation(&lines[1]).is_some());
}
