//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the relay and client honest:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! The helpers here walk each crate's `src/` tree and hand back the lines
//! that count as production code. Everything from a `#[cfg(test)]` marker
//! to the end of a file is treated as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Source trees checked by every scan, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/daemon/src", "client/src"];

/// Files compiled only for tests (behind `cfg(any(test, feature = "test-utils"))`)
pub const TEST_SUPPORT_FILES: &[&str] = &["relay/core/src/backend/scripted.rs"];

/// A production source line
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
    /// The untouched line
    pub raw: String,
    /// Whether the nearest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

impl SourceLine {
    /// `path:line - what: code` for violation reports
    #[must_use]
    pub fn describe(&self, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            self.number,
            what,
            self.raw.trim()
        )
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under the production directories, test support excluded
#[must_use]
pub fn production_files(root: &Path) -> Vec<PathBuf> {
    let skipped: Vec<PathBuf> = TEST_SUPPORT_FILES.iter().map(|f| root.join(f)).collect();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            let file = entry.path();
            if file.extension().and_then(|s| s.to_str()) == Some("rs")
                && !skipped.iter().any(|s| s == file)
            {
                files.push(file.to_path_buf());
            }
        }
    }

    files.sort();
    files
}

/// Production lines of `content`, stopping at the first `#[cfg(test)]`
#[must_use]
pub fn production_lines(path: &Path, content: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        let code = raw.split("//").next().unwrap_or(raw).to_string();
        if let Some(is_async) = fn_header(&code) {
            in_async_fn = is_async;
        }

        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            raw: raw.to_string(),
            in_async_fn,
        });
    }

    lines
}

/// `Some(is_async)` if the line opens a function
fn fn_header(code: &str) -> Option<bool> {
    let trimmed = code.trim_start();
    let starts_fn = trimmed.starts_with("fn ")
        || trimmed.contains(" fn ")
        || trimmed.starts_with("async fn ");
    if !starts_fn {
        return None;
    }
    Some(trimmed.contains("async fn "))
}

/// Run `check` over every production line in the workspace
#[must_use]
pub fn scan_workspace<F>(check: F) -> Vec<String>
where
    F: Fn(&SourceLine) -> Option<String>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for file in production_files(&root) {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for line in production_lines(&file, &content) {
            if let Some(violation) = check(&line) {
                violations.push(violation);
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_stop_at_test_module() {
        let content = "fn run() {}\n#[cfg(test)]\nmod tests {\n    fn sleepy() {}\n}\n";
        let lines = production_lines(Path::new("x.rs"), content);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code, "fn run() {}");
    }

    #[test]
    fn test_async_context_tracking() {
        let content = "pub async fn serve() {\n    let a = 1;\n}\nfn load() {\n    let b = 2;\n}\n";
        let lines = production_lines(Path::new("x.rs"), content);
        assert!(lines[1].in_async_fn);
        assert!(!lines[4].in_async_fn);
    }

    #[test]
    fn test_comments_are_stripped() {
        let content = "let x = 1; // std::thread::sleep\n// reqwest::blocking\n";
        let lines = production_lines(Path::new("x.rs"), content);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].code.contains("sleep"));
    }

    #[test]
    fn test_production_dirs_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).exists(), "{dir} should exist");
        }
        assert!(!production_files(&root).is_empty());
    }
}
