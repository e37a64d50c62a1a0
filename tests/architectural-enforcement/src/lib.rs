//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - Only the surface pair toggles surface visibility
//! - No blocking sleeps; timed waits only where a timer is the behaviour
//!
//! The helpers here walk the workspace sources and hand back production
//! lines (everything before a file's `#[cfg(test)]` module) so each test
//! can apply its own rule.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code
pub const PRODUCTION_DIRS: &[&str] = &["playback/core/src", "playback/daemon/src"];

/// A single line of production source
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line belongs to, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Code with any trailing `//` comment removed
    pub code: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of every file in [`PRODUCTION_DIRS`]
#[must_use]
pub fn production_lines() -> Vec<SourceLine> {
    let root = workspace_root();
    let mut lines = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            let relative = file.strip_prefix(&root).unwrap_or(&file).to_path_buf();
            lines.extend(production_lines_of(&relative, &content));
        }
    }
    lines
}

/// Production lines of one file's content
#[must_use]
pub fn production_lines_of(path: &Path, content: &str) -> Vec<SourceLine> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            !trimmed.starts_with("//")
        })
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: line.split("//").next().unwrap_or(line).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// note\nfn b() {} // trailing\n#[cfg(test)]\nfn c() {}\n";
        let lines = production_lines_of(Path::new("x.rs"), content);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].number, 3);
        assert_eq!(lines[1].code.trim(), "fn b() {}");
    }

    #[test]
    fn test_workspace_sources_found() {
        assert!(!rust_files("playback/core/src").is_empty());
    }
}
