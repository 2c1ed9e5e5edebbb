//! Ignore-pattern matching.
//!
//! Built-in defaults are always active; user patterns from configuration and
//! `.lpmignore` files are appended to them. A matched directory is pruned
//! together with its entire subtree.

use crate::error::{Error, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::io;
use std::path::Path;

/// Directory names that are never scanned.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules",
    ".venv",
    "venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    "target",
    "build",
    "dist",
    ".next",
    ".nuxt",
    ".gradle",
    ".idea",
];

/// Name of per-root and global ignore files.
pub const IGNORE_FILE_NAME: &str = ".lpmignore";

const VSCODE_DIR: &str = ".vscode";
const WORKSPACE_SUFFIX: &str = ".code-workspace";

/// Evaluates paths against the default and user ignore globs.
///
/// Each pattern is tested against both the final path segment and the path
/// relative to the scan root. A pattern ending in `/` only matches directories.
///
/// # Example
///
/// ```
/// use lpm_core::ignore::IgnoreMatcher;
/// use std::path::Path;
///
/// let matcher = IgnoreMatcher::new(&["experimental-*".to_string()], false).unwrap();
/// assert!(matcher.should_ignore(Path::new("/r/node_modules"), Path::new("node_modules"), true));
/// assert!(matcher.should_ignore(Path::new("/r/experimental-x"), Path::new("experimental-x"), true));
/// assert!(!matcher.should_ignore(Path::new("/r/app"), Path::new("app"), true));
/// ```
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    patterns: Vec<String>,
    dirs: GlobSet,
    files: GlobSet,
}

impl IgnoreMatcher {
    /// Builds a matcher from the defaults plus `user_patterns`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any pattern is not a valid glob.
    pub fn new(user_patterns: &[String], case_insensitive: bool) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();
        patterns.extend(
            user_patterns
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        );

        let build = |pattern: &str| {
            GlobBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
        };

        // Defaults name directories only; user patterns without a trailing
        // `/` also apply to files.
        let mut dirs = GlobSetBuilder::new();
        let mut files = GlobSetBuilder::new();

        for (i, pattern) in patterns.iter().enumerate() {
            let is_default = i < DEFAULT_IGNORE_PATTERNS.len();
            let (body, dir_only) = match pattern.strip_suffix('/') {
                Some(body) => (body, true),
                None => (pattern.as_str(), is_default),
            };
            let body = body.trim_start_matches("./").trim_start_matches('/');

            let glob = build(body).map_err(|e| Error::invalid_pattern(pattern.clone(), e))?;
            if !dir_only {
                files.add(glob.clone());
            }
            dirs.add(glob);
        }

        let dirs = dirs
            .build()
            .map_err(|e| Error::invalid_pattern(patterns.join(", "), e))?;
        let files = files
            .build()
            .map_err(|e| Error::invalid_pattern(patterns.join(", "), e))?;

        Ok(Self {
            patterns,
            dirs,
            files,
        })
    }

    /// A matcher with only the built-in defaults.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&[], false)
    }

    /// All active patterns, defaults first.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether the entry at `abs_path` (with `rel_path` relative to the scan
    /// root) is excluded.
    ///
    /// The scan root itself (empty `rel_path`) is never ignored. A `.vscode`
    /// directory is ignored unless it holds a `*.code-workspace` file. Files
    /// are only tested against user patterns that do not end in `/`.
    pub fn should_ignore(&self, abs_path: &Path, rel_path: &Path, is_dir: bool) -> bool {
        let Some(name) = rel_path.file_name() else {
            return false;
        };

        if is_dir && name == VSCODE_DIR && !has_workspace_definition(abs_path) {
            return true;
        }

        let set = if is_dir { &self.dirs } else { &self.files };
        set.is_match(Path::new(name)) || set.is_match(rel_path)
    }
}

fn has_workspace_definition(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };

    entries.flatten().any(|entry| {
        entry.file_name().to_string_lossy().ends_with(WORKSPACE_SUFFIX)
            && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
    })
}

/// Parses ignore-file contents: one glob per line, blanks and `#` comments skipped.
pub fn parse_ignore_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads an ignore file, returning no patterns if it does not exist.
pub fn load_ignore_file(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(parse_ignore_file(&contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}
