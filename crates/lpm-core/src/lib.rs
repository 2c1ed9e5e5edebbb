//! # lpm-core
//!
//! A library for finding, classifying, and pruning software projects on the
//! local file system.
//!
//! ## Features
//!
//! - **Project discovery** from manifest files, READMEs, and `.git` markers
//! - **Git inspection** of remotes, dirty working trees, and unpushed commits
//! - **Classification** into active, work-in-progress, dormant, and stale
//! - **Prune candidates** for old, remote-less projects
//! - **Parallel scanning** with cancellation and streamed result batches
//! - **JSON serialization** for all data structures
//!
//! ## Quick Start
//!
//! ```no_run
//! use lpm_core::{DefaultScanner, ProjectScanner, ScanConfig};
//! use std::path::PathBuf;
//!
//! let config = ScanConfig {
//!     root_path: PathBuf::from("/home/user/code"),
//!     exclude_nested_git_repos: true,
//!     ..ScanConfig::default()
//! };
//!
//! let report = DefaultScanner::new().scan(&config).expect("Failed to scan");
//!
//! for project in &report.projects {
//!     println!("{}: {}", project.name, project.classification);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`walker`] - Directory traversal yielding candidate directories
//! - [`ignore`] - Ignore pattern matching
//! - [`probe`] - Per-directory signals and recursive size statistics
//! - [`git_analyzer`] - Git operations using gitoxide
//! - [`classifier`] - Classification and prune eligibility
//! - [`scanner`] - Scanner trait and parallel implementation
//! - [`prune`] - Project directory deletion
//! - [`models`] - Core data structures
//! - [`config`] - Configuration file loading
//! - [`clock`] - Time source
//! - [`error`] - Custom error types
//!
//! ## CLI Binary
//!
//! This crate also provides an `lpm` binary for command-line usage.
//! See the binary's `--help` output for details.

pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod git_analyzer;
pub mod ignore;
pub mod models;
pub mod probe;
pub mod prune;
pub mod scanner;
pub mod walker;

pub use classifier::reclassify;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{DeletionError, Error, Result, SkipKind};
pub use ignore::IgnoreMatcher;
pub use models::{
    Classification, ClassificationConfig, GitStatus, Project, ProjectFilter, ProjectType,
    ScanConfig, ScanReport, ScanSummary,
};
pub use prune::delete_project_directory;
pub use scanner::{CancellationToken, DefaultScanner, ProjectScanner, ScanEvent, ScanHandle};

/// Library version, derived from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "lpm-core");
    }
}
