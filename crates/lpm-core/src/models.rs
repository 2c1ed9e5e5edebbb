//! Core data models for project inventories.
//!
//! All types in this module are JSON-serializable so report writers can
//! consume scan results directly. A [`Project`] is an immutable snapshot:
//! the classification fields are derived once, by the classifier, and a
//! refresh replaces the whole record set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SkipKind;

/// One detected project root.
///
/// Construct through the scanner or [`Project::from_signals`];
/// `classification` and `is_prunable` are never set independently of the
/// other fields.
///
/// # Example
///
/// ```
/// # use lpm_core::{Classification, Project, ProjectType};
/// # use std::path::PathBuf;
/// let project = Project {
///     path: PathBuf::from("/home/user/code/my-project"),
///     name: "my-project".to_string(),
///     has_git: false,
///     git_remote: None,
///     git_status: None,
///     readme_path: None,
///     project_type: ProjectType::Rust,
///     last_modified: chrono::Utc::now(),
///     size_mb: Some(0.5),
///     classification: Classification::Wip,
///     is_prunable: false,
/// };
/// assert_eq!(project.project_type.to_string(), "Rust");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Absolute path to the project root. Unique within a scan.
    pub path: PathBuf,

    /// Final path segment of `path`.
    pub name: String,

    /// Whether a `.git` entry sits directly inside the project root.
    pub has_git: bool,

    /// Preferred remote URL (`origin` first, otherwise the first remote).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,

    /// Working-tree state. `None` when there is no git metadata or it was unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_status: Option<GitStatus>,

    /// README file directly inside the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_path: Option<PathBuf>,

    /// Type detected from manifest files.
    pub project_type: ProjectType,

    /// Newest file modification time within the project (ignored subtrees excluded).
    pub last_modified: DateTime<Utc>,

    /// Total size in megabytes, `None` when size computation was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,

    /// Health category.
    pub classification: Classification,

    /// Whether the project is a deletion candidate for review.
    pub is_prunable: bool,
}

impl Project {
    /// Whole days between `last_modified` and `now` (negative for future timestamps).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_modified).num_days()
    }

    /// Short human-readable age such as `today`, `3d ago`, `2w ago`, `5mo ago`, `1y ago`.
    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let days = self.age_days(now);

        if days <= 0 {
            "today".to_string()
        } else if days < 7 {
            format!("{}d ago", days)
        } else if days < 30 {
            format!("{}w ago", days / 7)
        } else if days < 365 {
            format!("{}mo ago", days / 30)
        } else {
            format!("{}y ago", days / 365)
        }
    }

    /// Compact status markers for list views.
    ///
    /// `✓`/`✗` for git presence, `⚡` when touched within the last week, and
    /// `⚠` when the working tree is dirty or has unpushed commits.
    pub fn status_icons(&self, now: DateTime<Utc>) -> String {
        let mut icons = vec![if self.has_git { "✓" } else { "✗" }];

        if self.age_days(now) < 7 {
            icons.push("⚡");
        }

        if matches!(
            self.git_status,
            Some(GitStatus::Dirty) | Some(GitStatus::Unpushed)
        ) {
            icons.push("⚠");
        }

        icons.join(" ")
    }
}

/// Project type, detected from the first matching manifest file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectType {
    #[serde(rename = "Node.js")]
    NodeJs,
    Python,
    Rust,
    Go,
    Java,
    #[serde(rename = "PHP")]
    Php,
    #[serde(rename = "C#/.NET")]
    CSharp,
    Ruby,
    Unknown,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProjectType::NodeJs => "Node.js",
            ProjectType::Python => "Python",
            ProjectType::Rust => "Rust",
            ProjectType::Go => "Go",
            ProjectType::Java => "Java",
            ProjectType::Php => "PHP",
            ProjectType::CSharp => "C#/.NET",
            ProjectType::Ruby => "Ruby",
            ProjectType::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Working-tree state of a git repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GitStatus {
    /// Nothing to commit and nothing to push.
    Clean,
    /// Staged or unstaged changes exist.
    Dirty,
    /// The current branch is ahead of its upstream.
    Unpushed,
    /// No remote is configured.
    NoRemote,
}

impl fmt::Display for GitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GitStatus::Clean => "clean",
            GitStatus::Dirty => "dirty",
            GitStatus::Unpushed => "unpushed",
            GitStatus::NoRemote => "no_remote",
        };
        f.write_str(label)
    }
}

/// Project health category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Classification {
    Active,
    #[serde(rename = "Work-in-Progress")]
    Wip,
    Dormant,
    Stale,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Active => "Active",
            Classification::Wip => "Work-in-Progress",
            Classification::Dormant => "Dormant",
            Classification::Stale => "Stale",
        };
        f.write_str(label)
    }
}

/// Thresholds driving classification and prune eligibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Projects touched within this many days are Active or WIP.
    pub active_days_threshold: i64,

    /// Projects older than `active_days_threshold` but within this many days are Dormant.
    pub dormant_days_threshold: i64,

    /// Stale projects strictly larger than this (MB) are prunable.
    pub prunable_min_size_mb: f64,

    /// Stale projects strictly smaller than this (MB) are prunable.
    pub prunable_max_size_mb: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            active_days_threshold: 30,
            dormant_days_threshold: 180,
            prunable_min_size_mb: 10.0,
            prunable_max_size_mb: 1.0,
        }
    }
}

/// Configuration for a scan.
///
/// Passed explicitly into every scan; nothing is read from process-wide state.
///
/// # Example
///
/// ```
/// # use lpm_core::ScanConfig;
/// # use std::path::PathBuf;
/// let config = ScanConfig {
///     root_path: PathBuf::from("/home/user/code"),
///     ignore_patterns: vec!["experimental-*".to_string()],
///     exclude_nested_git_repos: true,
///     ..ScanConfig::default()
/// };
/// assert!(config.compute_size);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory to start scanning from. It is itself a candidate.
    pub root_path: PathBuf,

    /// User ignore globs, appended to the built-in defaults.
    pub ignore_patterns: Vec<String>,

    /// Stop descending once a directory with `.git` has been yielded.
    pub exclude_nested_git_repos: bool,

    /// Walk each project recursively for size and newest mtime.
    ///
    /// When `false`, `size_mb` is `None` and `last_modified` only considers
    /// files directly inside the project root.
    pub compute_size: bool,

    /// Match ignore patterns case-insensitively.
    pub case_insensitive_ignore: bool,

    /// Worker count. `None` uses the available hardware parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Number of candidates dispatched per batch.
    pub batch_size: usize,

    /// Classification thresholds.
    #[serde(flatten)]
    pub classification: ClassificationConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            ignore_patterns: Vec::new(),
            exclude_nested_git_repos: false,
            compute_size: true,
            case_insensitive_ignore: false,
            jobs: None,
            batch_size: 32,
            classification: ClassificationConfig::default(),
        }
    }
}

/// Counts gathered alongside a scan so skipped data is observable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSummary {
    /// Directories yielded by the walker.
    pub candidates: usize,

    /// Entries or subtrees skipped because they could not be read.
    pub skipped_permission: usize,

    /// Candidates that disappeared mid-scan.
    pub vanished: usize,

    /// Repositories whose git metadata could not be read.
    pub git_read_errors: usize,

    /// Whether the scan stopped early on a cancellation request.
    pub cancelled: bool,
}

impl ScanSummary {
    /// Tallies one soft error.
    pub fn record(&mut self, kind: SkipKind) {
        match kind {
            SkipKind::Permission => self.skipped_permission += 1,
            SkipKind::Vanished => self.vanished += 1,
            SkipKind::GitRead => self.git_read_errors += 1,
        }
    }

    /// Adds another summary's counts into this one.
    pub fn merge(&mut self, other: &ScanSummary) {
        self.candidates += other.candidates;
        self.skipped_permission += other.skipped_permission;
        self.vanished += other.vanished;
        self.git_read_errors += other.git_read_errors;
        self.cancelled |= other.cancelled;
    }

    /// Total number of soft errors.
    pub fn total_skipped(&self) -> usize {
        self.skipped_permission + self.vanished + self.git_read_errors
    }
}

/// Result of a scan: projects ordered by path, plus skip counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    /// Classified projects, sorted lexicographically by path.
    pub projects: Vec<Project>,

    /// Soft-error counts.
    pub summary: ScanSummary,
}

impl ScanReport {
    /// Looks up a project by its path.
    pub fn get(&self, path: &Path) -> Option<&Project> {
        self.projects
            .binary_search_by(|p| p.path.as_path().cmp(path))
            .ok()
            .map(|i| &self.projects[i])
    }

    /// Projects matching `filter`, in report order.
    pub fn filter(&self, filter: ProjectFilter) -> impl Iterator<Item = &Project> {
        self.projects.iter().filter(move |p| filter.matches(p))
    }

    /// Number of projects in each classification.
    pub fn counts(&self) -> BTreeMap<Classification, usize> {
        let mut counts = BTreeMap::new();
        for project in &self.projects {
            *counts.entry(project.classification).or_insert(0) += 1;
        }
        counts
    }
}

/// View filters over a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectFilter {
    #[default]
    All,
    Active,
    Wip,
    Dormant,
    Stale,
    Prunable,
}

impl ProjectFilter {
    /// Whether `project` passes this filter.
    pub fn matches(self, project: &Project) -> bool {
        match self {
            ProjectFilter::All => true,
            ProjectFilter::Active => project.classification == Classification::Active,
            ProjectFilter::Wip => project.classification == Classification::Wip,
            ProjectFilter::Dormant => project.classification == Classification::Dormant,
            ProjectFilter::Stale => project.classification == Classification::Stale,
            ProjectFilter::Prunable => project.is_prunable,
        }
    }
}
