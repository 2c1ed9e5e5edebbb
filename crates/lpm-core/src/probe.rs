//! Per-directory signal detection.
//!
//! A probe reads one directory level and reports which project signals are
//! present, along with the size and newest mtime of the files directly inside
//! it. Subtrees the walker never enters (`.git`, and repositories it treats as
//! boundaries) are aggregated by a separate, deferred step ([`StatsHandle`]).

use crate::error::{Error, Result};
use crate::ignore::IgnoreMatcher;
use crate::models::ProjectType;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the git metadata entry.
pub const GIT_DIR: &str = ".git";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A manifest file that identifies a project type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// An exact file name, e.g. `Cargo.toml`.
    File(&'static str),
    /// Any file with this extension, e.g. `.csproj`.
    Extension(&'static str),
}

impl Marker {
    fn matches(&self, names: &HashSet<String>) -> bool {
        match self {
            Marker::File(name) => names.contains(*name),
            Marker::Extension(ext) => names
                .iter()
                .any(|n| n.len() > ext.len() && n.ends_with(ext)),
        }
    }
}

/// Manifest table, checked in order; the first type with a present marker wins.
pub const MANIFEST_TABLE: &[(ProjectType, &[Marker])] = &[
    (ProjectType::NodeJs, &[Marker::File("package.json")]),
    (
        ProjectType::Python,
        &[
            Marker::File("pyproject.toml"),
            Marker::File("setup.py"),
            Marker::File("requirements.txt"),
        ],
    ),
    (ProjectType::Rust, &[Marker::File("Cargo.toml")]),
    (ProjectType::Go, &[Marker::File("go.mod")]),
    (
        ProjectType::Java,
        &[Marker::File("pom.xml"), Marker::File("build.gradle")],
    ),
    (ProjectType::Php, &[Marker::File("composer.json")]),
    (
        ProjectType::CSharp,
        &[Marker::Extension(".csproj"), Marker::Extension(".sln")],
    ),
    (ProjectType::Ruby, &[Marker::File("Gemfile")]),
];

/// Whether an entry of this type named `.git` marks a repository.
///
/// Directories (regular repositories) and files (worktrees, submodules) count;
/// symbolic links do not.
pub fn is_git_marker(file_type: fs::FileType) -> bool {
    file_type.is_dir() || file_type.is_file()
}

/// Whether `dir` directly contains a `.git` marker.
pub fn has_git_marker(dir: &Path) -> bool {
    fs::symlink_metadata(dir.join(GIT_DIR)).is_ok_and(|m| is_git_marker(m.file_type()))
}

/// Detects the project type from the file names directly inside a directory.
pub fn detect_project_type(file_names: &HashSet<String>) -> ProjectType {
    MANIFEST_TABLE
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| m.matches(file_names)))
        .map(|(project_type, _)| *project_type)
        .unwrap_or(ProjectType::Unknown)
}

/// Whether `name` is `README.md` or `README.txt`, ignoring case.
pub fn is_readme_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "readme.md" || lower == "readme.txt"
}

/// Signals observed in one directory level.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignals {
    /// The probed directory.
    pub path: PathBuf,
    /// A `.git` directory or file is present.
    pub has_git: bool,
    /// Type from the manifest table.
    pub project_type: ProjectType,
    /// README directly inside the directory.
    pub readme_path: Option<PathBuf>,
    /// Files directly inside the directory (including a `.git` file).
    pub local: DirStats,
    /// Modification time of the directory itself.
    pub dir_mtime: Option<DateTime<Utc>>,
    /// Entries that could not be read.
    pub skipped_entries: usize,
}

impl RawSignals {
    /// At least one of git, recognized type, or README is present.
    pub fn has_any_signal(&self) -> bool {
        self.has_git || self.project_type != ProjectType::Unknown || self.readme_path.is_some()
    }

    /// Handle for everything below the directory that `local` does not cover.
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            path: self.path.clone(),
            skip_direct_files: true,
        }
    }

    /// Handle for the `.git` directory, if there is one.
    pub fn git_stats_handle(&self) -> Option<StatsHandle> {
        let git_dir = self.path.join(GIT_DIR);
        git_dir.is_dir().then_some(StatsHandle {
            path: git_dir,
            skip_direct_files: false,
        })
    }
}

/// Recursive aggregates for one directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Sum of file sizes in bytes.
    pub size_bytes: u64,
    /// Newest file mtime.
    pub newest_mtime: Option<DateTime<Utc>>,
    /// Files counted.
    pub files: usize,
    /// Entries that could not be read.
    pub skipped: usize,
}

impl DirStats {
    /// Size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    /// Adds `other` into these totals.
    pub fn absorb(&mut self, other: &DirStats) {
        self.size_bytes += other.size_bytes;
        self.files += other.files;
        self.skipped += other.skipped;
        self.newest_mtime = match (self.newest_mtime, other.newest_mtime) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    fn add_file(&mut self, meta: &fs::Metadata) {
        self.files += 1;
        self.size_bytes += meta.len();
        if let Ok(mtime) = meta.modified() {
            self.newest_mtime = newest(self.newest_mtime, mtime);
        }
    }
}

/// Deferred recursive stat computation for a probed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsHandle {
    path: PathBuf,
    /// Files directly inside `path` were already counted by the probe.
    skip_direct_files: bool,
}

impl StatsHandle {
    /// The directory this handle aggregates.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads directory signals and aggregates, honoring the scan's ignore rules.
#[derive(Debug, Clone, Copy)]
pub struct SignalProbe<'a> {
    scan_root: &'a Path,
    matcher: &'a IgnoreMatcher,
}

impl<'a> SignalProbe<'a> {
    /// Creates a probe for entries under `scan_root`.
    pub fn new(scan_root: &'a Path, matcher: &'a IgnoreMatcher) -> Self {
        Self { scan_root, matcher }
    }

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let rel = path.strip_prefix(self.scan_root).unwrap_or(path);
        self.matcher.should_ignore(path, rel, is_dir)
    }

    /// Inspects the immediate entries of `path`.
    ///
    /// Unreadable entries are counted in `skipped_entries` and otherwise
    /// treated as absent.
    ///
    /// # Errors
    ///
    /// Fails only if `path` itself cannot be listed: [`Error::Vanished`] when
    /// it no longer exists, [`Error::PermissionDenied`] when unreadable.
    pub fn probe(&self, path: &Path) -> Result<RawSignals> {
        let entries = fs::read_dir(path).map_err(|e| Error::from_io(path, e))?;

        let mut has_git = false;
        let mut file_names = HashSet::new();
        let mut readme: Option<String> = None;
        let mut local = DirStats::default();
        let mut skipped_entries = 0;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => {
                    skipped_entries += 1;
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => {
                    skipped_entries += 1;
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();

            if name == GIT_DIR {
                if !is_git_marker(file_type) {
                    continue;
                }
                has_git = true;
                if file_type.is_dir() {
                    continue;
                }
            } else if !file_type.is_file() || self.is_ignored(&entry.path(), false) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => local.add_file(&meta),
                Err(_) => skipped_entries += 1,
            }

            if name == GIT_DIR {
                continue;
            }

            if is_readme_name(&name) && readme.as_ref().is_none_or(|r| name < *r) {
                readme = Some(name.clone());
            }
            file_names.insert(name);
        }

        let dir_mtime = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(RawSignals {
            path: path.to_path_buf(),
            has_git,
            project_type: detect_project_type(&file_names),
            readme_path: readme.map(|name| path.join(name)),
            local,
            dir_mtime,
            skipped_entries,
        })
    }

    /// Walks the handle's path recursively, summing file sizes and tracking
    /// the newest mtime.
    ///
    /// Ignored subtrees and files are excluded. Symbolic links are neither
    /// followed nor counted.
    pub fn compute_stats(&self, handle: &StatsHandle) -> DirStats {
        let mut stats = DirStats::default();

        let walker = WalkDir::new(&handle.path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e.path(), e.file_type().is_dir()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(path = %handle.path.display(), error = %e, "Skipping unreadable entry");
                    stats.skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || (handle.skip_direct_files && entry.depth() == 1) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => stats.add_file(&meta),
                Err(_) => stats.skipped += 1,
            }
        }

        stats
    }
}

fn newest(current: Option<DateTime<Utc>>, candidate: SystemTime) -> Option<DateTime<Utc>> {
    let candidate = DateTime::<Utc>::from(candidate);
    Some(match current {
        Some(c) if c >= candidate => c,
        _ => candidate,
    })
}
