//! Project scanning.
//!
//! This module drives a scan end to end: the [`TreeWalker`] yields candidate
//! directories, a bounded worker pool probes them in batches, and the
//! classified [`Project`] records are merged into a path-ordered
//! [`ScanReport`]. The main entry point is the [`ProjectScanner`] trait, with
//! a default implementation in [`DefaultScanner`].
//!
//! Every file is stat'ed once per scan. Each candidate contributes the files
//! directly inside it (plus its `.git` directory, or its whole subtree when
//! the walker stops there), and those totals are folded into every ancestor
//! as the pre-order walk leaves a subtree. A project is classified once its
//! subtree is closed.

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result, SkipKind};
use crate::git_analyzer::{self, GitMetadata};
use crate::ignore::IgnoreMatcher;
use crate::models::{Project, ScanConfig, ScanReport, ScanSummary};
use crate::probe::{DirStats, RawSignals, SignalProbe};
use crate::walker::{Candidate, TreeWalker};
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Trait for scanning a directory tree into a project inventory.
///
/// # Example
///
/// ```no_run
/// use lpm_core::{DefaultScanner, ProjectScanner, ScanConfig};
/// use std::path::PathBuf;
///
/// let scanner = DefaultScanner::new();
/// let config = ScanConfig {
///     root_path: PathBuf::from("/home/user/code"),
///     ..ScanConfig::default()
/// };
///
/// let report = scanner.scan(&config)?;
/// println!("Found {} projects", report.projects.len());
/// # Ok::<(), lpm_core::Error>(())
/// ```
pub trait ProjectScanner {
    /// Scans `config.root_path` and returns every detected project.
    ///
    /// # Errors
    ///
    /// Returns an error only if the scan root itself is inaccessible or the
    /// configuration is invalid. Per-directory failures are counted in
    /// [`ScanReport::summary`].
    fn scan(&self, config: &ScanConfig) -> Result<ScanReport>;
}

/// Cooperative cancellation flag shared between a caller and a running scan.
///
/// Cancelling stops the walker and keeps queued candidates from starting;
/// probes already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Default implementation of the ProjectScanner trait.
///
/// This scanner:
/// - Uses `walkdir` for traversal, pruning ignored subtrees
/// - Probes candidates on a `rayon` pool sized by [`ScanConfig::jobs`]
/// - Reads git metadata with gitoxide (via `git_analyzer`)
/// - Classifies against a single "now" taken from its [`Clock`]
#[derive(Debug, Clone)]
pub struct DefaultScanner {
    clock: Arc<dyn Clock>,
}

impl DefaultScanner {
    /// Creates a scanner that reads the system clock.
    ///
    /// # Example
    ///
    /// ```
    /// use lpm_core::DefaultScanner;
    ///
    /// let scanner = DefaultScanner::new();
    /// ```
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for classification.
    ///
    /// # Example
    ///
    /// ```
    /// use lpm_core::{DefaultScanner, FixedClock};
    ///
    /// let scanner = DefaultScanner::new().with_clock(FixedClock(chrono::Utc::now()));
    /// ```
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Scans until finished or until `cancel` fires.
    ///
    /// On cancellation the report holds every project fully classified
    /// before the stop and `summary.cancelled` is set.
    pub fn scan_with_cancel(
        &self,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        self.scan_batches(config, cancel, |_| {})
    }

    /// Scans and hands each batch of completed projects to `on_batch`.
    ///
    /// A project completes once the walk has left its subtree, so nested
    /// projects arrive before the directories that contain them. Batches are
    /// sorted by path; the returned report contains the union of all batches,
    /// sorted by path.
    pub fn scan_batches<F>(
        &self,
        config: &ScanConfig,
        cancel: &CancellationToken,
        mut on_batch: F,
    ) -> Result<ScanReport>
    where
        F: FnMut(&[Project]),
    {
        let root = validate_root(&config.root_path)?;
        let matcher = IgnoreMatcher::new(&config.ignore_patterns, config.case_insensitive_ignore)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .thread_name(|i| format!("lpm-probe-{}", i))
            .build()
            .map_err(|e| Error::other(format!("Failed to start worker pool: {}", e)))?;

        info!(root = %root.display(), "Scan started");

        let ctx = ScanContext {
            root: &root,
            probe: SignalProbe::new(&root, &matcher),
            config,
            cancel,
            now: self.clock.now(),
        };
        let walker = TreeWalker::new(&root, &matcher)
            .with_exclude_nested_git_repos(config.exclude_nested_git_repos)
            .with_cancellation(cancel.clone());

        let batch_size = config.batch_size.max(1);
        let mut summary = ScanSummary::default();
        let mut projects: BTreeMap<PathBuf, Project> = BTreeMap::new();
        let mut pending: Vec<Candidate> = Vec::with_capacity(batch_size);
        let mut fold = SubtreeFold::default();

        let mut emit = |done: Vec<Completed>, summary: &mut ScanSummary| {
            let batch = ctx.complete(done, summary);
            if !batch.is_empty() {
                on_batch(&batch);
            }
            for project in batch {
                projects.insert(project.path.clone(), project);
            }
        };

        for candidate in walker.candidates() {
            match candidate {
                Ok(candidate) => {
                    summary.candidates += 1;
                    pending.push(candidate);
                    if pending.len() >= batch_size {
                        let done = ctx.run_batch(&pool, &mut pending, &mut fold, &mut summary);
                        emit(done, &mut summary);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable directory");
                    summary.record(e.skip_kind());
                }
            }
        }
        if !pending.is_empty() {
            let done = ctx.run_batch(&pool, &mut pending, &mut fold, &mut summary);
            emit(done, &mut summary);
        }
        // Directories still open when the walk was cut short have partial totals.
        if !cancel.is_cancelled() {
            let mut done = Vec::new();
            fold.finish(&mut done);
            emit(done, &mut summary);
        }

        summary.cancelled = cancel.is_cancelled();
        let report = ScanReport {
            projects: projects.into_values().collect(),
            summary,
        };

        info!(
            root = %root.display(),
            projects = report.projects.len(),
            candidates = report.summary.candidates,
            skipped = report.summary.total_skipped(),
            cancelled = report.summary.cancelled,
            "Scan finished"
        );

        Ok(report)
    }

    /// Runs a scan on a background thread, streaming batches as they finish.
    ///
    /// The returned [`ScanHandle`] yields [`ScanEvent::Batch`] events followed
    /// by exactly one [`ScanEvent::Finished`].
    pub fn scan_streaming(&self, config: ScanConfig, cancel: CancellationToken) -> ScanHandle {
        let (tx, rx) = crossbeam_channel::unbounded();
        let scanner = self.clone();
        let token = cancel.clone();

        let thread = thread::spawn(move || {
            let batch_tx: Sender<ScanEvent> = tx.clone();
            let result = scanner.scan_batches(&config, &token, |batch| {
                // A dropped receiver just means nobody is listening anymore.
                let _ = batch_tx.send(ScanEvent::Batch(batch.to_vec()));
            });
            let _ = tx.send(ScanEvent::Finished(result));
        });

        ScanHandle {
            events: rx,
            cancel,
            thread: Some(thread),
        }
    }
}

impl Default for DefaultScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectScanner for DefaultScanner {
    fn scan(&self, config: &ScanConfig) -> Result<ScanReport> {
        self.scan_with_cancel(config, &CancellationToken::new())
    }
}

/// Progress event from a streaming scan.
#[derive(Debug)]
pub enum ScanEvent {
    /// Projects classified in one completed batch, sorted by path.
    Batch(Vec<Project>),
    /// The final report, or the fatal error that stopped the scan.
    Finished(Result<ScanReport>),
}

/// Handle to a scan running on a background thread.
#[derive(Debug)]
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl ScanHandle {
    /// Event stream for progressive rendering.
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Requests cancellation of the running scan.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the scan finishes, discarding remaining batch events.
    pub fn wait(mut self) -> Result<ScanReport> {
        let mut result = None;
        for event in self.events.iter() {
            if let ScanEvent::Finished(r) = event {
                result = Some(r);
                break;
            }
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(Error::other("Scan thread panicked"));
            }
        }

        result.unwrap_or_else(|| Err(Error::other("Scan ended without a result")))
    }
}

/// Per-candidate result, folded by the orchestrator after a batch joins.
#[derive(Debug, Default)]
struct Outcome {
    depth: usize,
    /// Files this directory contributes that no other candidate covers.
    stats: DirStats,
    detected: Option<Detected>,
    summary: ScanSummary,
}

/// A project root waiting for its subtree to close.
#[derive(Debug)]
struct Detected {
    signals: RawSignals,
    git: Option<GitMetadata>,
}

/// A project root whose subtree totals are final.
#[derive(Debug)]
struct Completed {
    detected: Detected,
    totals: DirStats,
}

#[derive(Debug)]
struct OpenDir {
    depth: usize,
    totals: DirStats,
    detected: Option<Detected>,
}

/// Folds per-directory stats into their ancestors over a pre-order walk.
///
/// The stack holds the current directory and its open ancestors, with
/// strictly increasing depths. A directory closes when the walk yields
/// something at its depth or shallower, or when the walk ends.
#[derive(Debug, Default)]
struct SubtreeFold {
    open: Vec<OpenDir>,
}

impl SubtreeFold {
    fn push(&mut self, outcome: Outcome, done: &mut Vec<Completed>) {
        self.close_from(outcome.depth, done);
        self.open.push(OpenDir {
            depth: outcome.depth,
            totals: outcome.stats,
            detected: outcome.detected,
        });
    }

    fn finish(&mut self, done: &mut Vec<Completed>) {
        self.close_from(0, done);
    }

    /// Closes every open directory at `depth` or deeper, innermost first.
    fn close_from(&mut self, depth: usize, done: &mut Vec<Completed>) {
        let keep = self.open.partition_point(|d| d.depth < depth);
        let mut carry = DirStats::default();

        for mut closed in self.open.split_off(keep).into_iter().rev() {
            closed.totals.absorb(&carry);
            carry = closed.totals;
            if let Some(detected) = closed.detected {
                done.push(Completed {
                    detected,
                    totals: closed.totals,
                });
            }
        }

        if let Some(parent) = self.open.last_mut() {
            parent.totals.absorb(&carry);
        }
    }
}

/// Read-only state shared by every probe task of one scan.
struct ScanContext<'a> {
    root: &'a Path,
    probe: SignalProbe<'a>,
    config: &'a ScanConfig,
    cancel: &'a CancellationToken,
    now: chrono::DateTime<chrono::Utc>,
}

impl ScanContext<'_> {
    /// Probes `pending` on the pool and folds the outcomes in walk order.
    fn run_batch(
        &self,
        pool: &rayon::ThreadPool,
        pending: &mut Vec<Candidate>,
        fold: &mut SubtreeFold,
        summary: &mut ScanSummary,
    ) -> Vec<Completed> {
        let outcomes: Vec<Outcome> =
            pool.install(|| pending.par_iter().map(|c| self.process(c)).collect());
        pending.clear();

        // Checked after the join: a batch folded here was probed in full.
        let cancelled = self.cancel.is_cancelled();
        let mut done = Vec::new();
        for outcome in outcomes {
            summary.merge(&outcome.summary);
            if !cancelled {
                fold.push(outcome, &mut done);
            }
        }
        done
    }

    fn process(&self, candidate: &Candidate) -> Outcome {
        let mut outcome = Outcome {
            depth: candidate.depth,
            ..Outcome::default()
        };
        if self.cancel.is_cancelled() {
            return outcome;
        }

        let signals = match self.probe.probe(&candidate.path) {
            Ok(signals) => signals,
            Err(e) => {
                debug!(path = %candidate.path.display(), error = %e, "Probe failed");
                // The walker reports the same unreadable directory when it fails
                // to descend, unless it stopped at a boundary.
                if e.skip_kind() != SkipKind::Permission || candidate.boundary {
                    outcome.summary.record(e.skip_kind());
                }
                return outcome;
            }
        };
        outcome.summary.skipped_permission += signals.skipped_entries;
        outcome.stats = signals.local;

        let deferred = if candidate.boundary {
            Some(signals.stats_handle())
        } else {
            signals.git_stats_handle()
        };
        if let Some(handle) = deferred {
            let stats = self.probe.compute_stats(&handle);
            outcome.summary.skipped_permission += stats.skipped;
            outcome.stats.absorb(&stats);
        }

        if !signals.has_any_signal() {
            return outcome;
        }

        let git = signals
            .has_git
            .then(|| git_analyzer::inspect(&signals.path));
        if git.as_ref().is_some_and(|g| g.degraded) {
            outcome.summary.record(SkipKind::GitRead);
        }

        debug!(
            path = %signals.path.display(),
            depth = candidate.depth,
            root = %self.root.display(),
            "Project detected"
        );
        outcome.detected = Some(Detected { signals, git });
        outcome
    }

    /// Classifies completed projects into a path-sorted batch.
    fn complete(&self, done: Vec<Completed>, summary: &mut ScanSummary) -> Vec<Project> {
        let mut batch = Vec::with_capacity(done.len());

        for Completed { detected, totals } in done {
            let Detected { signals, git } = detected;

            // A directory removed while it was being scanned is dropped, not half-reported.
            if !signals.path.is_dir() {
                warn!(path = %signals.path.display(), "Project vanished during scan");
                summary.record(SkipKind::Vanished);
                continue;
            }

            let last_modified = totals
                .newest_mtime
                .or(signals.dir_mtime)
                .unwrap_or_else(|| UNIX_EPOCH.into());
            let size_mb = self.config.compute_size.then(|| totals.size_mb());

            batch.push(Project::from_signals(
                signals,
                git,
                last_modified,
                size_mb,
                self.now,
                &self.config.classification,
            ));
        }

        batch.sort_by(|a, b| a.path.cmp(&b.path));
        batch
    }
}

/// Checks that the scan root is a readable directory and returns its
/// canonical absolute path.
fn validate_root(root: &Path) -> Result<PathBuf> {
    let meta = fs::metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::path_not_found(root),
        _ => Error::from_io(root, e),
    })?;

    if !meta.is_dir() {
        return Err(Error::not_a_directory(root));
    }

    fs::read_dir(root).map_err(|e| Error::from_io(root, e))?;
    fs::canonicalize(root).map_err(|e| Error::from_io(root, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Classification, GitStatus, ProjectType};
    use chrono::{DateTime, Duration, Utc};
    use std::io::Write;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    fn days_ago(days: u64) -> SystemTime {
        SystemTime::now() - std::time::Duration::from_secs(days * 86_400)
    }

    /// Writes a file of `len` bytes (sparse) with the given mtime.
    fn write_file(path: &Path, len: u64, mtime: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        file.set_len(len).unwrap();
        file.set_modified(mtime).unwrap();
    }

    /// Pins every file under `dir` (including `.git`) to `mtime`.
    fn age_tree(dir: &Path, mtime: SystemTime) {
        for entry in walkdir::WalkDir::new(dir).into_iter().flatten() {
            if entry.file_type().is_file() {
                fs::File::options()
                    .write(true)
                    .open(entry.path())
                    .unwrap()
                    .set_modified(mtime)
                    .unwrap();
            }
        }
    }

    fn init_repo_with_origin(dir: &Path, url: &str) {
        gix::init(dir).unwrap();
        let mut config = fs::OpenOptions::new()
            .append(true)
            .open(dir.join(".git").join("config"))
            .unwrap();
        writeln!(
            config,
            "[remote \"origin\"]\n\turl = {}\n\tfetch = +refs/heads/*:refs/remotes/origin/*",
            url
        )
        .unwrap();
    }

    fn config_for(root: &Path) -> ScanConfig {
        ScanConfig {
            root_path: root.to_path_buf(),
            jobs: Some(2),
            ..ScanConfig::default()
        }
    }

    fn scanner() -> DefaultScanner {
        DefaultScanner::new().with_clock(FixedClock(Utc::now()))
    }

    fn names(report: &ScanReport) -> Vec<&str> {
        report.projects.iter().map(|p| p.name.as_str()).collect()
    }

    fn find<'a>(report: &'a ScanReport, name: &str) -> &'a Project {
        report
            .projects
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("project {} not found", name))
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp = TempDir::new().unwrap();
        let report = scanner().scan(&config_for(temp.path())).unwrap();

        assert!(report.projects.is_empty());
        assert_eq!(report.summary.candidates, 1);
        assert!(!report.summary.cancelled);
    }

    #[test]
    fn test_scan_nonexistent_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = config_for(&temp.path().join("missing"));

        let err = scanner().scan(&config).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn test_scan_file_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let err = scanner().scan(&config_for(&file)).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn test_scan_invalid_pattern_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = ScanConfig {
            ignore_patterns: vec!["[oops".to_string()],
            ..config_for(temp.path())
        };

        assert!(matches!(
            scanner().scan(&config),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_active_and_prunable_scenario() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let proj_a = root.join("proj-a");
        fs::create_dir(&proj_a).unwrap();
        init_repo_with_origin(&proj_a, "https://github.com/user/proj-a.git");
        write_file(&proj_a.join("main.py"), 200, days_ago(5));
        age_tree(&proj_a, days_ago(5));

        let proj_b = root.join("proj-b");
        write_file(&proj_b.join("package.json"), 20, days_ago(200));
        write_file(&proj_b.join("blob.bin"), 15 * MB, days_ago(200));

        let report = scanner().scan(&config_for(root)).unwrap();
        assert_eq!(names(&report), vec!["proj-a", "proj-b"]);

        let a = find(&report, "proj-a");
        assert!(a.has_git);
        assert_eq!(a.git_remote.as_deref(), Some("https://github.com/user/proj-a.git"));
        // main.py was never committed.
        assert_eq!(a.git_status, Some(GitStatus::Dirty));
        assert_eq!(a.classification, Classification::Active);
        assert!(!a.is_prunable);
        assert_eq!(report.summary.git_read_errors, 0);

        let b = find(&report, "proj-b");
        assert!(!b.has_git);
        assert!(b.git_status.is_none());
        assert_eq!(b.project_type, ProjectType::NodeJs);
        assert_eq!(b.classification, Classification::Stale);
        assert!(b.size_mb.unwrap() > 15.0 - 0.01);
        assert!(b.is_prunable);
    }

    #[test]
    fn test_exclude_nested_git_repos() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("outer").join(".git")).unwrap();
        fs::create_dir_all(root.join("outer").join("inner").join(".git")).unwrap();

        let config = ScanConfig {
            exclude_nested_git_repos: true,
            ..config_for(root)
        };
        let report = scanner().scan(&config).unwrap();
        assert_eq!(names(&report), vec!["outer"]);

        let report = scanner().scan(&config_for(root)).unwrap();
        assert_eq!(names(&report), vec!["outer", "inner"]);
    }

    #[test]
    fn test_corrupt_git_is_still_a_project() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("broken").join(".git")).unwrap();

        let report = scanner().scan(&config_for(temp.path())).unwrap();
        let broken = find(&report, "broken");

        assert!(broken.has_git);
        assert!(broken.git_status.is_none());
        assert_eq!(report.summary.git_read_errors, 1);
    }

    #[test]
    fn test_ignored_subtrees_never_appear_or_count() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        write_file(&app.join("Cargo.toml"), 1000, days_ago(400));
        write_file(
            &app.join("node_modules").join("dep").join("package.json"),
            50 * MB,
            days_ago(1),
        );
        write_file(
            &app.join("experimental-x").join("README.md"),
            10,
            days_ago(1),
        );

        let config = ScanConfig {
            ignore_patterns: vec!["experimental-*".to_string()],
            ..config_for(temp.path())
        };
        let report = scanner().scan(&config).unwrap();

        assert_eq!(names(&report), vec!["app"]);
        let app = find(&report, "app");
        assert!(app.size_mb.unwrap() < 0.01);
        // The recent files under ignored directories do not refresh activity.
        assert_eq!(app.classification, Classification::Stale);
        assert!(app.is_prunable);
    }

    #[test]
    fn test_scan_root_can_be_a_project() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("README.md"), "# root").unwrap();

        let report = scanner().scan(&config_for(temp.path())).unwrap();
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].path, fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn test_compute_size_disabled() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("old");
        write_file(&old.join("go.mod"), 10, days_ago(365));
        write_file(&old.join("big.bin"), 20 * MB, days_ago(365));

        let config = ScanConfig {
            compute_size: false,
            ..config_for(temp.path())
        };
        let report = scanner().scan(&config).unwrap();
        let project = find(&report, "old");

        assert!(project.size_mb.is_none());
        assert_eq!(project.classification, Classification::Stale);
        assert!(!project.is_prunable);
    }

    #[test]
    fn test_scan_is_idempotent_and_ordered() {
        let temp = TempDir::new().unwrap();
        for name in ["zeta", "alpha", "mid/nested", "beta"] {
            write_file(&temp.path().join(name).join("setup.py"), 10, days_ago(40));
        }

        let scanner = scanner();
        let serial = ScanConfig {
            jobs: Some(1),
            batch_size: 1,
            ..config_for(temp.path())
        };
        let parallel = ScanConfig {
            jobs: Some(4),
            batch_size: 2,
            ..config_for(temp.path())
        };

        let first = scanner.scan(&serial).unwrap();
        let second = scanner.scan(&parallel).unwrap();
        let third = scanner.scan(&parallel).unwrap();

        assert_eq!(first.projects, second.projects);
        assert_eq!(second, third);
        assert_eq!(names(&first), vec!["alpha", "beta", "nested", "zeta"]);

        let paths: Vec<_> = first.projects.iter().map(|p| &p.path).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_classification_invariants_hold() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_file(&root.join("fresh").join("Gemfile"), 10, days_ago(1));
        write_file(&root.join("doc").join("readme.txt"), 10, days_ago(2));
        write_file(&root.join("old").join("pom.xml"), 10, days_ago(500));
        write_file(&root.join("mid").join("composer.json"), 10, days_ago(90));

        let config = config_for(root);
        let now: DateTime<Utc> = Utc::now();
        let report = DefaultScanner::new()
            .with_clock(FixedClock(now))
            .scan(&config)
            .unwrap();
        assert_eq!(report.projects.len(), 4);

        for p in &report.projects {
            if p.classification == Classification::Wip {
                assert!(p.git_remote.is_none());
                assert!(p.readme_path.is_none());
                assert!(p.age_days(now) <= config.classification.active_days_threshold);
            }
            if p.is_prunable {
                assert_eq!(p.classification, Classification::Stale);
                assert!(p.git_remote.is_none());
            }
            if !p.has_git {
                assert!(p.git_status.is_none());
            }
            if let Some(readme) = &p.readme_path {
                assert!(readme.is_file());
            }
        }

        assert_eq!(find(&report, "fresh").classification, Classification::Wip);
        assert_eq!(find(&report, "doc").classification, Classification::Active);
        assert_eq!(find(&report, "mid").classification, Classification::Dormant);
        assert_eq!(find(&report, "old").classification, Classification::Stale);
    }

    #[test]
    fn test_injected_clock_drives_classification() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("p").join("Cargo.toml"), 10, days_ago(1));

        let later = DefaultScanner::new().with_clock(FixedClock(Utc::now() + Duration::days(100)));
        let report = later.scan(&config_for(temp.path())).unwrap();
        assert_eq!(report.projects[0].classification, Classification::Dormant);
    }

    #[test]
    fn test_cancelled_scan_returns_no_partial_records() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("a").join("go.mod"), 10, days_ago(1));

        let token = CancellationToken::new();
        token.cancel();
        let report = scanner()
            .scan_with_cancel(&config_for(temp.path()), &token)
            .unwrap();

        assert!(report.summary.cancelled);
        assert!(report.projects.is_empty());
    }

    #[test]
    fn test_streaming_batches_match_final_report() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            write_file(
                &temp.path().join(format!("p{}", i)).join("Cargo.toml"),
                10,
                days_ago(3),
            );
        }

        let config = ScanConfig {
            batch_size: 2,
            ..config_for(temp.path())
        };
        let handle = scanner().scan_streaming(config, CancellationToken::new());

        let mut streamed = Vec::new();
        let mut report = None;
        for event in handle.events().iter() {
            match event {
                ScanEvent::Batch(batch) => streamed.extend(batch),
                ScanEvent::Finished(result) => {
                    report = Some(result.unwrap());
                    break;
                }
            }
        }
        let report = report.unwrap();

        streamed.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(streamed, report.projects);
        assert_eq!(report.projects.len(), 5);
    }

    #[test]
    fn test_streaming_wait_returns_report() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("x").join("go.mod"), 10, days_ago(3));

        let handle = scanner().scan_streaming(config_for(temp.path()), CancellationToken::new());
        let report = handle.wait().unwrap();
        assert_eq!(names(&report), vec!["x"]);
    }

    #[test]
    fn test_vanished_candidate_is_soft() {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let gone = root.join("gone");
        write_file(&gone.join("go.mod"), 10, days_ago(1));

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let config = config_for(&root);
        let cancel = CancellationToken::new();
        let ctx = ScanContext {
            root: &root,
            probe: SignalProbe::new(&root, &matcher),
            config: &config,
            cancel: &cancel,
            now: Utc::now(),
        };
        let candidate = Candidate {
            path: gone.clone(),
            depth: 1,
            has_git: false,
            boundary: false,
        };

        // Probed, then pruned before its subtree closed.
        let outcome = ctx.process(&candidate);
        assert!(outcome.detected.is_some());
        let mut fold = SubtreeFold::default();
        let mut done = Vec::new();
        fold.push(outcome, &mut done);
        fold.finish(&mut done);

        crate::prune::delete_project_directory(&gone).unwrap();
        let mut summary = ScanSummary::default();
        assert!(ctx.complete(done, &mut summary).is_empty());
        assert_eq!(summary.vanished, 1);

        // Pruned after the walker yielded it, before a worker probed it.
        let outcome = ctx.process(&candidate);
        assert!(outcome.detected.is_none());
        assert_eq!(outcome.summary.vanished, 1);
    }

    fn stats(size_bytes: u64) -> DirStats {
        DirStats {
            size_bytes,
            files: 1,
            ..DirStats::default()
        }
    }

    fn outcome(path: &str, depth: usize, size_bytes: u64, project: bool) -> Outcome {
        let detected = project.then(|| Detected {
            signals: RawSignals {
                path: PathBuf::from(path),
                has_git: false,
                project_type: ProjectType::Unknown,
                readme_path: None,
                local: stats(size_bytes),
                dir_mtime: None,
                skipped_entries: 0,
            },
            git: None,
        });
        Outcome {
            depth,
            stats: stats(size_bytes),
            detected,
            summary: ScanSummary::default(),
        }
    }

    fn completed(done: &[Completed]) -> Vec<(String, u64)> {
        done.iter()
            .map(|c| {
                (
                    c.detected.signals.path.display().to_string(),
                    c.totals.size_bytes,
                )
            })
            .collect()
    }

    #[test]
    fn test_fold_closes_subtrees_in_walk_order() {
        let mut fold = SubtreeFold::default();
        let mut done = Vec::new();

        fold.push(outcome("/r", 0, 1, true), &mut done);
        fold.push(outcome("/r/a", 1, 10, true), &mut done);
        fold.push(outcome("/r/a/x", 2, 100, false), &mut done);
        fold.push(outcome("/r/a/x/y", 3, 1000, true), &mut done);
        assert!(done.is_empty());

        // A sibling at depth 1 closes everything under /r/a.
        fold.push(outcome("/r/b", 1, 10_000, false), &mut done);
        assert_eq!(
            completed(&done),
            vec![("/r/a/x/y".to_string(), 1000), ("/r/a".to_string(), 1110)]
        );

        done.clear();
        fold.finish(&mut done);
        assert_eq!(completed(&done), vec![("/r".to_string(), 11_111)]);
        assert!(fold.open.is_empty());
    }

    #[test]
    fn test_recent_nested_file_counts_without_size() {
        let temp = TempDir::new().unwrap();
        let proj = temp.path().join("proj");
        write_file(&proj.join("Cargo.toml"), 10, days_ago(400));
        write_file(&proj.join("src").join("main.rs"), 10, days_ago(0));

        for compute_size in [false, true] {
            let config = ScanConfig {
                compute_size,
                ..config_for(temp.path())
            };
            let report = scanner().scan(&config).unwrap();
            let p = find(&report, "proj");

            assert_eq!(p.classification, Classification::Wip);
            assert_eq!(p.size_mb.is_some(), compute_size);
        }
    }

    #[test]
    fn test_nested_project_totals_roll_up() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("outer");
        write_file(&outer.join("README.md"), MB, days_ago(300));
        write_file(&outer.join("inner").join("Cargo.toml"), 2 * MB, days_ago(2));

        let report = scanner().scan(&config_for(temp.path())).unwrap();
        let outer = find(&report, "outer");
        let inner = find(&report, "inner");

        assert_eq!(outer.size_mb, Some(3.0));
        assert_eq!(inner.size_mb, Some(2.0));
        assert_eq!(outer.last_modified, inner.last_modified);
        assert_eq!(outer.classification, Classification::Active);
    }

    #[test]
    fn test_excluded_nested_repo_counts_toward_parent() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("outer");
        fs::create_dir_all(outer.join(".git")).unwrap();
        write_file(&outer.join("README.md"), MB, days_ago(300));
        fs::create_dir_all(outer.join("inner").join(".git")).unwrap();
        write_file(&outer.join("inner").join("data.bin"), 2 * MB, days_ago(2));

        let config = ScanConfig {
            exclude_nested_git_repos: true,
            ..config_for(temp.path())
        };
        let report = scanner().scan(&config).unwrap();

        assert_eq!(names(&report), vec!["outer"]);
        let outer = find(&report, "outer");
        assert_eq!(outer.size_mb, Some(3.0));
        assert!(outer.age_days(Utc::now()) <= 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_counted_once() {
        use std::os::unix::fs::PermissionsExt;

        // SAFETY: geteuid has no preconditions and cannot fail.
        if unsafe { libc::geteuid() } == 0 {
            // Permission bits do not stop root.
            return;
        }

        let temp = TempDir::new().unwrap();
        let proj = temp.path().join("proj");
        write_file(&proj.join("Cargo.toml"), 10, days_ago(1));
        let locked = proj.join("locked");
        write_file(&locked.join("secret.txt"), 10, days_ago(1));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = scanner().scan(&config_for(temp.path()));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let report = result.unwrap();

        assert_eq!(names(&report), vec!["proj"]);
        assert_eq!(report.summary.skipped_permission, 1);
        assert_eq!(report.summary.vanished, 0);
    }

    #[test]
    fn test_dirty_status_not_reported_without_git() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("plain").join("go.mod"), 10, days_ago(3));

        let report = scanner().scan(&config_for(temp.path())).unwrap();
        let plain = find(&report, "plain");
        assert_ne!(plain.git_status, Some(GitStatus::Dirty));
        assert!(plain.git_status.is_none());
    }
}
