//! Project classification and prune eligibility.
//!
//! Everything here is a pure function of its inputs: the same signals,
//! timestamps, and thresholds always produce the same result.

use crate::git_analyzer::GitMetadata;
use crate::models::{Classification, ClassificationConfig, Project};
use crate::probe::RawSignals;
use chrono::{DateTime, Utc};

/// Applies the age rule table.
///
/// 1. Within the active window with a remote or README: `Active`.
/// 2. Within the active window with neither: `Wip`.
/// 3. Within the dormant window: `Dormant`.
/// 4. Older: `Stale`.
///
/// Age is counted in whole days, so a project exactly
/// `active_days_threshold` days old is still in the active window.
pub fn classify(
    last_modified: DateTime<Utc>,
    has_remote: bool,
    has_readme: bool,
    now: DateTime<Utc>,
    config: &ClassificationConfig,
) -> Classification {
    let age_days = (now - last_modified).num_days();

    if age_days <= config.active_days_threshold {
        if has_remote || has_readme {
            Classification::Active
        } else {
            Classification::Wip
        }
    } else if age_days <= config.dormant_days_threshold {
        Classification::Dormant
    } else {
        Classification::Stale
    }
}

/// Whether a project is a prune candidate.
///
/// Only stale, remote-less projects qualify, and only when they are either
/// larger than `prunable_min_size_mb` or smaller than `prunable_max_size_mb`.
/// A missing size never qualifies.
pub fn is_prunable(
    classification: Classification,
    has_remote: bool,
    size_mb: Option<f64>,
    config: &ClassificationConfig,
) -> bool {
    if classification != Classification::Stale || has_remote {
        return false;
    }

    match size_mb {
        Some(size) => size > config.prunable_min_size_mb || size < config.prunable_max_size_mb,
        None => false,
    }
}

/// Classifies a directory from its probe signals and git metadata.
pub fn evaluate(
    signals: &RawSignals,
    git: Option<&GitMetadata>,
    last_modified: DateTime<Utc>,
    size_mb: Option<f64>,
    now: DateTime<Utc>,
    config: &ClassificationConfig,
) -> (Classification, bool) {
    let has_remote = signals.has_git && git.is_some_and(|g| g.remote_url.is_some());
    let classification = classify(
        last_modified,
        has_remote,
        signals.readme_path.is_some(),
        now,
        config,
    );
    let prunable = is_prunable(classification, has_remote, size_mb, config);
    (classification, prunable)
}

/// Recomputes the derived fields of `project` without touching the filesystem.
///
/// Used after a threshold change; every other field is carried over.
pub fn reclassify(project: Project, now: DateTime<Utc>, config: &ClassificationConfig) -> Project {
    let has_remote = project.git_remote.is_some();
    let classification = classify(
        project.last_modified,
        has_remote,
        project.readme_path.is_some(),
        now,
        config,
    );
    let is_prunable = is_prunable(classification, has_remote, project.size_mb, config);

    Project {
        classification,
        is_prunable,
        ..project
    }
}

impl Project {
    /// Builds the final immutable record for one project root.
    pub fn from_signals(
        signals: RawSignals,
        git: Option<GitMetadata>,
        last_modified: DateTime<Utc>,
        size_mb: Option<f64>,
        now: DateTime<Utc>,
        config: &ClassificationConfig,
    ) -> Self {
        let (classification, is_prunable) =
            evaluate(&signals, git.as_ref(), last_modified, size_mb, now, config);

        let git = if signals.has_git { git } else { None };
        let name = signals
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| signals.path.display().to_string());

        Project {
            name,
            has_git: signals.has_git,
            git_remote: git.as_ref().and_then(|g| g.remote_url.clone()),
            git_status: git.as_ref().and_then(|g| g.status),
            readme_path: signals.readme_path,
            project_type: signals.project_type,
            last_modified,
            size_mb,
            classification,
            is_prunable,
            path: signals.path,
        }
    }
}
