//! Git repository introspection using gitoxide.
//!
//! Given a directory known to contain `.git`, extracts the preferred remote
//! URL and the working-tree state. Unreadable repositories degrade to an
//! unknown status instead of failing the caller.

use crate::error::{Error, Result};
use crate::models::GitStatus;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Remote preferred over all others when present.
pub const PREFERRED_REMOTE: &str = "origin";

/// A configured remote and its fetch URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    /// The name of the remote (e.g., "origin", "upstream").
    pub name: String,
    /// The fetch URL.
    pub url: String,
}

/// Git facts for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitMetadata {
    /// Whether any remote with a URL is configured.
    pub has_remote: bool,
    /// URL of `origin`, else of the first remote in configuration order.
    pub remote_url: Option<String>,
    /// Working-tree state, `None` when it could not be determined.
    pub status: Option<GitStatus>,
    /// Set when some git metadata could not be read.
    pub degraded: bool,
}

impl GitMetadata {
    /// Metadata for a repository that could not be opened at all.
    pub fn unreadable() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

/// Inspects the repository at `repo_path`, never failing.
///
/// Open or read failures are logged and reflected as `degraded` with an
/// unknown status; the remote URL is kept if it was readable.
pub fn inspect(repo_path: &Path) -> GitMetadata {
    let repo = match gix::open(repo_path).map_err(|e| Error::git_open(repo_path, e)) {
        Ok(repo) => repo,
        Err(e) => {
            warn!(path = %repo_path.display(), error = %e, "Unreadable git metadata");
            return GitMetadata::unreadable();
        }
    };

    let remotes = remote_urls(&repo);
    let remote_url = preferred_remote(&remotes).map(|r| r.url.clone());
    let has_remote = !remotes.is_empty();

    match working_tree_status(&repo, repo_path, has_remote) {
        Ok(status) => GitMetadata {
            has_remote,
            remote_url,
            status: Some(status),
            degraded: false,
        },
        Err(e) => {
            warn!(path = %repo_path.display(), error = %e, "Could not determine git status");
            GitMetadata {
                has_remote,
                remote_url,
                status: None,
                degraded: true,
            }
        }
    }
}

/// Configured remotes with a fetch URL, in the order their sections appear
/// in the configuration.
///
/// Remotes that fail to load or have no fetch URL are skipped.
fn remote_urls(repo: &gix::Repository) -> Vec<RemoteUrl> {
    let config = repo.config_snapshot();
    let mut seen = HashSet::new();
    let mut remotes = Vec::new();

    let sections = config.plumbing().sections_by_name("remote").into_iter().flatten();
    for name in sections.filter_map(|s| s.header().subsection_name()) {
        let name = name.to_string();
        if !seen.insert(name.clone()) {
            continue;
        }

        match repo.find_remote(name.as_str()) {
            Ok(remote) => {
                if let Some(url) = remote.url(gix::remote::Direction::Fetch) {
                    remotes.push(RemoteUrl {
                        name,
                        url: url.to_bstring().to_string(),
                    });
                }
            }
            Err(e) => {
                debug!(remote = %name, error = %e, "Skipping unloadable remote");
            }
        }
    }

    remotes
}

/// Picks `origin` if configured, otherwise the first remote.
pub fn preferred_remote(remotes: &[RemoteUrl]) -> Option<&RemoteUrl> {
    remotes
        .iter()
        .find(|r| r.name == PREFERRED_REMOTE)
        .or_else(|| remotes.first())
}

/// Applies the status precedence: dirty, then no remote, then unpushed, then clean.
pub fn resolve_status(dirty: bool, has_remote: bool, ahead: bool) -> GitStatus {
    if dirty {
        GitStatus::Dirty
    } else if !has_remote {
        GitStatus::NoRemote
    } else if ahead {
        GitStatus::Unpushed
    } else {
        GitStatus::Clean
    }
}

fn working_tree_status(
    repo: &gix::Repository,
    repo_path: &Path,
    has_remote: bool,
) -> Result<GitStatus> {
    let dirty = has_uncommitted_changes(repo, repo_path)?;

    // Dirty and remote-less repositories never need the ahead check.
    if dirty || !has_remote {
        return Ok(resolve_status(dirty, has_remote, false));
    }

    let ahead = has_unpushed_commits(repo, repo_path)?;
    Ok(resolve_status(dirty, has_remote, ahead))
}

/// Whether anything in the working tree or index is not committed: staged or
/// unstaged changes to tracked files, or untracked files that are not ignored.
fn has_uncommitted_changes(repo: &gix::Repository, repo_path: &Path) -> Result<bool> {
    let read_err = |e: &dyn std::fmt::Display| Error::git_read(repo_path, e.to_string());

    let head = repo.head().map_err(|e| read_err(&e))?;
    let tracked = if head.is_unborn() {
        // No commit to compare against: anything staged is uncommitted.
        let index = repo.index_or_empty().map_err(|e| read_err(&e))?;
        !index.entries().is_empty()
    } else {
        repo.is_dirty().map_err(|e| read_err(&e))?
    };
    if tracked {
        return Ok(true);
    }

    let changes = repo
        .status(gix::progress::Discard)
        .map_err(|e| read_err(&e))?
        .untracked_files(gix::status::UntrackedFiles::Files)
        .index_worktree_submodules(None)
        .into_index_worktree_iter(Vec::new())
        .map_err(|e| read_err(&e))?;

    for item in changes {
        let item = item.map_err(|e| read_err(&e))?;
        if let gix::status::index_worktree::Item::DirectoryContents { entry, .. } = item {
            if entry.status == gix::dir::entry::Status::Untracked {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Whether HEAD has commits not reachable from its upstream branch.
///
/// Detached HEADs, unborn branches, and branches without an upstream are
/// reported as not ahead.
fn has_unpushed_commits(repo: &gix::Repository, repo_path: &Path) -> Result<bool> {
    let Some(head_name) = repo
        .head_name()
        .map_err(|e| Error::git_read(repo_path, e.to_string()))?
    else {
        return Ok(false);
    };

    let tracking = match repo
        .branch_remote_tracking_ref_name(head_name.as_ref(), gix::remote::Direction::Fetch)
    {
        Some(result) => result.map_err(|e| Error::git_read(repo_path, e.to_string()))?,
        None => return Ok(false),
    };

    let Some(upstream) = repo
        .try_find_reference(&*tracking)
        .map_err(|e| Error::git_read(repo_path, e.to_string()))?
    else {
        return Ok(false);
    };
    let upstream_id = upstream
        .into_fully_peeled_id()
        .map_err(|e| Error::git_read(repo_path, e.to_string()))?;

    let Ok(head_id) = repo.head_id() else {
        return Ok(false);
    };

    let mut walk = repo
        .rev_walk([head_id.detach()])
        .with_hidden([upstream_id.detach()])
        .all()
        .map_err(|e| Error::git_read(repo_path, e.to_string()))?;

    let first = walk
        .next()
        .transpose()
        .map_err(|e| Error::git_read(repo_path, e.to_string()))?;
    Ok(first.is_some())
}
