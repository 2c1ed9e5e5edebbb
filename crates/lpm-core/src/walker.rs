//! Candidate directory enumeration.
//!
//! The walker yields every non-ignored directory under the scan root,
//! including the root itself. Ignored directories are pruned with their whole
//! subtree, `.git` folders are never entered, and symbolic links are not
//! followed.

use crate::error::{Error, Result};
use crate::ignore::IgnoreMatcher;
use crate::probe::{has_git_marker, GIT_DIR};
use crate::scanner::CancellationToken;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A directory the orchestrator should probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Depth below the scan root (root is 0).
    pub depth: usize,
    /// Whether a `.git` directory or file sits directly inside it.
    pub has_git: bool,
    /// The walk stopped here because of `exclude_nested_git_repos`; nothing
    /// below this directory is yielded.
    pub boundary: bool,
}

/// Configured tree walk over one scan root.
///
/// [`TreeWalker::candidates`] starts a fresh traversal on every call.
#[derive(Debug, Clone)]
pub struct TreeWalker<'a> {
    root: PathBuf,
    matcher: &'a IgnoreMatcher,
    exclude_nested_git_repos: bool,
    cancel: Option<CancellationToken>,
}

impl<'a> TreeWalker<'a> {
    /// Creates a walker rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, matcher: &'a IgnoreMatcher) -> Self {
        Self {
            root: root.into(),
            matcher,
            exclude_nested_git_repos: false,
            cancel: None,
        }
    }

    /// Treat directories containing `.git` as boundaries: they are yielded
    /// but not descended into.
    pub fn with_exclude_nested_git_repos(mut self, exclude: bool) -> Self {
        self.exclude_nested_git_repos = exclude;
        self
    }

    /// Stop yielding once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The scan root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a new traversal.
    ///
    /// Unreadable directories surface as `Err` items
    /// ([`Error::PermissionDenied`], [`Error::Vanished`]) and iteration
    /// continues past them.
    pub fn candidates(&self) -> Candidates<'_> {
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Candidates {
            walker: self,
            inner,
        }
    }
}

/// Lazy candidate sequence produced by [`TreeWalker::candidates`].
pub struct Candidates<'w> {
    walker: &'w TreeWalker<'w>,
    inner: walkdir::IntoIter,
}

impl Candidates<'_> {
    fn is_cancelled(&self) -> bool {
        self.walker
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl Iterator for Candidates<'_> {
    type Item = Result<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.is_cancelled() {
                return None;
            }

            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(walk_error(e))),
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();

            if entry.depth() > 0 {
                if entry.file_name() == GIT_DIR {
                    self.inner.skip_current_dir();
                    continue;
                }

                let rel = path.strip_prefix(&self.walker.root).unwrap_or(path);
                if self.walker.matcher.should_ignore(path, rel, true) {
                    debug!(path = %path.display(), "Ignoring subtree");
                    self.inner.skip_current_dir();
                    continue;
                }
            }

            let has_git = has_git_marker(path);
            let boundary = has_git && self.walker.exclude_nested_git_repos;
            if boundary {
                self.inner.skip_current_dir();
            }

            return Some(Ok(Candidate {
                path: path.to_path_buf(),
                depth: entry.depth(),
                has_git,
                boundary,
            }));
        }
    }
}

fn walk_error(err: walkdir::Error) -> Error {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    match err.into_io_error() {
        Some(io) => Error::from_io(path, io),
        None => Error::other(format!("Filesystem loop at {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rel_paths(walker: &TreeWalker<'_>) -> Vec<String> {
        walker
            .candidates()
            .filter_map(|c| c.ok())
            .map(|c| {
                c.path
                    .strip_prefix(walker.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    fn tree(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    #[test]
    fn test_yields_root_and_subdirectories() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["a/b", "c"]);
        fs::write(temp.path().join("a").join("file.txt"), "").unwrap();

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        assert_eq!(rel_paths(&walker), vec!["", "a", "a/b", "c"]);
    }

    #[test]
    fn test_ignored_subtrees_are_pruned() {
        let temp = TempDir::new().unwrap();
        tree(
            temp.path(),
            &["app/node_modules/pkg/deep", "app/src", "experimental-x/inner"],
        );

        let matcher = IgnoreMatcher::new(&["experimental-*".to_string()], false).unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        let paths = rel_paths(&walker);

        assert_eq!(paths, vec!["", "app", "app/src"]);
    }

    #[test]
    fn test_git_dir_is_not_a_candidate() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["repo/.git/objects"]);

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        let candidates: Vec<_> = walker.candidates().map(|c| c.unwrap()).collect();

        assert_eq!(candidates.len(), 2);
        assert!(candidates[1].has_git);
        assert!(!candidates[0].has_git);
    }

    #[test]
    fn test_nested_repos_included_by_default() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["outer/.git", "outer/inner/.git"]);

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        assert_eq!(rel_paths(&walker), vec!["", "outer", "outer/inner"]);
    }

    #[test]
    fn test_nested_repos_excluded() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["outer/.git", "outer/inner/.git", "outer/src"]);

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher).with_exclude_nested_git_repos(true);
        assert_eq!(rel_paths(&walker), vec!["", "outer"]);

        let candidates: Vec<_> = walker.candidates().map(|c| c.unwrap()).collect();
        assert!(!candidates[0].boundary);
        assert!(candidates[1].boundary);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_git_does_not_stop_the_walk() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["elsewhere", "proj/src"]);
        std::os::unix::fs::symlink(
            temp.path().join("elsewhere"),
            temp.path().join("proj").join(GIT_DIR),
        )
        .unwrap();

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher).with_exclude_nested_git_repos(true);
        let candidates: Vec<_> = walker.candidates().map(|c| c.unwrap()).collect();

        let proj = candidates
            .iter()
            .find(|c| c.path.ends_with("proj"))
            .unwrap();
        assert!(!proj.has_git);
        assert!(!proj.boundary);
        assert!(candidates.iter().any(|c| c.path.ends_with("proj/src")));
    }

    #[test]
    fn test_traversal_is_restartable() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["x/y", "z"]);

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        assert_eq!(rel_paths(&walker), rel_paths(&walker));
    }

    #[test]
    fn test_cancelled_walker_yields_nothing() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["a", "b"]);

        let token = CancellationToken::new();
        token.cancel();
        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher).with_cancellation(token);
        assert_eq!(walker.candidates().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = TempDir::new().unwrap();
        tree(temp.path(), &["real/sub"]);
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();
        // A cycle back to the root must not hang the walk.
        std::os::unix::fs::symlink(temp.path(), temp.path().join("real").join("loop")).unwrap();

        let matcher = IgnoreMatcher::with_defaults().unwrap();
        let walker = TreeWalker::new(temp.path(), &matcher);
        assert_eq!(rel_paths(&walker), vec!["", "real", "real/sub"]);
    }
}
