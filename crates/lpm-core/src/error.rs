//! Error types for lpm-core.
//!
//! This module defines the library's error taxonomy using `thiserror`. Fatal
//! errors ([`Error`]) are returned from scan entry points; per-candidate
//! failures are tallied as [`SkipKind`] instead of being propagated, and
//! prune failures use their own [`DeletionError`].

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized Result type for lpm-core operations.
///
/// # Example
///
/// ```
/// use lpm_core::Result;
///
/// fn detect() -> Result<bool> {
///     Ok(true)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning, probing, or configuring.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred while accessing the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to open a Git repository.
    #[error("Failed to open Git repository at {path}: {source}")]
    GitOpen {
        /// The path to the repository that couldn't be opened.
        path: PathBuf,
        /// The underlying gitoxide error.
        #[source]
        source: Box<gix::open::Error>,
    },

    /// Git metadata was found but could not be read (config, refs, index, worktree).
    #[error("Failed to read Git metadata for {path}: {message}")]
    GitRead {
        /// The repository path where reading failed.
        path: PathBuf,
        /// A descriptive error message.
        message: String,
    },

    /// A required path does not exist.
    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Permission was denied while reading a path.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path disappeared while it was being scanned.
    #[error("Path vanished during scan: {0}")]
    Vanished(PathBuf),

    /// An ignore pattern is not a valid glob.
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern as written by the user.
        pattern: String,
        /// The underlying globset error.
        #[source]
        source: globset::Error,
    },

    /// The configuration file was readable but semantically invalid.
    #[error("Invalid configuration in {path}: {message}")]
    Config {
        /// The configuration file path.
        path: PathBuf,
        /// A descriptive error message.
        message: String,
    },

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

// Helper constructors for common error cases
impl Error {
    /// Creates a GitOpen error.
    pub fn git_open(path: impl Into<PathBuf>, source: gix::open::Error) -> Self {
        Error::GitOpen {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Creates a GitRead error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// repo.is_dirty().map_err(|e| Error::git_read(path, e.to_string()))?;
    /// ```
    pub fn git_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::GitRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a PathNotFound error.
    pub fn path_not_found(path: impl Into<PathBuf>) -> Self {
        Error::PathNotFound(path.into())
    }

    /// Creates a NotADirectory error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Error::NotADirectory(path.into())
    }

    /// Creates an InvalidPattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: globset::Error) -> Self {
        Error::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Creates a Config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an Other error.
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other(message.into())
    }

    /// Maps an I/O error on `path` onto the scan taxonomy.
    ///
    /// `NotFound` becomes [`Error::Vanished`] and `PermissionDenied` becomes
    /// [`Error::PermissionDenied`]; anything else stays an [`Error::Io`].
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::Vanished(path.into()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.into()),
            _ => Error::Io(err),
        }
    }

    /// The soft-error bucket this error falls into when it happens to a
    /// single candidate rather than the scan root.
    pub fn skip_kind(&self) -> SkipKind {
        match self {
            Error::Vanished(_) | Error::PathNotFound(_) => SkipKind::Vanished,
            Error::GitOpen { .. } | Error::GitRead { .. } => SkipKind::GitRead,
            Error::Io(e) if e.kind() == io::ErrorKind::NotFound => SkipKind::Vanished,
            _ => SkipKind::Permission,
        }
    }
}

/// Category of a non-fatal, per-candidate failure.
///
/// These never abort a scan; they are counted in
/// [`ScanSummary`](crate::models::ScanSummary) so that data loss is visible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// An entry or subtree could not be read.
    Permission,
    /// The path was removed while the scan was running.
    Vanished,
    /// Git metadata was present but unreadable.
    GitRead,
}

/// Errors returned by [`delete_project_directory`](crate::prune::delete_project_directory).
///
/// A deletion either removes the whole directory or leaves it in place.
#[derive(Error, Debug)]
pub enum DeletionError {
    /// Nothing exists at the given path.
    #[error("Project directory does not exist: {0}")]
    NotFound(PathBuf),

    /// The path exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The path is a symbolic link; links are never followed for deletion.
    #[error("Refusing to delete through symbolic link: {0}")]
    SymlinkRefused(PathBuf),

    /// The directory (or its parent) is not writable.
    #[error("Permission denied deleting {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O failure. The directory was restored to its original path.
    #[error("Failed to delete {path}: {source}")]
    Io {
        /// The project path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl DeletionError {
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => DeletionError::NotFound(path),
            io::ErrorKind::PermissionDenied => DeletionError::PermissionDenied(path),
            _ => DeletionError::Io { path, source: err },
        }
    }
}
