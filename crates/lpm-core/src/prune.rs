//! Project directory deletion.
//!
//! Deletion is irreversible and unconfirmed here; callers own any prompts.
//! The directory is first checked for removability, then atomically moved
//! aside and removed, so the project path either disappears entirely or is
//! left as it was.
//!
//! The removability check asks the operating system whether the current user
//! may modify each directory, which covers ownership and group bits. It is
//! best effort: sticky directories, immutable flags and concurrent changes
//! can still make removal fail part way, and the tombstone is then renamed
//! back.

use crate::error::DeletionError;
use crate::models::{Project, ScanReport};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

type DeleteResult<T> = std::result::Result<T, DeletionError>;

/// Recursively removes the project directory at `path`.
///
/// # Errors
///
/// - [`DeletionError::NotFound`] if nothing exists at `path`
/// - [`DeletionError::SymlinkRefused`] if `path` is a symbolic link
/// - [`DeletionError::NotADirectory`] if `path` is a file
/// - [`DeletionError::PermissionDenied`] if any part of the tree cannot be removed
pub fn delete_project_directory(path: &Path) -> DeleteResult<()> {
    delete_with(path, |p| fs::remove_dir_all(p))
}

fn delete_with(path: &Path, remove: impl FnOnce(&Path) -> io::Result<()>) -> DeleteResult<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| DeletionError::from_io(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(DeletionError::SymlinkRefused(path.to_path_buf()));
    }
    if !meta.is_dir() {
        return Err(DeletionError::NotADirectory(path.to_path_buf()));
    }

    check_removable(path)?;

    let tombstone = tombstone_path(path)?;
    fs::rename(path, &tombstone).map_err(|e| DeletionError::from_io(path, e))?;

    if let Err(e) = remove(&tombstone) {
        warn!(path = %path.display(), error = %e, "Removal failed, restoring directory");
        if let Err(restore) = fs::rename(&tombstone, path) {
            warn!(
                path = %path.display(),
                tombstone = %tombstone.display(),
                error = %restore,
                "Could not restore directory"
            );
        }
        return Err(DeletionError::from_io(path, e));
    }

    info!(path = %path.display(), "Project directory deleted");
    Ok(())
}

/// Every directory in the tree, and the parent, must be listable and
/// writable by the current user.
fn check_removable(path: &Path) -> DeleteResult<()> {
    if let Some(parent) = path.parent() {
        fs::metadata(parent).map_err(|e| DeletionError::from_io(path, e))?;
        if !can_modify(parent) {
            return Err(DeletionError::PermissionDenied(path.to_path_buf()));
        }
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop"));
            DeletionError::from_io(path, io)
        })?;

        if entry.file_type().is_dir() && !can_modify(entry.path()) {
            return Err(DeletionError::PermissionDenied(entry.path().to_path_buf()));
        }
    }

    Ok(())
}

/// Whether the current user may list, enter, and change entries of `dir`.
#[cfg(unix)]
fn can_modify(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK | libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn can_modify(dir: &Path) -> bool {
    fs::metadata(dir).is_ok_and(|m| !m.permissions().readonly())
}

fn tombstone_path(path: &Path) -> DeleteResult<PathBuf> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(DeletionError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "cannot delete a filesystem root"),
        });
    };

    Ok(parent.join(format!(
        ".{}.lpm-deleting-{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}

impl ScanReport {
    /// Deletes the project at `path` from disk and drops its record.
    ///
    /// Other records are left untouched, including ones nested beneath the
    /// deleted directory; they disappear on the next scan.
    pub fn prune(&mut self, path: &Path) -> DeleteResult<Option<Project>> {
        delete_project_directory(path)?;

        let removed = self
            .projects
            .iter()
            .position(|p| p.path == path)
            .map(|i| self.projects.remove(i));
        Ok(removed)
    }
}
