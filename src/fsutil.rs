use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{Gid, Uid};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when changing the owner of a path fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to change owner of `{path}`: {source}")]
pub struct ChownError {
    pub path: PathBuf,
    #[source]
    pub source: Errno,
}

/// Error that occurs when removing a directory tree fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to remove `{path}`: {source}")]
pub struct RemoveError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cgroup_limits::fsutil;
/// let reader = fsutil::open_file_reader("/proc/mounts")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Changes the owner of every regular file directly inside `dir`, then of
/// `dir` itself. Stops at the first failure.
///
/// # Errors
///
/// Returns a [`ChownError`] naming the offending path.
pub fn chown_dir_and_files(dir: &Path, uid: Uid, gid: Gid) -> Result<(), ChownError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ChownError {
        path: dir.to_path_buf(),
        source: io_to_errno(&source),
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| ChownError {
            path: dir.to_path_buf(),
            source: io_to_errno(&source),
        })?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        log::trace!("chown {}:{} {}", uid, gid, path.display());
        nix::unistd::chown(&path, Some(uid), Some(gid))
            .map_err(|source| ChownError { path, source })?;
    }

    nix::unistd::chown(dir, Some(uid), Some(gid)).map_err(|source| ChownError {
        path: dir.to_path_buf(),
        source,
    })
}

/// Removes a directory tree depth first, returning the number of removed
/// directories. A missing `dir` is not an error.
///
/// On cgroupfs a directory is removed with `rmdir` while its control files
/// are still listed, so regular files are only unlinked when `rmdir`
/// reports the directory as not empty (ordinary filesystems).
///
/// # Errors
///
/// Returns a [`RemoveError`] naming the path that could not be removed.
pub fn remove_dir_tree(dir: &Path) -> Result<usize, RemoveError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(RemoveError {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|source| RemoveError {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            removed += remove_dir_tree(&entry.path())?;
        }
    }

    match std::fs::remove_dir(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::DirectoryNotEmpty => {
            remove_files(dir)?;
            std::fs::remove_dir(dir).map_err(|source| RemoveError {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Err(source) => {
            return Err(RemoveError {
                path: dir.to_path_buf(),
                source,
            });
        }
    }

    Ok(removed + 1)
}

fn remove_files(dir: &Path) -> Result<(), RemoveError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RemoveError {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| RemoveError {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        std::fs::remove_file(&path).map_err(|source| RemoveError { path, source })?;
    }
    Ok(())
}

fn io_to_errno(err: &io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}
