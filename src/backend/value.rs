//! Raw access to cgroup control files.
//!
//! Every read and write of a kernel knob goes through [`write_value`] and
//! [`read_value`], so the mapping of I/O failures onto [`CgroupError`] lives
//! in one place.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;

use nix::errno::Errno;

use super::{CgroupError, Result};
use crate::stats::StatParseError;

/// Truncates the file at `path` and writes `value` to it.
///
/// The file is never created: cgroupfs provides every valid control file,
/// so a missing file means the group or the controller does not exist.
///
/// # Errors
///
/// - [`CgroupError::FileNotFound`] if `path` does not exist.
/// - [`CgroupError::InvalidValue`] if the kernel rejects the value (`EINVAL`).
/// - [`CgroupError::Write`] for any other failure.
pub fn write_value(path: &Path, value: &str) -> Result<()> {
    log::debug!("Set value `{}` to `{}`", path.display(), value);

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| {
            map_open_error(path, source, |path, source| CgroupError::Write { path, source })
        })?;

    file.write_all(value.as_bytes()).map_err(|source| {
        if source.raw_os_error() == Some(Errno::EINVAL as i32) {
            CgroupError::InvalidValue {
                key: key_of(path),
                value: value.to_owned(),
            }
        } else {
            CgroupError::Write {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Reads the first line of the file at `path`.
///
/// Content after a NUL byte is ignored and a single trailing newline is
/// stripped.
///
/// # Errors
///
/// - [`CgroupError::FileNotFound`] if `path` does not exist.
/// - [`CgroupError::Read`] for any other failure.
pub fn read_value(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| {
        map_open_error(path, source, |path, source| CgroupError::Read { path, source })
    })?;

    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(|source| CgroupError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(nul) = line.find('\0') {
        line.truncate(nul);
    }
    if line.ends_with('\n') {
        line.pop();
    }

    log::trace!("Get value `{}` => `{}`", path.display(), line);
    Ok(line)
}

/// Parses a trimmed numeric value read from `path`.
pub fn parse_number<T>(path: &Path, value: &str) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    value.trim().parse::<T>().map_err(|source| CgroupError::Parse {
        path: path.to_path_buf(),
        value: value.to_owned(),
        source: StatParseError::InvalidKeyValue {
            key: key_of(path),
            value: value.to_owned(),
            line: 1,
            source,
        },
    })
}

fn map_open_error(
    path: &Path,
    source: io::Error,
    other: impl FnOnce(std::path::PathBuf, io::Error) -> CgroupError,
) -> CgroupError {
    if source.kind() == io::ErrorKind::NotFound {
        CgroupError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        other(path.to_path_buf(), source)
    }
}

fn key_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
