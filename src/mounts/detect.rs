use std::io::BufRead;
use std::ops::ControlFlow;
use std::path::Path;

use super::parser::{MountEntry, is_ignorable_line, parse_mount_line};
use super::{Error, Result};
use crate::controller::{BackendType, Controller};
use crate::fsutil;

/// File listing the controllers available in a v2 cgroup.
pub const CGROUP_CONTROLLERS_FILE: &str = "cgroup.controllers";

/// Visits every entry of a mount table file in table order.
///
/// The visitor returns [`ControlFlow::Break`] to stop the scan early.
///
/// # Arguments
///
/// * `path` - Path to a mount table file (e.g., `/proc/mounts`).
/// * `visit` - Callback invoked once per parsed entry.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if parsing any line fails.
pub fn scan_mounts<F>(path: impl AsRef<Path>, visit: F) -> Result<()>
where
    F: FnMut(&MountEntry<'_>) -> ControlFlow<()>,
{
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    scan_mounts_from_reader(buf, path, visit)
}

fn scan_mounts_from_reader<R, F>(mut reader: R, origin: &Path, mut visit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&MountEntry<'_>) -> ControlFlow<()>,
{
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        if !is_ignorable_line(&line) {
            let entry = parse_mount_line(line.as_str()).map_err(|source| Error::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
            if visit(&entry).is_break() {
                break;
            }
        }

        line.clear();
    }

    Ok(())
}

/// Returns true if the `cgroup.controllers` file below `mount_point` lists
/// at least one controller.
///
/// systemd mounts a v2 hierarchy purely for process tracking (e.g. the
/// hybrid `/sys/fs/cgroup/unified` mount) without any controller; such a
/// mount does not make the v2 backend usable.
pub fn has_delegated_controllers(mount_point: impl AsRef<Path>) -> bool {
    let path = mount_point.as_ref().join(CGROUP_CONTROLLERS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => !content.trim().is_empty(),
        Err(err) => {
            log::debug!("Cannot read `{}`: {}", path.display(), err);
            false
        }
    }
}

/// Returns true if a v1 mount carries at least one real controller,
/// as opposed to a bare named hierarchy such as `name=systemd`.
fn mounts_v1_controller(entry: &MountEntry<'_>) -> bool {
    Controller::ALL
        .into_iter()
        .filter(|controller| *controller != Controller::Systemd)
        .any(|controller| entry.has_option(controller.name(BackendType::V1)))
}

/// Detects which cgroup backend is mounted by scanning a mount table file.
///
/// A `cgroup2` entry only counts when its `cgroup.controllers` is non-empty;
/// a `cgroup` entry only counts when it mounts at least one real controller.
/// When both kinds are found, the unified (v2) backend is preferred.
///
/// # Returns
///
/// `Ok(None)` when no usable cgroup filesystem is mounted.
///
/// # Errors
///
/// Returns errors from [`scan_mounts`].
pub fn detect_mounted_cgroup_backend(path: impl AsRef<Path>) -> Result<Option<BackendType>> {
    let mut v1_found = false;
    let mut v2_found = false;

    scan_mounts(path, |entry| {
        if entry.fs_type == BackendType::V2.fs_type()
            && has_delegated_controllers(&*entry.mount_point)
        {
            log::debug!("Found `cgroup2` mount point: {}", entry.mount_point);
            v2_found = true;
            return ControlFlow::Break(());
        }
        if entry.fs_type == BackendType::V1.fs_type() && mounts_v1_controller(entry) {
            log::trace!(
                "Found `cgroup` mount point: {} ({})",
                entry.mount_point,
                entry.options
            );
            v1_found = true;
        }
        ControlFlow::Continue(())
    })?;

    Ok(if v2_found {
        Some(BackendType::V2)
    } else if v1_found {
        Some(BackendType::V1)
    } else {
        None
    })
}
