//! Selects and initializes the backend matching the host.

use super::{CgroupBackend, CgroupError, Result};
use crate::cgroup::Cgroup;
use crate::config::HostPaths;
use crate::controller::BackendType;
use crate::mounts;

/// Detects the mounted cgroup interface, preferring v2 when both are found.
///
/// # Errors
///
/// [`CgroupError::BackendUnavailable`] if neither interface is usable,
/// [`CgroupError::MountTable`] if the mount table can't be read.
pub fn detect_mounted_cgroup_backend(host_paths: &HostPaths) -> Result<BackendType> {
    let backend_type = mounts::detect_mounted_cgroup_backend(&host_paths.proc_mounts)?
        .ok_or(CgroupError::BackendUnavailable {
            fs_type: "cgroup or cgroup2",
        })?;
    log::debug!("Detected `{backend_type}` backend");
    Ok(backend_type)
}

/// Creates and initializes the backend for the group at `path`.
pub fn get_cgroup_backend(host_paths: &HostPaths, path: &str) -> Result<CgroupBackend> {
    let backend_type = detect_mounted_cgroup_backend(host_paths)?;
    let mut backend = CgroupBackend::new(backend_type, host_paths.clone());
    backend.as_backend_mut().init(path)?;
    Ok(backend)
}

/// Creates a [`Cgroup`] for the group at `path`.
pub fn get_cgroup(host_paths: &HostPaths, path: &str) -> Result<Cgroup> {
    let backend_type = detect_mounted_cgroup_backend(host_paths)?;
    Cgroup::new(CgroupBackend::new(backend_type, host_paths.clone()), path)
}
