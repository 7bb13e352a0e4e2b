//! Mount table inspection.
//!
//! Reads `/proc/mounts` to find out which cgroup filesystems are mounted
//! and where. Backends use [`scan_mounts`] to visit every entry; the
//! factory uses [`detect_mounted_cgroup_backend`] to pick a backend type.
mod detect;
mod error;
mod parser;

pub use detect::{
    CGROUP_CONTROLLERS_FILE, detect_mounted_cgroup_backend, has_delegated_controllers, scan_mounts,
};
pub use error::{Error, Result};
pub use parser::{MountEntry, MountField, ParseError, parse_mount_line};
