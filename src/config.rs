//! Runtime configuration: procfs locations, binary settings and the
//! tenants file.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fsutil;

/// Section of the tenants file holding defaults for every tenant.
pub const ROOT_SECTION: &str = "{root}";

const DEFAULT_TENANTS_FILE: &str = "/etc/cgroup-limits/tenants.json";

/// Locations of the procfs files the backends read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Mount table, `/proc/mounts`.
    pub proc_mounts: PathBuf,
    /// Cgroup membership of the current process, `/proc/self/cgroup`.
    pub proc_self_cgroup: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        HostPaths::with_proc_root("/proc")
    }
}

impl HostPaths {
    /// Builds the paths below an alternative procfs mount.
    pub fn with_proc_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        HostPaths {
            proc_mounts: root.join("mounts"),
            proc_self_cgroup: root.join("self/cgroup"),
        }
    }

    /// Reads `CGROUP_PROC_ROOT`, falling back to `/proc`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        match lookup("CGROUP_PROC_ROOT") {
            Some(root) => {
                log::debug!("Using procfs at `{}`", Path::new(&root).display());
                HostPaths::with_proc_root(PathBuf::from(root))
            }
            None => HostPaths::default(),
        }
    }
}

/// Settings of the `cgroup-tenants` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub tenants_file: PathBuf,
    /// Path every tenant group is created below. Empty means relative to the
    /// cgroup of the running process.
    pub cgroup_parent: String,
    pub host_paths: HostPaths,
}

impl Settings {
    /// Reads `TENANTS_FILE`, `TENANT_CGROUP_PARENT` and `CGROUP_PROC_ROOT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let tenants_file = lookup("TENANTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TENANTS_FILE));
        let cgroup_parent = lookup("TENANT_CGROUP_PARENT")
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        Settings {
            tenants_file,
            cgroup_parent,
            host_paths: HostPaths::from_lookup(lookup),
        }
    }

    /// Path of the group for `tenant` below [`Settings::cgroup_parent`].
    pub fn tenant_path(&self, tenant: &str) -> String {
        let parent = self.cgroup_parent.trim_end_matches('/');
        if parent.is_empty() && !self.cgroup_parent.starts_with('/') {
            tenant.to_owned()
        } else {
            format!("{parent}/{tenant}")
        }
    }
}

/// Errors that may occur while loading the tenants file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to parse tenants file `{path}`: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Section to key to value map, one section per tenant.
///
/// ```json
/// {
///   "{root}": { "SoftQuotaCushion": "20%" },
///   "web": { "CPU": "50%", "Memory": "512mb" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TenantsFile(BTreeMap<String, BTreeMap<String, String>>);

impl TenantsFile {
    /// Loads and parses a tenants file.
    ///
    /// # Errors
    ///
    /// - [`Error::FileOpen`] if the file can't be opened.
    /// - [`Error::Json`] if the content is not an object of string objects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = fsutil::open_file_reader(path)?;
        serde_json::from_reader(reader).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Keys of the [`ROOT_SECTION`], if present.
    pub fn defaults(&self) -> Option<&BTreeMap<String, String>> {
        self.0.get(ROOT_SECTION)
    }

    /// Tenant sections in name order, excluding the root section.
    pub fn tenants(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        self.0
            .iter()
            .filter(|(name, _)| name.as_str() != ROOT_SECTION)
            .map(|(name, keys)| (name.as_str(), keys))
    }
}
