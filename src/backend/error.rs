use std::path::PathBuf;

use crate::controller::Controller;
use crate::stats::StatParseError;
use crate::{fsutil, mounts, placement};

/// Errors raised by cgroup backends and the [`crate::cgroup::Cgroup`] facade.
#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    #[error("cgroup backend not available: no usable `{fs_type}` mount")]
    BackendUnavailable { fs_type: &'static str },
    #[error("controller `{controller:?}` is not available for this group")]
    ControllerNotFound { controller: Controller },
    #[error("cgroup file `{path}` does not exist")]
    FileNotFound { path: PathBuf },
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("failed to parse `{value}` read from `{path}`: {source}")]
    Parse {
        path: PathBuf,
        value: String,
        #[source]
        source: StatParseError,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to scan mount table: {0}")]
    MountTable(#[from] mounts::Error),
    #[error("failed to resolve own cgroup: {0}")]
    SelfCgroup(#[from] placement::Error),
    #[error("could not resolve a placement for the `{fs_type}` backend")]
    UnresolvedPlacement { fs_type: &'static str },
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create cgroup `{path}`: {source}")]
    CreateGroup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    RemoveGroup(#[from] fsutil::RemoveError),
    #[error(transparent)]
    Owner(#[from] fsutil::ChownError),
    #[error("running under systemd, groups must not be created manually")]
    SystemdManaged,
    #[error("failed to parse statistics from `{path}`: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Range violations detected before any file is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cfs period `{0}` must be in range [1000, 1000000]")]
    CpuPeriod(u64),
    #[error("cfs quota `{0}` must be in range [1000, 18446744073709551]")]
    CpuQuota(i64),
    #[error("cpu shares `{value}` must be in range [{min}, {max}]")]
    CpuShares { value: u64, min: u64, max: u64 },
    #[error("memory limit `{0}` KB exceeds the unlimited value 9007199254740991 KB")]
    Memory(u64),
}

pub type Result<T> = std::result::Result<T, CgroupError>;
