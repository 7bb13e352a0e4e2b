//! Cgroup backends.
//!
//! A backend knows where its controllers are mounted, where the managed
//! group lives below those mounts (its *placement*) and how the generic
//! CPU and memory knobs map onto the kernel files of its interface.
//!
//! - [`BackendV1`]: legacy hierarchies, one mount per controller (group).
//! - [`BackendV2`]: the unified hierarchy.
//!
//! Both implement [`Backend`]; [`CgroupBackend`] is the closed set of the
//! two, chosen once by the [`factory`].

mod error;
pub mod factory;
mod v1;
mod v2;
pub mod value;

use std::fs::File;
use std::io::{self, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};

pub use error::{CgroupError, Result, ValidationError};
pub use v1::{BackendV1, ControllerMount};
pub use v2::BackendV2;

use crate::config::HostPaths;
use crate::controller::{BackendType, Controller, ControllerFile, ControllerSet};
use crate::stats::{KeyValueStat, MemoryStat};

/// Smallest accepted CFS period in microseconds.
pub const CPU_CFS_PERIOD_MIN: u64 = 1000;
/// Largest accepted CFS period in microseconds.
pub const CPU_CFS_PERIOD_MAX: u64 = 1_000_000;
/// Smallest accepted non-negative CFS quota in microseconds.
pub const CPU_CFS_QUOTA_MIN: i64 = 1000;
/// Largest accepted CFS quota in microseconds.
pub const CPU_CFS_QUOTA_MAX: u64 = u64::MAX / 1000;
/// Quota reported for a group without CPU bandwidth limit.
pub const CPU_QUOTA_UNLIMITED: i64 = CPU_CFS_QUOTA_MAX as i64;
/// Memory limit in KB meaning "no limit".
pub const MEMORY_UNLIMITED_KB: u64 = 9_007_199_254_740_991;

/// Where [`Backend::add_task`] moves a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskMode {
    /// The whole process, except into the systemd named hierarchy.
    #[default]
    Process,
    /// Like [`TaskMode::Process`], including the systemd named hierarchy.
    Systemd,
    /// A single thread, through `cgroup.threads`.
    Thread,
}

/// Options for [`Backend::make_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupFlags {
    /// Enable `memory.use_hierarchy` on v1 groups.
    pub memory_hierarchy: bool,
    /// The group is managed by systemd; v2 refuses to create it.
    pub systemd: bool,
}

/// Operations every cgroup backend provides.
///
/// All operations are synchronous filesystem accesses. Getters always
/// re-read the kernel file.
pub trait Backend {
    fn backend_type(&self) -> BackendType;

    fn host_paths(&self) -> &HostPaths;

    /// Scans the mount table and resolves the placement of `path`.
    ///
    /// `path` may be relative (resolved below the group of the current
    /// process), absolute below the mount, or prefixed with the mount point.
    ///
    /// # Errors
    ///
    /// [`CgroupError::BackendUnavailable`] if the backend's filesystem is
    /// not mounted, [`CgroupError::UnresolvedPlacement`] if no placement
    /// could be derived.
    fn init(&mut self, path: &str) -> Result<()>;

    /// Visits one mount table entry. Returns [`ControlFlow::Break`] once
    /// nothing more needs to be scanned.
    fn detect_mounts(
        &mut self,
        fs_type: &str,
        options: &str,
        mount_point: &str,
    ) -> ControlFlow<()>;

    /// Visits one `/proc/self/cgroup` entry and sets the placement of every
    /// matching controller that has none yet.
    fn detect_placement(&mut self, path: &str, controllers: &str, self_path: &str);

    fn validate_placement(&self) -> Result<()>;

    /// Moves `pid` into the group.
    fn add_task(&self, pid: u32, mode: TaskMode) -> Result<()>;

    /// Returns true if no task is a member of the group.
    fn has_empty_tasks(&self, controller: Controller) -> Result<bool>;

    /// Changes the owner of the group directories of `controllers`, an
    /// empty set meaning all controllers.
    fn set_owner(&self, uid: Uid, gid: Gid, controllers: ControllerSet) -> Result<()>;

    /// Deletes the group. Never touches the root group and succeeds if the
    /// group does not exist.
    fn remove(&mut self) -> Result<()>;

    /// Creates the group and returns the controllers enabled for it.
    fn make_group(&mut self, flags: GroupFlags) -> Result<ControllerSet>;

    fn has_controller(&self, controller: Controller) -> bool;

    /// Controllers currently usable for the group.
    fn controllers(&self) -> ControllerSet;

    /// Path of the control file `key` of `controller` in the group.
    ///
    /// # Errors
    ///
    /// [`CgroupError::FileNotFound`] if the group directory does not exist,
    /// [`CgroupError::ControllerNotFound`] if the controller is unavailable.
    fn get_path_of_controller(&self, controller: Controller, key: &str) -> Result<PathBuf>;

    fn set_cpu_cfs_period(&self, period: u64) -> Result<()>;

    fn get_cpu_cfs_period(&self) -> Result<u64>;

    /// Sets the CFS quota; a negative value or [`CPU_QUOTA_UNLIMITED`]
    /// removes the limit.
    fn set_cpu_cfs_quota(&self, quota: i64) -> Result<()>;

    fn get_cpu_cfs_quota(&self) -> Result<i64>;

    fn set_cpu_shares(&self, shares: u64) -> Result<()>;

    /// Total CPU time consumed by the group in microseconds.
    fn get_cpu_usage(&self) -> Result<u64>;

    /// Writes a memory limit file, [`MEMORY_UNLIMITED_KB`] removing the limit.
    fn set_memory_limit_kb(&self, file: ControllerFile, kb: u64) -> Result<()>;

    /// Reads a memory limit file, clamping "no limit" to [`MEMORY_UNLIMITED_KB`].
    fn get_memory_limit_kb(&self, file: ControllerFile) -> Result<u64>;

    /// Memory statistics of the group in KB.
    fn get_memory_stat(&self) -> Result<MemoryStat>;

    fn set_cgroup_value_str(&self, controller: Controller, key: &str, value: &str) -> Result<()> {
        let path = self.get_path_of_controller(controller, key)?;
        value::write_value(&path, value)
    }

    fn get_cgroup_value_str(&self, controller: Controller, key: &str) -> Result<String> {
        let path = self.get_path_of_controller(controller, key)?;
        value::read_value(&path)
    }

    fn set_cgroup_value_u64(&self, controller: Controller, key: &str, value: u64) -> Result<()> {
        self.set_cgroup_value_str(controller, key, &value.to_string())
    }

    fn set_cgroup_value_i64(&self, controller: Controller, key: &str, value: i64) -> Result<()> {
        self.set_cgroup_value_str(controller, key, &value.to_string())
    }

    fn get_cgroup_value_u64(&self, controller: Controller, key: &str) -> Result<u64> {
        let path = self.get_path_of_controller(controller, key)?;
        value::parse_number(&path, &value::read_value(&path)?)
    }

    fn get_cgroup_value_i64(&self, controller: Controller, key: &str) -> Result<i64> {
        let path = self.get_path_of_controller(controller, key)?;
        value::parse_number(&path, &value::read_value(&path)?)
    }

    fn get_cpu_shares(&self) -> Result<u64> {
        let key = ControllerFile::CpuShares.name(self.backend_type());
        self.get_cgroup_value_u64(Controller::Cpu, key)
    }

    fn set_memory_hard_limit(&self, kb: u64) -> Result<()> {
        self.set_memory_limit_kb(ControllerFile::MemoryHardLimit, kb)
    }

    fn get_memory_hard_limit(&self) -> Result<u64> {
        self.get_memory_limit_kb(ControllerFile::MemoryHardLimit)
    }

    fn set_memory_soft_limit(&self, kb: u64) -> Result<()> {
        self.set_memory_limit_kb(ControllerFile::MemorySoftLimit, kb)
    }

    fn get_memory_soft_limit(&self) -> Result<u64> {
        self.get_memory_limit_kb(ControllerFile::MemorySoftLimit)
    }

    fn set_mem_swap_hard_limit(&self, kb: u64) -> Result<()> {
        self.set_memory_limit_kb(ControllerFile::MemorySwapHardLimit, kb)
    }

    fn get_mem_swap_hard_limit(&self) -> Result<u64> {
        self.get_memory_limit_kb(ControllerFile::MemorySwapHardLimit)
    }

    /// Current memory usage in KB.
    fn get_memory_usage(&self) -> Result<u64> {
        let key = ControllerFile::MemoryUsage.name(self.backend_type());
        Ok(self.get_cgroup_value_u64(Controller::Memory, key)? >> 10)
    }

    /// Current memory plus swap usage in KB.
    fn get_mem_swap_usage(&self) -> Result<u64> {
        let key = ControllerFile::MemorySwapUsage.name(self.backend_type());
        Ok(self.get_cgroup_value_u64(Controller::Memory, key)? >> 10)
    }
}

/// The backend selected for this host.
#[derive(Debug, Clone)]
pub enum CgroupBackend {
    V1(BackendV1),
    V2(BackendV2),
}

impl CgroupBackend {
    /// Creates an uninitialized backend of the given type.
    pub fn new(backend_type: BackendType, host_paths: HostPaths) -> Self {
        match backend_type {
            BackendType::V1 => CgroupBackend::V1(BackendV1::new(host_paths)),
            BackendType::V2 => CgroupBackend::V2(BackendV2::new(host_paths)),
        }
    }

    pub fn as_backend(&self) -> &dyn Backend {
        match self {
            CgroupBackend::V1(backend) => backend,
            CgroupBackend::V2(backend) => backend,
        }
    }

    pub fn as_backend_mut(&mut self) -> &mut dyn Backend {
        match self {
            CgroupBackend::V1(backend) => backend,
            CgroupBackend::V2(backend) => backend,
        }
    }
}

pub fn validate_cpu_cfs_period(period: u64) -> std::result::Result<(), ValidationError> {
    if (CPU_CFS_PERIOD_MIN..=CPU_CFS_PERIOD_MAX).contains(&period) {
        Ok(())
    } else {
        Err(ValidationError::CpuPeriod(period))
    }
}

/// Negative quotas mean "unlimited" and are always accepted.
pub fn validate_cpu_cfs_quota(quota: i64) -> std::result::Result<(), ValidationError> {
    if quota < 0 || (quota >= CPU_CFS_QUOTA_MIN && quota as u64 <= CPU_CFS_QUOTA_MAX) {
        Ok(())
    } else {
        Err(ValidationError::CpuQuota(quota))
    }
}

pub fn validate_cpu_shares(
    shares: u64,
    min: u64,
    max: u64,
) -> std::result::Result<(), ValidationError> {
    if (min..=max).contains(&shares) {
        Ok(())
    } else {
        Err(ValidationError::CpuShares {
            value: shares,
            min,
            max,
        })
    }
}

pub fn validate_memory_kb(kb: u64) -> std::result::Result<(), ValidationError> {
    if kb > MEMORY_UNLIMITED_KB {
        Err(ValidationError::Memory(kb))
    } else {
        Ok(())
    }
}

fn is_unlimited_quota(quota: i64) -> bool {
    quota < 0 || quota == CPU_QUOTA_UNLIMITED
}

/// Appends a placement to a mount point. The placement is absolute inside
/// the mount, so its leading `/` must not replace the mount point.
fn join_placement(mount_point: &Path, placement: &str) -> PathBuf {
    mount_point.join(placement.trim_start_matches('/'))
}

/// Turns `<mount_point>/sub/path` into `/sub/path`. Returns `None` if
/// `path` is not below `mount_point`.
fn strip_mount_prefix(path: &str, mount_point: &Path) -> Option<String> {
    let rest = Path::new(path).strip_prefix(mount_point).ok()?;
    Some(format!("/{}", rest.to_string_lossy()))
}

/// Parses a multi-line statistics file of a group.
fn read_stat<T: KeyValueStat>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            CgroupError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CgroupError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    T::from_reader(&mut BufReader::new(file)).map_err(|source| CgroupError::Stat {
        path: path.to_path_buf(),
        source,
    })
}
