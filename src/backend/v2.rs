use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};

use super::{
    CPU_CFS_QUOTA_MAX, CPU_QUOTA_UNLIMITED, MEMORY_UNLIMITED_KB, Backend, CgroupError,
    GroupFlags, Result, TaskMode, is_unlimited_quota, join_placement, read_stat,
    strip_mount_prefix, validate_cpu_cfs_period, validate_cpu_cfs_quota, validate_cpu_shares,
    validate_memory_kb, value,
};
use crate::config::HostPaths;
use crate::controller::{BackendType, Controller, ControllerFile, ControllerSet};
use crate::mounts::{self, CGROUP_CONTROLLERS_FILE};
use crate::stats::{CpuMax, CpuStat, MemoryStat, V2MemoryStat};
use crate::{fsutil, placement};

const SUBTREE_CONTROL_FILE: &str = "cgroup.subtree_control";
const CPU_WEIGHT_MIN: u64 = 1;
const CPU_WEIGHT_MAX: u64 = 10_000;
const MAX: &str = "max";

/// Backend for the unified (v2) hierarchy.
#[derive(Debug, Clone)]
pub struct BackendV2 {
    host_paths: HostPaths,
    mount_point: Option<PathBuf>,
    placement: String,
    controllers: ControllerSet,
}

impl BackendV2 {
    pub fn new(host_paths: HostPaths) -> Self {
        BackendV2 {
            host_paths,
            mount_point: None,
            placement: String::new(),
            controllers: ControllerSet::empty(),
        }
    }

    /// Mount point of the unified hierarchy, once detected.
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    pub fn placement(&self) -> &str {
        &self.placement
    }

    /// Directory of the group.
    ///
    /// # Errors
    ///
    /// [`CgroupError::BackendUnavailable`] before a mount point was detected.
    pub fn group_dir(&self) -> Result<PathBuf> {
        let mount_point = self
            .mount_point
            .as_deref()
            .ok_or(CgroupError::BackendUnavailable {
                fs_type: BackendType::V2.fs_type(),
            })?;
        Ok(join_placement(mount_point, &self.placement))
    }

    /// Allows children of this group to use `controller`.
    pub fn enable_subtree_controller(&self, controller: Controller) -> Result<()> {
        self.write_subtree_control('+', controller)
    }

    /// Withdraws `controller` from the children of this group.
    pub fn disable_subtree_controller(&self, controller: Controller) -> Result<()> {
        self.write_subtree_control('-', controller)
    }

    fn write_subtree_control(&self, op: char, controller: Controller) -> Result<()> {
        let path = self.group_dir()?.join(SUBTREE_CONTROL_FILE);
        let request = format!("{op}{}", controller.name(BackendType::V2));
        value::write_value(&path, &request)
    }

    /// Reads the group's `cgroup.controllers`. Returns `None` while the
    /// group does not exist.
    fn read_controllers_file(&self) -> Result<Option<ControllerSet>> {
        let dir = self.group_dir()?;
        if !dir.is_dir() {
            return Ok(None);
        }
        let content = value::read_value(&dir.join(CGROUP_CONTROLLERS_FILE))?;
        log::debug!("Controllers of `{}`: `{}`", dir.display(), content);
        Ok(Some(ControllerSet::parse_list(BackendType::V2, &content)))
    }

    /// Backend for the parent group, sharing mount point and host paths.
    fn parent(&self) -> Self {
        let parent_placement = match self.placement.trim_end_matches('/').rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent.to_owned(),
            _ => "/".to_owned(),
        };
        BackendV2 {
            host_paths: self.host_paths.clone(),
            mount_point: self.mount_point.clone(),
            placement: parent_placement,
            controllers: ControllerSet::empty(),
        }
    }

    fn read_cpu_max(&self) -> Result<(PathBuf, CpuMax)> {
        let key = ControllerFile::CpuCfsPeriod.name(BackendType::V2);
        let path = self.get_path_of_controller(Controller::Cpu, key)?;
        let content = value::read_value(&path)?;
        let cpu_max = CpuMax::parse(&content).map_err(|source| CgroupError::Parse {
            path: path.clone(),
            value: content.clone(),
            source,
        })?;
        Ok((path, cpu_max))
    }
}

impl Backend for BackendV2 {
    fn backend_type(&self) -> BackendType {
        BackendType::V2
    }

    fn host_paths(&self) -> &HostPaths {
        &self.host_paths
    }

    fn init(&mut self, path: &str) -> Result<()> {
        let proc_mounts = self.host_paths.proc_mounts.clone();
        mounts::scan_mounts(&proc_mounts, |entry| {
            self.detect_mounts(entry.fs_type, entry.options, &entry.mount_point)
        })?;

        let mount_point = self
            .mount_point
            .clone()
            .ok_or(CgroupError::BackendUnavailable {
                fs_type: BackendType::V2.fs_type(),
            })?;
        log::debug!("Using `cgroup2` mount point `{}`", mount_point.display());

        let path = strip_mount_prefix(path, &mount_point).unwrap_or_else(|| path.to_owned());
        if path.starts_with('/') {
            self.placement = path;
        } else {
            let proc_self_cgroup = self.host_paths.proc_self_cgroup.clone();
            placement::visit_proc_cgroup(&proc_self_cgroup, |entry| {
                self.detect_placement(&path, entry.controllers, entry.path)
            })?;
        }
        self.validate_placement()?;
        log::debug!("Resolved `cgroup2` placement `{}`", self.placement);

        if let Some(controllers) = self.read_controllers_file()? {
            self.controllers = controllers;
        }
        Ok(())
    }

    fn detect_mounts(
        &mut self,
        fs_type: &str,
        _options: &str,
        mount_point: &str,
    ) -> ControlFlow<()> {
        if fs_type != BackendType::V2.fs_type() || !mounts::has_delegated_controllers(mount_point) {
            return ControlFlow::Continue(());
        }
        self.mount_point = Some(PathBuf::from(mount_point));
        ControlFlow::Break(())
    }

    fn detect_placement(&mut self, path: &str, controllers: &str, self_path: &str) {
        if !self.placement.is_empty() || !controllers.is_empty() {
            return;
        }
        self.placement = placement::concat_placement(self_path, path);
    }

    fn validate_placement(&self) -> Result<()> {
        if self.placement.is_empty() {
            return Err(CgroupError::UnresolvedPlacement {
                fs_type: BackendType::V2.fs_type(),
            });
        }
        Ok(())
    }

    fn add_task(&self, pid: u32, mode: TaskMode) -> Result<()> {
        let file = match mode {
            TaskMode::Thread => ControllerFile::CgroupThreads,
            TaskMode::Process | TaskMode::Systemd => ControllerFile::CgroupProcs,
        };
        let path = self.group_dir()?.join(file.name(BackendType::V2));
        value::write_value(&path, &pid.to_string())
    }

    fn has_empty_tasks(&self, _controller: Controller) -> Result<bool> {
        let path = self
            .group_dir()?
            .join(ControllerFile::CgroupProcs.name(BackendType::V2));
        Ok(value::read_value(&path)?.is_empty())
    }

    fn set_owner(&self, uid: Uid, gid: Gid, _controllers: ControllerSet) -> Result<()> {
        let dir = self.group_dir()?;
        fsutil::chown_dir_and_files(&dir, uid, gid)?;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        if placement::is_root_placement(&self.placement) {
            log::debug!("Refusing to remove the root cgroup");
            return Ok(());
        }
        let dir = self.group_dir()?;
        let removed = fsutil::remove_dir_tree(&dir)?;
        if removed > 0 {
            log::info!("Removed cgroup `{}`", dir.display());
        }
        self.controllers = ControllerSet::empty();
        Ok(())
    }

    fn make_group(&mut self, flags: GroupFlags) -> Result<ControllerSet> {
        if flags.systemd {
            return Err(CgroupError::SystemdManaged);
        }

        let dir = self.group_dir()?;
        if !dir.is_dir() {
            std::fs::create_dir(&dir).map_err(|source| CgroupError::CreateGroup {
                path: dir.clone(),
                source,
            })?;
            log::info!("Created cgroup `{}`", dir.display());
        }

        if placement::is_root_placement(&self.placement) {
            self.controllers = self.read_controllers_file()?.unwrap_or_default();
            return Ok(self.controllers);
        }

        let mut parent = self.parent();
        parent.controllers = parent.read_controllers_file()?.unwrap_or_default();

        let mut enabled = self.controllers.intersection(parent.controllers);
        for controller in parent.controllers.iter() {
            if enabled.contains(controller)
                || matches!(controller, Controller::Cpuacct | Controller::Devices)
            {
                continue;
            }
            match parent.enable_subtree_controller(controller) {
                Ok(()) => enabled.insert(controller),
                Err(err) => log::warn!(
                    "Failed to enable `{}` controller for `{}`: {}",
                    controller.name(BackendType::V2),
                    dir.display(),
                    err
                ),
            }
        }

        // The kernel's view wins when it is available.
        self.controllers = match value::read_value(&dir.join(CGROUP_CONTROLLERS_FILE)) {
            Ok(content) => ControllerSet::parse_list(BackendType::V2, &content),
            Err(_) => enabled,
        };
        Ok(self.controllers)
    }

    fn has_controller(&self, controller: Controller) -> bool {
        self.controllers.contains(controller)
    }

    fn controllers(&self) -> ControllerSet {
        self.controllers
    }

    fn get_path_of_controller(&self, controller: Controller, key: &str) -> Result<PathBuf> {
        let dir = self.group_dir()?;
        if !dir.is_dir() {
            return Err(CgroupError::FileNotFound { path: dir });
        }
        if !self.has_controller(controller) {
            return Err(CgroupError::ControllerNotFound { controller });
        }
        Ok(dir.join(key))
    }

    fn set_cpu_cfs_period(&self, period: u64) -> Result<()> {
        validate_cpu_cfs_period(period)?;
        let (path, current) = self.read_cpu_max()?;
        let updated = CpuMax { period, ..current };
        value::write_value(&path, &updated.to_string())
    }

    fn get_cpu_cfs_period(&self) -> Result<u64> {
        Ok(self.read_cpu_max()?.1.period)
    }

    fn set_cpu_cfs_quota(&self, quota: i64) -> Result<()> {
        validate_cpu_cfs_quota(quota)?;
        let (path, current) = self.read_cpu_max()?;
        let quota = if is_unlimited_quota(quota) {
            None
        } else {
            Some(quota as u64)
        };
        let updated = CpuMax { quota, ..current };
        value::write_value(&path, &updated.to_string())
    }

    fn get_cpu_cfs_quota(&self) -> Result<i64> {
        Ok(match self.read_cpu_max()?.1.quota {
            Some(quota) => quota.min(CPU_CFS_QUOTA_MAX) as i64,
            None => CPU_QUOTA_UNLIMITED,
        })
    }

    fn set_cpu_shares(&self, shares: u64) -> Result<()> {
        validate_cpu_shares(shares, CPU_WEIGHT_MIN, CPU_WEIGHT_MAX)?;
        let key = ControllerFile::CpuShares.name(BackendType::V2);
        self.set_cgroup_value_u64(Controller::Cpu, key, shares)
    }

    fn get_cpu_usage(&self) -> Result<u64> {
        let key = ControllerFile::CpuUsage.name(BackendType::V2);
        let path = self.get_path_of_controller(Controller::Cpu, key)?;
        Ok(read_stat::<CpuStat>(&path)?.usage_usec)
    }

    fn set_memory_limit_kb(&self, file: ControllerFile, kb: u64) -> Result<()> {
        validate_memory_kb(kb)?;
        let key = file.name(BackendType::V2);
        if kb == MEMORY_UNLIMITED_KB {
            self.set_cgroup_value_str(Controller::Memory, key, MAX)
        } else {
            self.set_cgroup_value_u64(Controller::Memory, key, kb << 10)
        }
    }

    fn get_memory_limit_kb(&self, file: ControllerFile) -> Result<u64> {
        let key = file.name(BackendType::V2);
        let path = self.get_path_of_controller(Controller::Memory, key)?;
        let content = value::read_value(&path)?;
        if content.trim() == MAX {
            return Ok(MEMORY_UNLIMITED_KB);
        }
        let bytes: u64 = value::parse_number(&path, &content)?;
        Ok((bytes >> 10).min(MEMORY_UNLIMITED_KB))
    }

    fn get_memory_stat(&self) -> Result<MemoryStat> {
        let key = ControllerFile::MemoryStat.name(BackendType::V2);
        let path = self.get_path_of_controller(Controller::Memory, key)?;
        Ok(read_stat::<V2MemoryStat>(&path)?.0.in_kb())
    }
}
