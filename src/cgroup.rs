//! High-level handle on one cgroup.
//!
//! [`Cgroup`] wraps the host's [`CgroupBackend`] and adds the percentage
//! and megabyte based limit setters used for tenants.

use nix::unistd::{Gid, Uid};

use crate::backend::{
    Backend, CgroupBackend, CgroupError, GroupFlags, Result, TaskMode, validate_cpu_cfs_period,
    validate_cpu_cfs_quota, validate_memory_kb,
};
use crate::controller::ControllerSet;

/// CFS period used by [`Cgroup::set_cpu_limit_in_percentage`], so one
/// percent of a CPU equals 1000us of quota.
pub const CPU_LIMIT_PERIOD_US: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct Cgroup {
    backend: CgroupBackend,
}

impl Cgroup {
    /// Initializes `backend` for the group at `path`.
    pub fn new(mut backend: CgroupBackend, path: &str) -> Result<Self> {
        backend.as_backend_mut().init(path)?;
        Ok(Cgroup { backend })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_backend()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_backend_mut()
    }

    pub fn make_group(&mut self, flags: GroupFlags) -> Result<ControllerSet> {
        self.backend_mut().make_group(flags)
    }

    pub fn remove(&mut self) -> Result<()> {
        self.backend_mut().remove()
    }

    pub fn add_task(&self, pid: u32, mode: TaskMode) -> Result<()> {
        self.backend().add_task(pid, mode)
    }

    /// Hands the group over to `uid`/`gid` for every controller.
    pub fn set_owner(&self, uid: Uid, gid: Gid) -> Result<()> {
        self.backend().set_owner(uid, gid, ControllerSet::all())
    }

    /// Limits the group to `cpu` percent of one CPU.
    ///
    /// A positive `soft_quota` (percent) lets the group burst above `cpu` by
    /// that fraction and sets the CPU shares to `cpu`. A non-positive `cpu`
    /// removes the quota. The period and quota are checked before anything
    /// is written; shares outside the backend's range are skipped with a
    /// warning.
    pub fn set_cpu_limit_in_percentage(&self, cpu: f64, soft_quota: f64) -> Result<()> {
        let backend = self.backend();
        let hard = cpu * (1.0 + soft_quota.max(0.0) / 100.0);
        let quota = if hard > 0.0 {
            (hard * 1000.0).round() as i64
        } else {
            -1
        };
        log::debug!("CPU limit {cpu}% (+{soft_quota}%) => quota {quota}us");
        validate_cpu_cfs_period(CPU_LIMIT_PERIOD_US)?;
        validate_cpu_cfs_quota(quota)?;

        backend.set_cpu_cfs_period(CPU_LIMIT_PERIOD_US)?;
        backend.set_cpu_cfs_quota(quota)?;
        if soft_quota > 0.0 {
            let shares = cpu.max(0.0).round() as u64;
            match backend.set_cpu_shares(shares) {
                Err(CgroupError::Validation(err)) => {
                    log::warn!("Skipping CPU shares for {cpu}%: {err}");
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Limits the group to `mb` megabytes.
    ///
    /// A positive `soft_quota` (percent) raises the hard limit by that
    /// fraction and sets `mb` as the soft limit.
    pub fn set_memory_limit_in_mb(&self, mb: f64, soft_quota: f64) -> Result<()> {
        let backend = self.backend();
        let hard_kb = (mb * (1.0 + soft_quota.max(0.0) / 100.0) * 1024.0).round() as u64;
        let soft_kb = (soft_quota > 0.0).then(|| (mb * 1024.0).round() as u64);
        log::debug!("Memory limit {mb}MB (+{soft_quota}%) => hard {hard_kb}KB");
        validate_memory_kb(hard_kb)?;
        if let Some(kb) = soft_kb {
            validate_memory_kb(kb)?;
        }

        backend.set_memory_hard_limit(hard_kb)?;
        if let Some(kb) = soft_kb {
            backend.set_memory_soft_limit(kb)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MEMORY_UNLIMITED_KB, ValidationError};
    use crate::config::HostPaths;
    use crate::controller::BackendType;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fake_v2_group() -> (TempDir, Cgroup, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cgroup");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("cgroup.controllers"), "cpu memory pids\n").unwrap();
        fs::write(root.join("cgroup.subtree_control"), "").unwrap();
        fs::create_dir_all(dir.path().join("proc/self")).unwrap();
        fs::write(
            dir.path().join("proc/mounts"),
            format!("cgroup2 {} cgroup2 rw 0 0\n", root.display()),
        )
        .unwrap();
        fs::write(dir.path().join("proc/self/cgroup"), "0::/\n").unwrap();

        let host_paths = HostPaths::with_proc_root(dir.path().join("proc"));
        let mut cgroup =
            Cgroup::new(CgroupBackend::new(BackendType::V2, host_paths), "tenant").unwrap();
        cgroup.make_group(GroupFlags::default()).unwrap();

        let group = root.join("tenant");
        for (file, content) in [
            ("cgroup.procs", ""),
            ("cpu.max", "max 100000\n"),
            ("cpu.weight", "100\n"),
            ("memory.max", "max\n"),
            ("memory.high", "max\n"),
        ] {
            fs::write(group.join(file), content).unwrap();
        }
        (dir, cgroup, group)
    }

    #[test]
    fn test_memory_limit_with_soft_quota() {
        let (_dir, cgroup, group) = fake_v2_group();

        cgroup.set_memory_limit_in_mb(20.0, 20.0).unwrap();
        assert_eq!(cgroup.backend().get_memory_hard_limit().unwrap(), 24_576);
        assert_eq!(cgroup.backend().get_memory_soft_limit().unwrap(), 20_480);
        assert_eq!(fs::read_to_string(group.join("memory.max")).unwrap(), "25165824");
    }

    #[test]
    fn test_memory_limit_without_soft_quota() {
        let (_dir, cgroup, group) = fake_v2_group();

        cgroup.set_memory_limit_in_mb(512.0, 0.0).unwrap();
        assert_eq!(cgroup.backend().get_memory_hard_limit().unwrap(), 512 * 1024);
        assert_eq!(fs::read_to_string(group.join("memory.high")).unwrap(), "max\n");
    }

    #[test]
    fn test_cpu_limit_with_soft_quota() {
        let (_dir, cgroup, group) = fake_v2_group();

        cgroup.set_cpu_limit_in_percentage(50.0, 20.0).unwrap();
        assert_eq!(fs::read_to_string(group.join("cpu.max")).unwrap(), "60000 100000");
        assert_eq!(cgroup.backend().get_cpu_shares().unwrap(), 50);
    }

    #[test]
    fn test_cpu_limit_without_soft_quota() {
        let (_dir, cgroup, group) = fake_v2_group();

        cgroup.set_cpu_limit_in_percentage(150.0, 0.0).unwrap();
        assert_eq!(cgroup.backend().get_cpu_cfs_period().unwrap(), CPU_LIMIT_PERIOD_US);
        assert_eq!(cgroup.backend().get_cpu_cfs_quota().unwrap(), 150_000);
        assert_eq!(fs::read_to_string(group.join("cpu.weight")).unwrap(), "100\n");
    }

    #[test]
    fn test_cpu_limit_too_small_is_rejected() {
        let (_dir, cgroup, group) = fake_v2_group();
        fs::write(group.join("cpu.max"), "50000 200000\n").unwrap();

        let err = cgroup.set_cpu_limit_in_percentage(0.5, 0.0).unwrap_err();
        assert!(matches!(
            err,
            CgroupError::Validation(ValidationError::CpuQuota(500))
        ));
        assert_eq!(fs::read_to_string(group.join("cpu.max")).unwrap(), "50000 200000\n");
    }

    #[test]
    fn test_unlimited_cpu_with_soft_quota_skips_weight() {
        let (_dir, cgroup, group) = fake_v2_group();
        fs::write(group.join("cpu.max"), "50000 200000\n").unwrap();

        cgroup.set_cpu_limit_in_percentage(0.0, 20.0).unwrap();
        assert_eq!(fs::read_to_string(group.join("cpu.max")).unwrap(), "max 100000");
        assert_eq!(fs::read_to_string(group.join("cpu.weight")).unwrap(), "100\n");
    }

    #[test]
    fn test_cpu_weight_out_of_range_keeps_quota() {
        let (_dir, cgroup, group) = fake_v2_group();

        cgroup.set_cpu_limit_in_percentage(20_000.0, 10.0).unwrap();
        assert_eq!(fs::read_to_string(group.join("cpu.max")).unwrap(), "22000000 100000");
        assert_eq!(fs::read_to_string(group.join("cpu.weight")).unwrap(), "100\n");
    }

    #[test]
    fn test_memory_limit_too_large_is_rejected() {
        let (_dir, cgroup, group) = fake_v2_group();

        let too_large_mb = (MEMORY_UNLIMITED_KB / 1024 + 1) as f64;
        let err = cgroup.set_memory_limit_in_mb(too_large_mb, 0.0).unwrap_err();
        assert!(matches!(err, CgroupError::Validation(ValidationError::Memory(_))));
        assert_eq!(fs::read_to_string(group.join("memory.max")).unwrap(), "max\n");
    }

    #[test]
    fn test_add_task_and_remove() {
        let (_dir, mut cgroup, group) = fake_v2_group();

        cgroup.add_task(99, TaskMode::Process).unwrap();
        assert_eq!(fs::read_to_string(group.join("cgroup.procs")).unwrap(), "99");
        cgroup.set_owner(nix::unistd::getuid(), nix::unistd::getgid()).unwrap();

        cgroup.remove().unwrap();
        assert!(!group.exists());
    }
}
