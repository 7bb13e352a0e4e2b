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
use crate::error::ResultOkLogExt;
use crate::stats::{MemoryStat, V1MemoryStat};
use crate::{fsutil, mounts, placement};

const CPU_SHARES_MIN: u64 = 2;
const CPU_SHARES_MAX: u64 = 262_144;
const MEMORY_USE_HIERARCHY_FILE: &str = "memory.use_hierarchy";

/// Where one v1 controller is mounted and where the group lives below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerMount {
    pub mount_point: Option<PathBuf>,
    /// Symlink named after the controller next to a co-mounted hierarchy,
    /// e.g. `/sys/fs/cgroup/cpu` for `/sys/fs/cgroup/cpu,cpuacct`.
    pub link_point: Option<PathBuf>,
    pub placement: String,
}

impl ControllerMount {
    fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    /// Mounted with a placement below the hierarchy root.
    fn is_enabled(&self) -> bool {
        self.is_mounted() && !placement::is_root_placement(&self.placement)
    }

    fn group_dir(&self) -> Option<PathBuf> {
        if !self.is_enabled() {
            return None;
        }
        let mount_point = self.mount_point.as_deref()?;
        Some(join_placement(mount_point, &self.placement))
    }
}

/// Backend for the legacy (v1) hierarchies.
#[derive(Debug, Clone)]
pub struct BackendV1 {
    host_paths: HostPaths,
    mounts: [ControllerMount; Controller::COUNT],
    /// Limit of the root memory group in KB; reads at or above it mean "no
    /// limit".
    memory_unlimited_kb: u64,
}

impl BackendV1 {
    pub fn new(host_paths: HostPaths) -> Self {
        BackendV1 {
            host_paths,
            mounts: std::array::from_fn(|_| ControllerMount::default()),
            memory_unlimited_kb: MEMORY_UNLIMITED_KB,
        }
    }

    pub fn controller_mount(&self, controller: Controller) -> &ControllerMount {
        &self.mounts[controller.index()]
    }

    /// Group directories of the usable controllers in `controllers`, each
    /// directory listed once even if several controllers share a mount.
    fn group_dirs(&self, controllers: ControllerSet) -> Vec<(Controller, PathBuf)> {
        let mut dirs: Vec<(Controller, PathBuf)> = Vec::new();
        for controller in controllers.iter() {
            let Some(dir) = self.controller_mount(controller).group_dir() else {
                continue;
            };
            if !dirs.iter().any(|(_, known)| *known == dir) {
                dirs.push((controller, dir));
            }
        }
        dirs
    }

    fn resolve_mount_link(mount_point: &Path, controller: Controller) -> Option<PathBuf> {
        if controller == Controller::Systemd {
            return None;
        }
        let dir_name = mount_point.file_name()?.to_str()?;
        if !dir_name.contains(',') {
            return None;
        }
        let link = mount_point.with_file_name(controller.name(BackendType::V1));
        let is_link = std::fs::symlink_metadata(&link)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        is_link.then_some(link)
    }

    fn read_root_memory_limit(&self) -> u64 {
        let Some(mount_point) = self.controller_mount(Controller::Memory).mount_point.as_deref()
        else {
            return MEMORY_UNLIMITED_KB;
        };
        let path = mount_point.join(ControllerFile::MemoryHardLimit.name(BackendType::V1));
        value::read_value(&path)
            .and_then(|content| value::parse_number::<u64>(&path, &content))
            .ok_log(log::Level::Error)
            .map(|bytes| bytes >> 10)
            .unwrap_or(MEMORY_UNLIMITED_KB)
    }
}

impl Backend for BackendV1 {
    fn backend_type(&self) -> BackendType {
        BackendType::V1
    }

    fn host_paths(&self) -> &HostPaths {
        &self.host_paths
    }

    fn init(&mut self, path: &str) -> Result<()> {
        let proc_mounts = self.host_paths.proc_mounts.clone();
        mounts::scan_mounts(&proc_mounts, |entry| {
            self.detect_mounts(entry.fs_type, entry.options, &entry.mount_point)
        })?;

        let any_mounted = Controller::ALL
            .into_iter()
            .any(|c| c != Controller::Systemd && self.controller_mount(c).is_mounted());
        if !any_mounted {
            return Err(CgroupError::BackendUnavailable {
                fs_type: BackendType::V1.fs_type(),
            });
        }

        let stripped = self
            .mounts
            .iter()
            .filter_map(|mount| mount.mount_point.as_deref())
            .find_map(|mount_point| strip_mount_prefix(path, mount_point));
        let path = stripped.unwrap_or_else(|| path.to_owned());

        if path.starts_with('/') {
            for mount in self.mounts.iter_mut().filter(|mount| mount.is_mounted()) {
                mount.placement = path.clone();
            }
        } else {
            let proc_self_cgroup = self.host_paths.proc_self_cgroup.clone();
            placement::visit_proc_cgroup(&proc_self_cgroup, |entry| {
                if !entry.controllers.is_empty() {
                    self.detect_placement(&path, entry.controllers, entry.path);
                }
            })?;
        }
        self.validate_placement()?;

        self.memory_unlimited_kb = self.read_root_memory_limit();
        log::debug!(
            "Resolved `cgroup` placements for {:?}, memory unlimited at {} KB",
            self.controllers(),
            self.memory_unlimited_kb
        );
        Ok(())
    }

    fn detect_mounts(
        &mut self,
        fs_type: &str,
        options: &str,
        mount_point: &str,
    ) -> ControlFlow<()> {
        if fs_type != BackendType::V1.fs_type() {
            return ControlFlow::Continue(());
        }
        for controller in Controller::ALL {
            let name = controller.name(BackendType::V1);
            if !options.split(',').any(|option| option == name) {
                continue;
            }
            let mount_point = PathBuf::from(mount_point);
            log::trace!("Found `{}` mounted at `{}`", name, mount_point.display());
            let mount = &mut self.mounts[controller.index()];
            mount.link_point = Self::resolve_mount_link(&mount_point, controller);
            mount.mount_point = Some(mount_point);
        }
        ControlFlow::Continue(())
    }

    fn detect_placement(&mut self, path: &str, controllers: &str, self_path: &str) {
        for controller in Controller::ALL {
            let name = controller.name(BackendType::V1);
            if !controllers.split(',').any(|listed| listed == name) {
                continue;
            }
            let mount = &mut self.mounts[controller.index()];
            if !mount.is_mounted() || !mount.placement.is_empty() {
                continue;
            }
            mount.placement = if controller == Controller::Systemd {
                self_path.to_owned()
            } else {
                placement::concat_placement(self_path, path)
            };
        }
    }

    fn validate_placement(&self) -> Result<()> {
        let unresolved = Controller::ALL.into_iter().any(|controller| {
            let mount = self.controller_mount(controller);
            controller != Controller::Systemd && mount.is_mounted() && mount.placement.is_empty()
        });
        if unresolved {
            return Err(CgroupError::UnresolvedPlacement {
                fs_type: BackendType::V1.fs_type(),
            });
        }
        Ok(())
    }

    fn add_task(&self, pid: u32, mode: TaskMode) -> Result<()> {
        let file = match mode {
            TaskMode::Thread => ControllerFile::CgroupThreads,
            TaskMode::Process | TaskMode::Systemd => ControllerFile::CgroupProcs,
        };
        for (controller, dir) in self.group_dirs(ControllerSet::all()) {
            if controller == Controller::Systemd && mode != TaskMode::Systemd {
                continue;
            }
            if !dir.is_dir() {
                continue;
            }
            value::write_value(&dir.join(file.name(BackendType::V1)), &pid.to_string())?;
        }
        Ok(())
    }

    fn has_empty_tasks(&self, controller: Controller) -> Result<bool> {
        let key = ControllerFile::CgroupProcs.name(BackendType::V1);
        Ok(self.get_cgroup_value_str(controller, key)?.is_empty())
    }

    fn set_owner(&self, uid: Uid, gid: Gid, controllers: ControllerSet) -> Result<()> {
        let controllers = if controllers.is_empty() {
            ControllerSet::all()
        } else {
            controllers
        };
        for (_, dir) in self.group_dirs(controllers) {
            if dir.is_dir() {
                fsutil::chown_dir_and_files(&dir, uid, gid)?;
            }
        }
        Ok(())
    }

    /// Removes the group below every controller except the systemd named
    /// hierarchy, whose placement is the caller's own scope.
    fn remove(&mut self) -> Result<()> {
        let mut controllers = self.controllers();
        controllers.remove(Controller::Systemd);
        for (_, dir) in self.group_dirs(controllers) {
            if fsutil::remove_dir_tree(&dir)? > 0 {
                log::info!("Removed cgroup `{}`", dir.display());
            }
        }
        Ok(())
    }

    /// Creates the group below every mounted controller except `devices` and
    /// the systemd named hierarchy. The systemd flag has no effect on v1.
    fn make_group(&mut self, flags: GroupFlags) -> Result<ControllerSet> {
        let mut controllers = self.controllers();
        controllers.remove(Controller::Devices);
        controllers.remove(Controller::Systemd);

        for (controller, dir) in self.group_dirs(controllers) {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir).map_err(|source| CgroupError::CreateGroup {
                    path: dir.clone(),
                    source,
                })?;
                log::info!("Created cgroup `{}`", dir.display());
            }
            if controller == Controller::Memory && flags.memory_hierarchy {
                value::write_value(&dir.join(MEMORY_USE_HIERARCHY_FILE), "1")
                    .ok_log(log::Level::Warn);
            }
        }
        Ok(self.controllers())
    }

    fn has_controller(&self, controller: Controller) -> bool {
        self.controller_mount(controller).is_enabled()
    }

    fn controllers(&self) -> ControllerSet {
        Controller::ALL
            .into_iter()
            .filter(|controller| self.has_controller(*controller))
            .collect()
    }

    fn get_path_of_controller(&self, controller: Controller, key: &str) -> Result<PathBuf> {
        let dir = self
            .controller_mount(controller)
            .group_dir()
            .ok_or(CgroupError::ControllerNotFound { controller })?;
        if !dir.is_dir() {
            return Err(CgroupError::FileNotFound { path: dir });
        }
        Ok(dir.join(key))
    }

    fn set_cpu_cfs_period(&self, period: u64) -> Result<()> {
        validate_cpu_cfs_period(period)?;
        let key = ControllerFile::CpuCfsPeriod.name(BackendType::V1);
        self.set_cgroup_value_u64(Controller::Cpu, key, period)
    }

    fn get_cpu_cfs_period(&self) -> Result<u64> {
        let key = ControllerFile::CpuCfsPeriod.name(BackendType::V1);
        self.get_cgroup_value_u64(Controller::Cpu, key)
    }

    fn set_cpu_cfs_quota(&self, quota: i64) -> Result<()> {
        validate_cpu_cfs_quota(quota)?;
        let key = ControllerFile::CpuCfsQuota.name(BackendType::V1);
        let quota = if is_unlimited_quota(quota) { -1 } else { quota };
        self.set_cgroup_value_i64(Controller::Cpu, key, quota)
    }

    fn get_cpu_cfs_quota(&self) -> Result<i64> {
        let key = ControllerFile::CpuCfsQuota.name(BackendType::V1);
        let quota = self.get_cgroup_value_i64(Controller::Cpu, key)?;
        Ok(if quota < 0 {
            CPU_QUOTA_UNLIMITED
        } else {
            (quota as u64).min(CPU_CFS_QUOTA_MAX) as i64
        })
    }

    fn set_cpu_shares(&self, shares: u64) -> Result<()> {
        validate_cpu_shares(shares, CPU_SHARES_MIN, CPU_SHARES_MAX)?;
        let key = ControllerFile::CpuShares.name(BackendType::V1);
        self.set_cgroup_value_u64(Controller::Cpu, key, shares)
    }

    fn get_cpu_usage(&self) -> Result<u64> {
        let key = ControllerFile::CpuUsage.name(BackendType::V1);
        let nanos = self.get_cgroup_value_u64(Controller::Cpuacct, key)?;
        Ok(nanos / 1000)
    }

    fn set_memory_limit_kb(&self, file: ControllerFile, kb: u64) -> Result<()> {
        validate_memory_kb(kb)?;
        let key = file.name(BackendType::V1);
        if kb == MEMORY_UNLIMITED_KB {
            self.set_cgroup_value_i64(Controller::Memory, key, -1)
        } else {
            self.set_cgroup_value_u64(Controller::Memory, key, kb << 10)
        }
    }

    fn get_memory_limit_kb(&self, file: ControllerFile) -> Result<u64> {
        let key = file.name(BackendType::V1);
        let bytes = self.get_cgroup_value_i64(Controller::Memory, key)?;
        if bytes < 0 {
            return Ok(MEMORY_UNLIMITED_KB);
        }
        let kb = (bytes as u64) >> 10;
        Ok(if kb >= self.memory_unlimited_kb {
            MEMORY_UNLIMITED_KB
        } else {
            kb
        })
    }

    fn get_memory_stat(&self) -> Result<MemoryStat> {
        let key = ControllerFile::MemoryStat.name(BackendType::V1);
        let path = self.get_path_of_controller(Controller::Memory, key)?;
        Ok(read_stat::<V1MemoryStat>(&path)?.0.in_kb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Fake host with `cpu,cpuacct`, `memory`, `pids` and the systemd named
    /// hierarchy mounted below `cgroup/`.
    struct FakeHost {
        dir: TempDir,
    }

    impl FakeHost {
        fn new(self_cgroup: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("cgroup");
            for hierarchy in ["cpu,cpuacct", "memory", "pids", "systemd"] {
                fs::create_dir_all(root.join(hierarchy)).unwrap();
            }
            std::os::unix::fs::symlink(root.join("cpu,cpuacct"), root.join("cpu")).unwrap();
            std::os::unix::fs::symlink(root.join("cpu,cpuacct"), root.join("cpuacct"))
                .unwrap();
            fs::write(
                root.join("memory/memory.limit_in_bytes"),
                "9223372036854771712\n",
            )
            .unwrap();

            let r = root.display();
            let mounts = format!(
                "sysfs /sys sysfs rw 0 0\n\
                 tmpfs {r} tmpfs ro,mode=755 0 0\n\
                 cgroup {r}/systemd cgroup rw,xattr,name=systemd 0 0\n\
                 cgroup {r}/cpu,cpuacct cgroup rw,cpu,cpuacct 0 0\n\
                 cgroup {r}/memory cgroup rw,memory 0 0\n\
                 cgroup {r}/pids cgroup rw,pids 0 0\n"
            );
            fs::create_dir_all(dir.path().join("proc/self")).unwrap();
            fs::write(dir.path().join("proc/mounts"), mounts).unwrap();
            fs::write(dir.path().join("proc/self/cgroup"), self_cgroup).unwrap();

            FakeHost { dir }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("cgroup")
        }

        fn backend(&self, path: &str) -> BackendV1 {
            let host_paths = HostPaths::with_proc_root(self.dir.path().join("proc"));
            let mut backend = BackendV1::new(host_paths);
            backend.init(path).unwrap();
            backend
        }

        fn group(&self, path: &str) -> BackendV1 {
            let mut backend = self.backend(path);
            backend.make_group(GroupFlags::default()).unwrap();
            let placement = backend.controller_mount(Controller::Cpu).placement.clone();
            let cpu = join_placement(&self.root().join("cpu,cpuacct"), &placement);
            let memory = join_placement(&self.root().join("memory"), &placement);
            for (dir, file, content) in [
                (&cpu, "tasks", ""),
                (&cpu, "cpu.cfs_period_us", "100000\n"),
                (&cpu, "cpu.cfs_quota_us", "-1\n"),
                (&cpu, "cpu.shares", "1024\n"),
                (&cpu, "cpuacct.usage", "2500000\n"),
                (&memory, "tasks", ""),
                (&memory, "memory.limit_in_bytes", "9223372036854771712\n"),
                (&memory, "memory.soft_limit_in_bytes", "9223372036854771712\n"),
                (&memory, "memory.usage_in_bytes", "4096\n"),
                (&memory, "memory.stat", "cache 2048\nrss 1024\nactive_anon 1024\n"),
            ] {
                fs::write(dir.join(file), content).unwrap();
            }
            backend
        }
    }

    const SELF_CGROUP: &str = "\
12:pids:/user.slice
5:memory:/user.slice
4:cpu,cpuacct:/user.slice
1:name=systemd:/user.slice/session-1.scope
0::/user.slice/session-1.scope
";

    #[test]
    fn test_detect_mounts_and_co_mount_links() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.backend("demo");

        let cpu = backend.controller_mount(Controller::Cpu);
        assert_eq!(cpu.mount_point, Some(host.root().join("cpu,cpuacct")));
        assert_eq!(cpu.link_point, Some(host.root().join("cpu")));
        let cpuacct = backend.controller_mount(Controller::Cpuacct);
        assert_eq!(cpuacct.link_point, Some(host.root().join("cpuacct")));
        let memory = backend.controller_mount(Controller::Memory);
        assert_eq!(memory.mount_point, Some(host.root().join("memory")));
        assert_eq!(memory.link_point, None);
        assert!(backend.controller_mount(Controller::Freezer).mount_point.is_none());
    }

    #[test]
    fn test_placement_from_own_cgroup() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.backend("demo");

        assert_eq!(backend.controller_mount(Controller::Cpu).placement, "/user.slice/demo");
        assert_eq!(backend.controller_mount(Controller::Memory).placement, "/user.slice/demo");
        assert_eq!(
            backend.controller_mount(Controller::Systemd).placement,
            "/user.slice/session-1.scope"
        );
        assert_eq!(
            backend.controllers().iter().collect::<Vec<_>>(),
            vec![
                Controller::Cpu,
                Controller::Cpuacct,
                Controller::Memory,
                Controller::Pids,
                Controller::Systemd
            ]
        );
    }

    #[test]
    fn test_absolute_placement() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.backend("/tenants/web");
        assert_eq!(backend.controller_mount(Controller::Pids).placement, "/tenants/web");

        let prefixed = format!("{}/memory/tenants/web", host.root().display());
        let backend = host.backend(&prefixed);
        assert_eq!(backend.controller_mount(Controller::Cpu).placement, "/tenants/web");
    }

    #[test]
    fn test_missing_placement_fails_validation() {
        let host = FakeHost::new("4:cpu,cpuacct:/\n");
        let mut backend = BackendV1::new(HostPaths::with_proc_root(host.dir.path().join("proc")));
        let err = backend.init("demo").unwrap_err();
        assert!(matches!(err, CgroupError::UnresolvedPlacement { .. }));
    }

    #[test]
    fn test_named_hierarchy_only_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("self")).unwrap();
        fs::write(
            dir.path().join("mounts"),
            "cgroup /sys/fs/cgroup/systemd cgroup rw,name=systemd 0 0\n",
        )
        .unwrap();
        let mut backend = BackendV1::new(HostPaths::with_proc_root(dir.path()));
        let err = backend.init("demo").unwrap_err();
        assert!(matches!(err, CgroupError::BackendUnavailable { fs_type: "cgroup" }));
    }

    #[test]
    fn test_root_memory_limit() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.backend("demo");
        assert_eq!(backend.memory_unlimited_kb, 9223372036854771712u64 >> 10);

        fs::remove_file(host.root().join("memory/memory.limit_in_bytes")).unwrap();
        let backend = host.backend("demo");
        assert_eq!(backend.memory_unlimited_kb, MEMORY_UNLIMITED_KB);
    }

    #[test]
    fn test_make_group_per_controller() {
        let host = FakeHost::new(SELF_CGROUP);
        let mut backend = host.backend("demo");
        fs::create_dir_all(host.root().join("memory/user.slice")).unwrap();

        let flags = GroupFlags {
            memory_hierarchy: true,
            ..GroupFlags::default()
        };
        let enabled = backend.make_group(flags).unwrap();
        assert!(enabled.contains(Controller::Memory));
        assert!(host.root().join("cpu,cpuacct/user.slice/demo").is_dir());
        assert!(host.root().join("memory/user.slice/demo").is_dir());
        assert!(host.root().join("pids/user.slice/demo").is_dir());
        assert!(!host.root().join("systemd/user.slice/session-1.scope").exists());
        // Not provided by the fake filesystem; the failure is only logged.
        assert!(!host.root().join("memory/user.slice/demo/memory.use_hierarchy").exists());
    }

    #[test]
    fn test_add_task() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        let cpu = host.root().join("cpu,cpuacct/user.slice/demo");

        assert!(backend.has_empty_tasks(Controller::Cpu).unwrap());
        // The pids directory has no `tasks` file in the fake tree.
        let err = backend.add_task(4242, TaskMode::Process).unwrap_err();
        assert!(matches!(err, CgroupError::FileNotFound { .. }));
        assert_eq!(fs::read_to_string(cpu.join("tasks")).unwrap(), "4242");

        fs::write(host.root().join("pids/user.slice/demo/tasks"), "").unwrap();
        backend.add_task(4343, TaskMode::Process).unwrap();
        assert!(!backend.has_empty_tasks(Controller::Memory).unwrap());
        assert_eq!(
            fs::read_to_string(host.root().join("pids/user.slice/demo/tasks")).unwrap(),
            "4343"
        );
    }

    #[test]
    fn test_add_task_skips_systemd_hierarchy() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        let scope = host.root().join("systemd/user.slice/session-1.scope");
        fs::create_dir_all(&scope).unwrap();
        fs::write(scope.join("tasks"), "").unwrap();
        fs::write(host.root().join("pids/user.slice/demo/tasks"), "").unwrap();

        backend.add_task(7, TaskMode::Process).unwrap();
        assert_eq!(fs::read_to_string(scope.join("tasks")).unwrap(), "");

        backend.add_task(7, TaskMode::Systemd).unwrap();
        assert_eq!(fs::read_to_string(scope.join("tasks")).unwrap(), "7");
    }

    #[test]
    fn test_add_task_thread_mode() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        let dirs = ["cpu,cpuacct", "memory", "pids"]
            .map(|hierarchy| host.root().join(hierarchy).join("user.slice/demo"));
        for dir in &dirs {
            fs::write(dir.join("cgroup.threads"), "").unwrap();
        }

        backend.add_task(5151, TaskMode::Thread).unwrap();
        for dir in &dirs {
            assert_eq!(fs::read_to_string(dir.join("cgroup.threads")).unwrap(), "5151");
            assert_eq!(fs::read_to_string(dir.join("tasks")).unwrap_or_default(), "");
        }
    }

    #[test]
    fn test_root_placement_disables_controllers() {
        let host = FakeHost::new("12:pids:/\n5:memory:/\n4:cpu,cpuacct:/\n1:name=systemd:/\n");
        let host_paths = HostPaths::with_proc_root(host.dir.path().join("proc"));
        let mut backend = BackendV1::new(host_paths);
        backend.init("").unwrap();

        assert_eq!(backend.controller_mount(Controller::Memory).placement, "/");
        assert!(!backend.has_controller(Controller::Memory));
        assert!(!backend.has_controller(Controller::Cpu));
        assert!(backend.controllers().is_empty());
        assert!(matches!(
            backend.set_memory_hard_limit(1024),
            Err(CgroupError::ControllerNotFound { .. })
        ));
        assert_eq!(
            fs::read_to_string(host.root().join("memory/memory.limit_in_bytes")).unwrap(),
            "9223372036854771712\n"
        );
    }

    #[test]
    fn test_remove_and_root_protection() {
        let host = FakeHost::new(SELF_CGROUP);
        let mut backend = host.group("demo");

        backend.remove().unwrap();
        assert!(!host.root().join("cpu,cpuacct/user.slice/demo").exists());
        assert!(!host.root().join("memory/user.slice/demo").exists());
        assert!(host.root().join("memory/user.slice").is_dir());
        backend.remove().unwrap();

        let mut root = host.backend("/");
        root.remove().unwrap();
        assert!(host.root().join("memory/memory.limit_in_bytes").exists());
    }

    #[test]
    fn test_unmounted_controller() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        let err = backend
            .get_path_of_controller(Controller::Freezer, "freezer.state")
            .unwrap_err();
        assert!(matches!(err, CgroupError::ControllerNotFound { .. }));
    }

    #[test]
    fn test_cpu_period_quota_roundtrip() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");

        assert_eq!(backend.get_cpu_cfs_quota().unwrap(), CPU_QUOTA_UNLIMITED);
        let quota_file = host.root().join("cpu,cpuacct/user.slice/demo/cpu.cfs_quota_us");
        let near_max = CPU_QUOTA_UNLIMITED - 1;
        for (period, quota) in [
            (1000, 1000),
            (100_000, 40_000),
            (100_000, near_max),
            (100_000, CPU_QUOTA_UNLIMITED),
            (1_000_000, -1),
        ] {
            backend.set_cpu_cfs_period(period).unwrap();
            backend.set_cpu_cfs_quota(quota).unwrap();
            let expected_quota = if quota < 0 { CPU_QUOTA_UNLIMITED } else { quota };
            assert_eq!(backend.get_cpu_cfs_period().unwrap(), period);
            assert_eq!(backend.get_cpu_cfs_quota().unwrap(), expected_quota);

            let expected_raw = if quota == near_max { near_max } else { expected_quota };
            if expected_raw == CPU_QUOTA_UNLIMITED {
                assert_eq!(fs::read_to_string(&quota_file).unwrap(), "-1");
            } else {
                assert_eq!(fs::read_to_string(&quota_file).unwrap(), expected_raw.to_string());
            }
        }
    }

    #[test]
    fn test_cpu_quota_validation() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        assert!(matches!(
            backend.set_cpu_cfs_quota(999),
            Err(CgroupError::Validation(_))
        ));
        assert!(matches!(
            backend.set_cpu_cfs_period(999),
            Err(CgroupError::Validation(_))
        ));
    }

    #[test]
    fn test_cpu_shares_and_usage() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");

        assert_eq!(backend.get_cpu_shares().unwrap(), 1024);
        backend.set_cpu_shares(512).unwrap();
        assert_eq!(backend.get_cpu_shares().unwrap(), 512);
        assert!(matches!(
            backend.set_cpu_shares(1),
            Err(CgroupError::Validation(_))
        ));
        assert_eq!(backend.get_cpu_usage().unwrap(), 2500);
    }

    #[test]
    fn test_memory_limits() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        let memory = host.root().join("memory/user.slice/demo");

        assert_eq!(backend.get_memory_hard_limit().unwrap(), MEMORY_UNLIMITED_KB);
        for kb in [0, 4, 20_480, 24_576, (1 << 40) + 3] {
            backend.set_memory_hard_limit(kb).unwrap();
            assert_eq!(backend.get_memory_hard_limit().unwrap(), kb);
        }

        backend.set_memory_soft_limit(20_480).unwrap();
        assert_eq!(
            fs::read_to_string(memory.join("memory.soft_limit_in_bytes")).unwrap(),
            "20971520"
        );

        backend.set_memory_hard_limit(MEMORY_UNLIMITED_KB).unwrap();
        assert_eq!(fs::read_to_string(memory.join("memory.limit_in_bytes")).unwrap(), "-1");
        assert_eq!(backend.get_memory_hard_limit().unwrap(), MEMORY_UNLIMITED_KB);
    }

    #[test]
    fn test_memory_usage_and_stat() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");

        assert_eq!(backend.get_memory_usage().unwrap(), 4);
        let stat = backend.get_memory_stat().unwrap();
        assert_eq!(stat.cache, 2);
        assert_eq!(stat.active_anon, 1);
    }

    #[test]
    fn test_set_owner_all_controllers() {
        let host = FakeHost::new(SELF_CGROUP);
        let backend = host.group("demo");
        backend
            .set_owner(nix::unistd::getuid(), nix::unistd::getgid(), ControllerSet::empty())
            .unwrap();
    }
}
