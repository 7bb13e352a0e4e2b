//! Name tables for cgroup controllers and their control files.
//!
//! Both kernel interfaces expose the same resource knobs under different
//! names (`cpu.cfs_quota_us` vs `cpu.max`, `blkio` vs `io`, ...). The
//! lookups here are plain `match` tables keyed by [`BackendType`] so no
//! mutable global state is involved.

use std::fmt;

/// The cgroup kernel interface a backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Legacy per-controller hierarchies (`cgroup` filesystem).
    V1,
    /// Unified hierarchy (`cgroup2` filesystem).
    V2,
}

impl BackendType {
    /// Filesystem type string as it appears in `/proc/mounts`.
    pub fn fs_type(self) -> &'static str {
        match self {
            BackendType::V1 => "cgroup",
            BackendType::V2 => "cgroup2",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fs_type())
    }
}

/// A kernel resource controller.
///
/// The discriminant doubles as the bit index inside a [`ControllerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Controller {
    Cpu = 0,
    Cpuacct,
    Cpuset,
    Memory,
    Devices,
    Freezer,
    /// `blkio` on v1, `io` on v2.
    Blkio,
    NetCls,
    Pids,
    Rdma,
    PerfEvent,
    /// The named `name=systemd` hierarchy.
    Systemd,
}

impl Controller {
    /// Number of known controllers.
    pub const COUNT: usize = 12;

    /// Every controller in ordinal order.
    pub const ALL: [Controller; Controller::COUNT] = [
        Controller::Cpu,
        Controller::Cpuacct,
        Controller::Cpuset,
        Controller::Memory,
        Controller::Devices,
        Controller::Freezer,
        Controller::Blkio,
        Controller::NetCls,
        Controller::Pids,
        Controller::Rdma,
        Controller::PerfEvent,
        Controller::Systemd,
    ];

    /// Ordinal of the controller, used as bit index and slot index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name of the controller as used by the given backend, both in mount
    /// options, `/proc/self/cgroup` and `cgroup.controllers`.
    pub fn name(self, backend: BackendType) -> &'static str {
        match self {
            Controller::Cpu => "cpu",
            Controller::Cpuacct => "cpuacct",
            Controller::Cpuset => "cpuset",
            Controller::Memory => "memory",
            Controller::Devices => "devices",
            Controller::Freezer => "freezer",
            Controller::Blkio => match backend {
                BackendType::V1 => "blkio",
                BackendType::V2 => "io",
            },
            Controller::NetCls => "net_cls",
            Controller::Pids => "pids",
            Controller::Rdma => "rdma",
            Controller::PerfEvent => "perf_event",
            Controller::Systemd => "name=systemd",
        }
    }

    /// Looks up a controller by its backend-specific name.
    ///
    /// Returns `None` for names this crate does not track (e.g. `hugetlb`).
    pub fn from_name(backend: BackendType, name: &str) -> Option<Controller> {
        Controller::ALL
            .into_iter()
            .find(|controller| controller.name(backend) == name)
    }
}

/// Bitmask of controllers, bit `i` standing for the controller with ordinal `i`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ControllerSet(u32);

impl ControllerSet {
    pub const fn empty() -> Self {
        ControllerSet(0)
    }

    pub fn all() -> Self {
        Controller::ALL.into_iter().collect()
    }

    pub fn contains(self, controller: Controller) -> bool {
        self.0 & (1 << controller.index()) != 0
    }

    pub fn insert(&mut self, controller: Controller) {
        self.0 |= 1 << controller.index();
    }

    pub fn remove(&mut self, controller: Controller) {
        self.0 &= !(1 << controller.index());
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn intersection(self, other: ControllerSet) -> ControllerSet {
        ControllerSet(self.0 & other.0)
    }

    /// Iterates over the contained controllers in ordinal order.
    pub fn iter(self) -> impl Iterator<Item = Controller> {
        Controller::ALL
            .into_iter()
            .filter(move |controller| self.contains(*controller))
    }

    /// Parses a whitespace-separated controller list such as the content of
    /// `cgroup.controllers`. Unknown names are skipped.
    pub fn parse_list(backend: BackendType, list: &str) -> ControllerSet {
        list.split_whitespace()
            .filter_map(|name| Controller::from_name(backend, name))
            .collect()
    }
}

impl FromIterator<Controller> for ControllerSet {
    fn from_iter<I: IntoIterator<Item = Controller>>(iter: I) -> Self {
        let mut set = ControllerSet::empty();
        for controller in iter {
            set.insert(controller);
        }
        set
    }
}

impl fmt::Debug for ControllerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Logical control files that differ in name between the two backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerFile {
    CgroupProcs,
    CgroupThreads,
    CpuUsage,
    CpuShares,
    CpuCfsPeriod,
    CpuCfsQuota,
    MemoryUsage,
    MemoryHardLimit,
    MemorySoftLimit,
    MemorySwapUsage,
    MemorySwapHardLimit,
    MemorySwapSoftLimit,
    MemoryStat,
}

impl ControllerFile {
    /// File name of this control file under the given backend.
    ///
    /// On v2 the CFS period and quota share the single `cpu.max` file.
    pub fn name(self, backend: BackendType) -> &'static str {
        match backend {
            BackendType::V1 => match self {
                ControllerFile::CgroupProcs => "tasks",
                ControllerFile::CgroupThreads => "cgroup.threads",
                ControllerFile::CpuUsage => "cpuacct.usage",
                ControllerFile::CpuShares => "cpu.shares",
                ControllerFile::CpuCfsPeriod => "cpu.cfs_period_us",
                ControllerFile::CpuCfsQuota => "cpu.cfs_quota_us",
                ControllerFile::MemoryUsage => "memory.usage_in_bytes",
                ControllerFile::MemoryHardLimit => "memory.limit_in_bytes",
                ControllerFile::MemorySoftLimit => "memory.soft_limit_in_bytes",
                ControllerFile::MemorySwapUsage => "memory.memsw.usage_in_bytes",
                ControllerFile::MemorySwapHardLimit => "memory.memsw.limit_in_bytes",
                ControllerFile::MemorySwapSoftLimit => "memory.memsw.soft_limit_in_bytes",
                ControllerFile::MemoryStat => "memory.stat",
            },
            BackendType::V2 => match self {
                ControllerFile::CgroupProcs => "cgroup.procs",
                ControllerFile::CgroupThreads => "cgroup.threads",
                ControllerFile::CpuUsage => "cpu.stat",
                ControllerFile::CpuShares => "cpu.weight",
                ControllerFile::CpuCfsPeriod | ControllerFile::CpuCfsQuota => "cpu.max",
                ControllerFile::MemoryUsage => "memory.current",
                ControllerFile::MemoryHardLimit => "memory.max",
                ControllerFile::MemorySoftLimit => "memory.high",
                ControllerFile::MemorySwapUsage => "memory.swap.current",
                ControllerFile::MemorySwapHardLimit => "memory.swap.max",
                ControllerFile::MemorySwapSoftLimit => "memory.swap.high",
                ControllerFile::MemoryStat => "memory.stat",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_names_roundtrip_for_both_backends() {
        for backend in [BackendType::V1, BackendType::V2] {
            for controller in Controller::ALL {
                let name = controller.name(backend);
                assert_eq!(Controller::from_name(backend, name), Some(controller));
            }
        }
    }

    #[test]
    fn test_block_io_controller_name_differs() {
        assert_eq!(Controller::Blkio.name(BackendType::V1), "blkio");
        assert_eq!(Controller::Blkio.name(BackendType::V2), "io");
        assert_eq!(Controller::from_name(BackendType::V2, "blkio"), None);
    }

    #[test]
    fn test_unknown_controller_name() {
        assert_eq!(Controller::from_name(BackendType::V2, "hugetlb"), None);
        assert_eq!(Controller::from_name(BackendType::V1, ""), None);
    }

    #[test]
    fn test_controller_set_bits() {
        let mut set = ControllerSet::empty();
        assert!(set.is_empty());
        set.insert(Controller::Cpu);
        set.insert(Controller::Memory);
        assert!(set.contains(Controller::Cpu));
        assert!(set.contains(Controller::Memory));
        assert!(!set.contains(Controller::Pids));
        assert_eq!(set.bits(), 0b1001);
        assert_eq!(set.len(), 2);

        set.remove(Controller::Cpu);
        assert!(!set.contains(Controller::Cpu));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Controller::Memory]);
    }

    #[test]
    fn test_parse_controller_list() {
        let set =
            ControllerSet::parse_list(BackendType::V2, "cpuset cpu io memory hugetlb pids rdma\n");
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![
                Controller::Cpu,
                Controller::Cpuset,
                Controller::Memory,
                Controller::Blkio,
                Controller::Pids,
                Controller::Rdma,
            ]
        );
        assert!(ControllerSet::parse_list(BackendType::V2, "").is_empty());
    }

    #[test]
    fn test_controller_file_names() {
        assert_eq!(ControllerFile::CgroupProcs.name(BackendType::V1), "tasks");
        assert_eq!(ControllerFile::CgroupProcs.name(BackendType::V2), "cgroup.procs");
        assert_eq!(ControllerFile::CpuCfsPeriod.name(BackendType::V2), "cpu.max");
        assert_eq!(ControllerFile::CpuCfsQuota.name(BackendType::V2), "cpu.max");
        assert_eq!(
            ControllerFile::MemorySoftLimit.name(BackendType::V1),
            "memory.soft_limit_in_bytes"
        );
        assert_eq!(ControllerFile::MemorySwapHardLimit.name(BackendType::V2), "memory.swap.max");
    }
}
