//! Memory statistics from `memory.stat`.
//!
//! The two kernel interfaces report page cache under different keys
//! (`cache` on v1, `file` on v2), so each has its own parser wrapping the
//! shared [`MemoryStat`].

use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;

/// Memory usage breakdown, all values in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    /// Page cache (`cache` on v1, `file` on v2).
    pub cache: u64,
    pub active_anon: u64,
    pub inactive_anon: u64,
    pub active_file: u64,
    pub inactive_file: u64,
    pub unevictable: u64,
}

impl MemoryStat {
    /// Returns a copy with every value shifted from bytes to kilobytes.
    pub fn in_kb(&self) -> MemoryStat {
        MemoryStat {
            cache: self.cache >> 10,
            active_anon: self.active_anon >> 10,
            inactive_anon: self.inactive_anon >> 10,
            active_file: self.active_file >> 10,
            inactive_file: self.inactive_file >> 10,
            unevictable: self.unevictable >> 10,
        }
    }
}

/// `memory.stat` of the legacy hierarchy.
#[derive(Debug, Default)]
pub struct V1MemoryStat(pub MemoryStat);

/// `memory.stat` of the unified hierarchy.
#[derive(Debug, Default)]
pub struct V2MemoryStat(pub MemoryStat);

type V1Setter = fn(&mut V1MemoryStat, u64);
type V2Setter = fn(&mut V2MemoryStat, u64);

static V1_SETTERS: LazyLock<HashMap<&'static str, V1Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, V1Setter> = HashMap::with_capacity(6);

    m.insert("cache", |stat, v| stat.0.cache = v);
    m.insert("active_anon", |stat, v| stat.0.active_anon = v);
    m.insert("inactive_anon", |stat, v| stat.0.inactive_anon = v);
    m.insert("active_file", |stat, v| stat.0.active_file = v);
    m.insert("inactive_file", |stat, v| stat.0.inactive_file = v);
    m.insert("unevictable", |stat, v| stat.0.unevictable = v);

    m
});

static V2_SETTERS: LazyLock<HashMap<&'static str, V2Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, V2Setter> = HashMap::with_capacity(6);

    m.insert("file", |stat, v| stat.0.cache = v);
    m.insert("active_anon", |stat, v| stat.0.active_anon = v);
    m.insert("inactive_anon", |stat, v| stat.0.inactive_anon = v);
    m.insert("active_file", |stat, v| stat.0.active_file = v);
    m.insert("inactive_file", |stat, v| stat.0.inactive_file = v);
    m.insert("unevictable", |stat, v| stat.0.unevictable = v);

    m
});

impl KeyValueStat for V1MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &V1_SETTERS
    }
}

impl KeyValueStat for V2MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &V2_SETTERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_memory_stat() {
        let data = "\
cache 4096
rss 8192
active_anon 1024
inactive_anon 2048
active_file 3072
inactive_file 1024
unevictable 0
total_cache 999999
";
        let stat = V1MemoryStat::from_reader(&mut data.as_bytes()).unwrap().0;
        assert_eq!(stat.cache, 4096);
        assert_eq!(stat.active_anon, 1024);
        assert_eq!(stat.inactive_anon, 2048);
        assert_eq!(stat.active_file, 3072);
        assert_eq!(stat.inactive_file, 1024);
        assert_eq!(stat.unevictable, 0);
    }

    #[test]
    fn test_parse_v2_memory_stat() {
        let data = "\
anon 1000
file 2048
kernel_stack 300
active_anon 4096
inactive_anon 0
active_file 1024
inactive_file 1024
unevictable 512
";
        let stat = V2MemoryStat::from_reader(&mut data.as_bytes()).unwrap().0;
        assert_eq!(stat.cache, 2048);
        assert_eq!(stat.active_anon, 4096);
        assert_eq!(stat.unevictable, 512);
    }

    #[test]
    fn test_v1_ignores_v2_keys() {
        let stat = V1MemoryStat::from_reader(&mut "file 2048\n".as_bytes()).unwrap().0;
        assert_eq!(stat, MemoryStat::default());
    }

    #[test]
    fn test_memory_stat_in_kb() {
        let stat = MemoryStat {
            cache: 4096,
            active_anon: 1024,
            inactive_anon: 1023,
            active_file: 0,
            inactive_file: 2048,
            unevictable: 10240,
        };
        let kb = stat.in_kb();
        assert_eq!(kb.cache, 4);
        assert_eq!(kb.active_anon, 1);
        assert_eq!(kb.inactive_anon, 0);
        assert_eq!(kb.inactive_file, 2);
        assert_eq!(kb.unevictable, 10);
    }
}
