//! CPU statistics and bandwidth settings as reported in cgroup files.
//!
//! - `cpu.stat` (v2) is parsed into [`CpuStat`].
//! - `cpu.max` (v2) holds `"<quota> <period>"` or `"max <period>"` and is
//!   parsed into [`CpuMax`].

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use super::{KeyValueStat, StatParseError};

/// Represents parsed data from a cgroup v2 `cpu.stat` file.
///
/// All times are in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Total CPU time consumed (user + system).
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    /// Number of periods in which the group was throttled.
    pub nr_throttled: u64,
    pub throttled_usec: u64,
}

type Setter = fn(&mut CpuStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(5);

    m.insert("usage_usec", |stat, v| stat.usage_usec = v);
    m.insert("user_usec", |stat, v| stat.user_usec = v);
    m.insert("system_usec", |stat, v| stat.system_usec = v);
    m.insert("nr_throttled", |stat, v| stat.nr_throttled = v);
    m.insert("throttled_usec", |stat, v| stat.throttled_usec = v);

    m
});

impl KeyValueStat for CpuStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// Content of a cgroup v2 `cpu.max` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuMax {
    /// Allowed runtime per period in microseconds, `None` for `"max"`.
    pub quota: Option<u64>,
    /// Enforcement window in microseconds.
    pub period: u64,
}

impl CpuMax {
    /// Parses `"<quota> <period>"` where quota may be the literal `max`.
    ///
    /// Unlike the kernel's write side, both fields are required here, a
    /// read of `cpu.max` always yields both.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::Malformed`] for a missing field and
    /// [`StatParseError::InvalidKeyValue`] for a non-numeric field.
    pub fn parse(value: &str) -> Result<Self, StatParseError> {
        let mut parts = value.split_whitespace();
        let (Some(quota), Some(period)) = (parts.next(), parts.next()) else {
            return Err(StatParseError::Malformed {
                value: value.to_owned(),
                reason: "expected `<quota> <period>`",
            });
        };

        let parse_field = |key: &str, field: &str| {
            field
                .parse::<u64>()
                .map_err(|source| StatParseError::InvalidKeyValue {
                    key: key.to_owned(),
                    value: field.to_owned(),
                    line: 1,
                    source,
                })
        };

        let quota = match quota {
            "max" => None,
            quota => Some(parse_field("quota", quota)?),
        };
        let period = parse_field("period", period)?;

        Ok(CpuMax { quota, period })
    }
}

impl fmt::Display for CpuMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quota {
            Some(quota) => write!(f, "{} {}", quota, self.period),
            None => write!(f, "max {}", self.period),
        }
    }
}
