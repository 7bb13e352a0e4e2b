//! Per-tenant resource limits read from the tenants file.
//!
//! Every tenant section carries flat string values:
//!
//! - `CPU`: percent of one CPU, e.g. `50%` or `50`.
//! - `Memory`: `512mb`, `65536kb` or a bare number of megabytes.
//! - `SoftQuotaCushion`: percent the hard limits may exceed the
//!   configured values, usually set once in the root section.

use std::collections::BTreeMap;
use std::num::ParseIntError;

use crate::backend;
use crate::cgroup::Cgroup;

const KEY_CPU: &str = "CPU";
const KEY_MEMORY: &str = "Memory";
const KEY_SOFT_QUOTA_CUSHION: &str = "SoftQuotaCushion";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tenant `{tenant}`: invalid value `{value}` for `{key}`: {source}")]
    InvalidValue {
        tenant: String,
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Unit suffix of a configured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Percentage,
    Megabyte,
    Kilobyte,
}

impl Unit {
    /// Splits a value into its number and unit. The value is matched case
    /// insensitively; `None` means no known suffix.
    pub fn split(value: &str) -> (String, Option<Unit>) {
        let value = value.trim().to_lowercase();
        for (suffix, unit) in [
            ("%", Unit::Percentage),
            ("mb", Unit::Megabyte),
            ("kb", Unit::Kilobyte),
        ] {
            if let Some(number) = value.strip_suffix(suffix) {
                return (number.trim().to_owned(), Some(unit));
            }
        }
        (value, None)
    }
}

/// Memory limit as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimit {
    pub value: u32,
    pub unit: Unit,
}

impl MemoryLimit {
    pub fn in_mb(&self) -> f64 {
        match self.unit {
            Unit::Kilobyte => f64::from(self.value) / 1024.0,
            Unit::Megabyte | Unit::Percentage => f64::from(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenantConfig {
    pub name: String,
    /// Percent by which hard limits exceed the configured values.
    pub soft_quota: u32,
    /// Percent of one CPU.
    pub cpu: Option<u32>,
    pub memory: Option<MemoryLimit>,
}

impl TenantConfig {
    pub fn new(name: impl Into<String>, soft_quota: u32) -> Self {
        TenantConfig {
            name: name.into(),
            soft_quota,
            cpu: None,
            memory: None,
        }
    }

    /// Applies the keys of a tenant section. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidValue`] naming the tenant and key if a value is not a
    /// non-negative integer once its unit is removed.
    pub fn apply_config(&mut self, config: &BTreeMap<String, String>) -> Result<()> {
        let tenant = self.name.clone();
        for (key, raw) in config {
            let (number, unit) = Unit::split(raw);
            let parse = || {
                number.parse::<u32>().map_err(|source| Error::InvalidValue {
                    tenant: tenant.clone(),
                    key: key.clone(),
                    value: raw.clone(),
                    source,
                })
            };

            match key.as_str() {
                KEY_SOFT_QUOTA_CUSHION => self.soft_quota = parse()?,
                KEY_CPU => self.cpu = Some(parse()?),
                KEY_MEMORY => {
                    let value = parse()?;
                    let unit = match unit {
                        Some(unit @ (Unit::Megabyte | Unit::Kilobyte)) => unit,
                        _ => {
                            log::warn!(
                                "For tenant `{}`, failed to parse unit of `{}` field, \
                                 value=`{}`, falling back to MB",
                                tenant,
                                key,
                                raw
                            );
                            Unit::Megabyte
                        }
                    };
                    self.memory = Some(MemoryLimit { value, unit });
                }
                _ => log::debug!("Tenant `{}`: ignoring unknown key `{}`", tenant, key),
            }
        }
        Ok(())
    }

    /// Writes the configured limits to `cgroup`.
    pub fn apply(&self, cgroup: &Cgroup) -> backend::Result<()> {
        let soft_quota = f64::from(self.soft_quota);
        if let Some(cpu) = self.cpu {
            cgroup.set_cpu_limit_in_percentage(f64::from(cpu), soft_quota)?;
        }
        if let Some(memory) = self.memory {
            cgroup.set_memory_limit_in_mb(memory.in_mb(), soft_quota)?;
        }
        log::info!(
            "Tenant `{}`: soft quota {}%, cpu {:?}%, memory {:?}",
            self.name,
            self.soft_quota,
            self.cpu,
            self.memory
        );
        Ok(())
    }
}
