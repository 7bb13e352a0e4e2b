//! Cgroup Limits: CPU and memory limits for groups of processes through the
//! Linux cgroup v1 and v2 interfaces.
//!
//! The library detects which cgroup filesystem the host mounts, locates the
//! group to manage relative to the calling process and exposes one
//! [`backend::Backend`] interface over both kernel interfaces. The
//! `cgroup-tenants` binary provisions one group per tenant from a tenants file.
pub mod backend;
pub mod cgroup;
pub mod config;
pub mod controller;
pub mod error;
pub mod fsutil;
pub mod mounts;
pub mod placement;
pub mod stats;
pub mod tenant;

use backend::factory;
use config::{Settings, TenantsFile};
use tenant::TenantConfig;

/// Runs the tenant provisioning.
///
/// For every tenant of the tenants file the group is removed, re-created and
/// limited. A failing tenant is logged and does not stop the others.
///
/// # Errors
///
/// Possible errors include:
/// - The tenants file can't be read or parsed.
/// - The root section holds an invalid `SoftQuotaCushion`.
/// - At least one tenant could not be provisioned.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    log::debug!("Settings: {settings:?}");

    let tenants = TenantsFile::load(&settings.tenants_file)?;
    let mut defaults = TenantConfig::new(config::ROOT_SECTION, 0);
    if let Some(root) = tenants.defaults() {
        defaults.apply_config(root)?;
    }

    let mut failed = 0;
    let mut total = 0;
    for (name, section) in tenants.tenants() {
        total += 1;
        if let Err(err) = provision_tenant(&settings, name, defaults.soft_quota, section) {
            log::error!("Failed to provision tenant `{name}`: {err}");
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {total} tenants failed").into());
    }
    log::info!("Provisioned {total} tenants");
    Ok(())
}

fn provision_tenant(
    settings: &Settings,
    name: &str,
    soft_quota: u32,
    section: &std::collections::BTreeMap<String, String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tenant = TenantConfig::new(name, soft_quota);
    tenant.apply_config(section)?;

    let mut cgroup = factory::get_cgroup(&settings.host_paths, &settings.tenant_path(name))?;
    cgroup.remove()?;
    let controllers = cgroup.make_group(backend::GroupFlags::default())?;
    log::debug!("Tenant `{name}` controllers: {controllers:?}");
    tenant.apply(&cgroup)?;
    Ok(())
}
