/// Entry point of the `cgroup-tenants` provisioning tool.
///
/// Reads the tenants file and creates one cgroup with CPU and memory limits
/// per tenant.
///
/// # Errors
///
/// Returns an error if the tenants file is unusable or any tenant failed.
///
/// # Examples
///
/// ```bash
/// TENANTS_FILE=./tenants.json TENANT_CGROUP_PARENT=/tenants cargo run
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cgroup_limits::run()
}
