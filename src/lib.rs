// ============================================================================
// cassandra-testbed Library
// ============================================================================

pub mod core;
pub mod config;
pub mod archive;
pub mod rewrite;
pub mod instance;

// Re-export main types for convenience
pub use crate::core::{PortTriple, Result, TestbedError, WorkspaceState, free_port};
pub use config::TestbedConfig;
pub use archive::ArchiveCache;
pub use rewrite::{SubstitutionRule, SubstitutionSet};
pub use instance::{CassandraFixture, InstanceManager, InstanceManifest, ProvisionedInstance, WorkspaceInfo};

// ============================================================================
// Function API
// ============================================================================

/// Start an instance on `client_port` using configuration from the
/// environment.
///
/// Returns the workspace base directory and the name of the unpacked archive
/// directory inside it.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let port = cassandra_testbed::free_port()?;
/// let (base_dir, archive_name) = cassandra_testbed::start_cassandra(port, None)?;
/// let yaml = base_dir.join(&archive_name).join("conf/cassandra.yaml");
/// # let _ = yaml;
/// cassandra_testbed::stop_cassandra(port)?;
/// # Ok(())
/// # }
/// ```
pub fn start_cassandra(client_port: u16, storage_port: Option<u16>) -> Result<(std::path::PathBuf, String)> {
    let manager = InstanceManager::new(TestbedConfig::from_env()?)?;
    let instance = manager.provision(client_port, storage_port)?;
    Ok((instance.base_dir, instance.archive_name))
}

/// Kill the instance started on `client_port` and delete its workspace.
///
/// Only works for instances started by this crate.
pub fn stop_cassandra(client_port: u16) -> Result<()> {
    InstanceManager::new(TestbedConfig::from_env()?)?.terminate(client_port)
}
