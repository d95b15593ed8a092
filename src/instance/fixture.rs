use crate::config::TestbedConfig;
use crate::core::{Result, free_port};
use crate::instance::manager::{InstanceManager, ProvisionedInstance};
use log::warn;

/// An instance that is terminated when the guard goes out of scope.
///
/// ```no_run
/// use cassandra_testbed::{CassandraFixture, TestbedConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fixture = CassandraFixture::start(TestbedConfig::from_env()?)?;
/// let port = fixture.client_port();
/// // ... point the code under test at 127.0.0.1:port ...
/// # Ok(())
/// # }
/// ```
pub struct CassandraFixture {
    manager: InstanceManager,
    instance: ProvisionedInstance,
    stopped: bool,
}

impl CassandraFixture {
    /// Provision on a freshly allocated client port.
    pub fn start(config: TestbedConfig) -> Result<Self> {
        let client_port = free_port()?;
        Self::start_on(config, client_port, None)
    }

    pub fn start_on(config: TestbedConfig, client_port: u16, storage_port: Option<u16>) -> Result<Self> {
        let manager = InstanceManager::new(config)?;
        let instance = manager.provision(client_port, storage_port)?;
        Ok(Self {
            manager,
            instance,
            stopped: false,
        })
    }

    pub fn instance(&self) -> &ProvisionedInstance {
        &self.instance
    }

    pub fn client_port(&self) -> u16 {
        self.instance.client_port()
    }

    pub fn manager(&self) -> &InstanceManager {
        &self.manager
    }

    /// Terminate now and report any failure instead of logging it.
    pub fn stop(mut self) -> Result<()> {
        self.stopped = true;
        self.manager.terminate(self.instance.client_port())
    }
}

impl Drop for CassandraFixture {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        if let Err(e) = self.manager.terminate(self.instance.client_port()) {
            warn!("Failed to tear down instance on port {}: {}", self.instance.client_port(), e);
        }
    }
}
