use crate::archive::{self, ArchiveCache};
use crate::config::TestbedConfig;
use crate::core::{PortAllocation, PortTriple, Result, TestbedError, WorkspaceState};
use crate::instance::launcher::{self, Launcher};
use crate::instance::manifest::InstanceManifest;
use crate::instance::workspace::{Workspace, parse_pid};
use crate::rewrite::{self, templates::ConfigFile};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Mutex;

/// A running instance returned by [`InstanceManager::provision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedInstance {
    pub base_dir: PathBuf,
    pub archive_name: String,
    pub ports: PortTriple,
    pub pid: i32,
}

impl ProvisionedInstance {
    pub fn client_port(&self) -> u16 {
        self.ports.client
    }

    /// Directory of the unpacked distribution (`conf/`, `bin/`, ...).
    pub fn install_dir(&self) -> PathBuf {
        self.base_dir.join(&self.archive_name)
    }

    pub fn system_log(&self) -> PathBuf {
        self.base_dir.join("system.log")
    }

    /// Base directory and archive name, the pair callers use to find logs
    /// and config.
    pub fn location(&self) -> (&Path, &str) {
        (&self.base_dir, &self.archive_name)
    }
}

/// A workspace found on disk by [`InstanceManager::list_workspaces`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub client_port: u16,
    pub base_dir: PathBuf,
    pub pid: Option<i32>,
    pub running: bool,
}

/// Provisions and tears down local instances, one per client port.
///
/// Calls are synchronous. Servers are found through their pid files, so an
/// instance started by another process can be terminated too. Launch scripts
/// that were still running when their server came up are kept here until
/// [`InstanceManager::terminate`] reaps them.
pub struct InstanceManager {
    config: TestbedConfig,
    archive: ArchiveCache,
    wrappers: Mutex<HashMap<u16, Child>>,
}

impl InstanceManager {
    pub fn new(config: TestbedConfig) -> Result<Self> {
        config.validate()?;
        let archive = ArchiveCache::from_config(&config);
        Ok(Self {
            config,
            archive,
            wrappers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &TestbedConfig {
        &self.config
    }

    pub fn archive(&self) -> &ArchiveCache {
        &self.archive
    }

    pub fn workspace(&self, client_port: u16) -> Workspace {
        Workspace::new(&self.config, client_port)
    }

    /// Make sure the release archive is in the local cache.
    pub fn ensure_archive(&self) -> Result<PathBuf> {
        self.archive.ensure()
    }

    /// Start an instance listening on `client_port`.
    ///
    /// The storage port is allocated when not supplied; the management port
    /// always is. On failure the workspace directory is left in place for
    /// inspection and has to be removed with [`InstanceManager::cleanup`].
    pub fn provision(&self, client_port: u16, storage_port: Option<u16>) -> Result<ProvisionedInstance> {
        let workspace = self.workspace(client_port);

        transition(client_port, WorkspaceState::Absent);
        let archive_path = self.ensure_archive()?;

        workspace.create()?;
        info!("Installing cassandra in {}", workspace.base_dir().display());

        transition(client_port, WorkspaceState::Downloading);
        let archive_name = self.unpack_into(&archive_path, &workspace)?;
        workspace.create_data_dirs()?;

        transition(client_port, WorkspaceState::Unpacking);
        let allocation = PortAllocation::allocate(client_port, storage_port)?;
        info!("Cassandra client port {}", client_port);
        self.rewrite_configs(&workspace, &archive_name, &allocation.ports())?;
        let ports = allocation.release();

        transition(client_port, WorkspaceState::Configuring);
        let mut launcher = Launcher::new(
            workspace.install_dir(&archive_name),
            workspace.pid_file(),
            workspace.launcher_log(),
        )
        .timeout(self.config.launch_timeout);
        if self.config.require_java {
            launcher = launcher.require_java(&self.config.java_binary);
        }
        let launched = launcher.launch()?;
        let pid = launched.pid;
        if let Some(wrapper) = launched.wrapper {
            self.wrappers.lock()?.insert(client_port, wrapper);
        }

        let manifest = InstanceManifest {
            version: self.config.version.clone(),
            archive_name: archive_name.clone(),
            base_dir: workspace.base_dir().to_path_buf(),
            ports,
            pid,
            started_at: Utc::now(),
        };
        if let Err(e) = manifest.save(&workspace.manifest_path()) {
            warn!("Could not record instance manifest: {}", e);
        }

        info!(
            "Cassandra running on client port {} (storage {}, jmx {}), pid {}",
            ports.client, ports.storage, ports.management, pid
        );

        Ok(ProvisionedInstance {
            base_dir: workspace.base_dir().to_path_buf(),
            archive_name,
            ports,
            pid,
        })
    }

    /// Kill the instance on `client_port` and delete its workspace.
    ///
    /// Fails with `WorkspaceNotFound`, touching nothing, when there is no
    /// workspace or no pid file for that port.
    pub fn terminate(&self, client_port: u16) -> Result<()> {
        let workspace = self.workspace(client_port);
        if !workspace.exists() {
            return Err(TestbedError::WorkspaceNotFound(client_port));
        }
        let pid = workspace.read_pid()?;

        transition(client_port, WorkspaceState::Running);
        info!("Killing Cassandra pid {}", pid);

        let delivered = launcher::kill_process(pid).map_err(|e| TestbedError::TerminateFailed {
            port: client_port,
            reason: format!("kill({pid}) failed: {e}"),
        })?;
        if delivered {
            launcher::reap(pid);
        } else {
            warn!("Pid {} was already gone", pid);
        }

        if let Some(mut wrapper) = self.wrappers.lock()?.remove(&client_port) {
            let _ = wrapper.kill();
            if let Err(e) = wrapper.wait() {
                debug!("Could not reap launch script {}: {}", wrapper.id(), e);
            }
        }

        workspace.remove()?;
        transition(client_port, WorkspaceState::Terminating);
        Ok(())
    }

    /// Remove a workspace without signalling anything, e.g. after a failed
    /// provision.
    pub fn cleanup(&self, client_port: u16) -> Result<()> {
        let workspace = self.workspace(client_port);
        if !workspace.exists() {
            return Err(TestbedError::WorkspaceNotFound(client_port));
        }
        if let Some(mut wrapper) = self.wrappers.lock()?.remove(&client_port) {
            let _ = wrapper.kill();
            let _ = wrapper.wait();
        }
        info!("Removing {}", workspace.base_dir().display());
        workspace.remove()
    }

    /// Whether the pid recorded for `client_port` is alive.
    pub fn is_running(&self, client_port: u16) -> Result<bool> {
        let pid = self.workspace(client_port).read_pid()?;
        Ok(launcher::process_alive(pid))
    }

    /// Every `<prefix>.<port>` directory under the temp root, by port.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceInfo>> {
        let entries = match fs::read_dir(&self.config.tmp_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TestbedError::WorkspaceScanFailed {
                    path: self.config.tmp_root.clone(),
                    source,
                });
            }
        };

        let prefix = format!("{}.", self.config.prefix);
        let mut found = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(port) = name
                .to_str()
                .and_then(|n| n.strip_prefix(prefix.as_str()))
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }

            let workspace = self.workspace(port);
            let pid = fs::read_to_string(workspace.pid_file()).ok().as_deref().and_then(parse_pid);
            found.push(WorkspaceInfo {
                client_port: port,
                base_dir: workspace.base_dir().to_path_buf(),
                pid,
                running: pid.is_some_and(launcher::process_alive),
            });
        }

        found.sort_by_key(|info| info.client_port);
        Ok(found)
    }

    fn unpack_into(&self, archive_path: &Path, workspace: &Workspace) -> Result<String> {
        let expected = self.config.archive_dir_name();
        let roots = archive::unpack(archive_path, workspace.base_dir())?;
        if !roots.contains(&expected) {
            return Err(TestbedError::UnpackFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("expected top-level directory '{expected}', found {roots:?}"),
            });
        }
        Ok(expected)
    }

    fn rewrite_configs(&self, workspace: &Workspace, archive_name: &str, ports: &PortTriple) -> Result<()> {
        let install_dir = workspace.install_dir(archive_name);
        for file in ConfigFile::ALL {
            let rules = file.substitutions(workspace.base_dir(), ports, &self.config);
            rewrite::rewrite_file(&file.path_in(&install_dir), &rules, self.config.strict_substitution)?;
        }
        Ok(())
    }
}

impl Drop for InstanceManager {
    fn drop(&mut self) {
        // Instances outlive the manager; only reap what already exited.
        if let Ok(wrappers) = self.wrappers.get_mut() {
            for wrapper in wrappers.values_mut() {
                let _ = wrapper.try_wait();
            }
        }
    }
}

/// Log leaving `from` for the next lifecycle stage.
fn transition(client_port: u16, from: WorkspaceState) {
    debug!("Workspace {}: {} -> {}", client_port, from, from.next());
}
