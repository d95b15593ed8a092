use crate::config::TestbedConfig;
use crate::core::{Result, TestbedError};
use std::fs;
use std::path::{Path, PathBuf};

/// Data directories created next to the unpacked archive.
pub const DATA_SUBDIRS: [&str; 3] = ["commit", "data", "saved_caches"];

pub const PID_FILE: &str = "pid";
pub const MANIFEST_FILE: &str = "instance.json";
pub const LAUNCHER_LOG: &str = "launcher.log";

/// The directory tree owned by one instance: `<tmp root>/<prefix>.<client port>/`.
///
/// Directory collision is what keeps client ports unique; nothing is locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    client_port: u16,
    base_dir: PathBuf,
}

impl Workspace {
    pub fn new(config: &TestbedConfig, client_port: u16) -> Self {
        Self {
            client_port,
            base_dir: config.workspace_dir(client_port),
        }
    }

    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn install_dir(&self, archive_name: &str) -> PathBuf {
        self.base_dir.join(archive_name)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join(PID_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base_dir.join(MANIFEST_FILE)
    }

    pub fn launcher_log(&self) -> PathBuf {
        self.base_dir.join(LAUNCHER_LOG)
    }

    pub fn exists(&self) -> bool {
        self.base_dir.is_dir()
    }

    /// Create the base directory. Fails if it already exists.
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.base_dir.parent() {
            fs::create_dir_all(parent).map_err(|source| TestbedError::DirectoryCreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::create_dir(&self.base_dir).map_err(|source| TestbedError::DirectoryCreateFailed {
            path: self.base_dir.clone(),
            source,
        })
    }

    /// Create `commit/`, `data/` and `saved_caches/`.
    pub fn create_data_dirs(&self) -> Result<()> {
        for name in DATA_SUBDIRS {
            let path = self.base_dir.join(name);
            fs::create_dir(&path).map_err(|source| TestbedError::DirectoryCreateFailed { path, source })?;
        }
        Ok(())
    }

    /// The pid recorded by the server.
    pub fn read_pid(&self) -> Result<i32> {
        let path = self.pid_file();
        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TestbedError::WorkspaceNotFound(self.client_port),
            _ => TestbedError::TerminateFailed {
                port: self.client_port,
                reason: format!("failed to read '{}': {e}", path.display()),
            },
        })?;
        parse_pid(&contents).ok_or_else(|| TestbedError::TerminateFailed {
            port: self.client_port,
            reason: format!("'{}' does not hold a pid: {:?}", path.display(), contents.trim()),
        })
    }

    /// Delete the whole tree.
    pub fn remove(&self) -> Result<()> {
        fs::remove_dir_all(&self.base_dir).map_err(|e| TestbedError::TerminateFailed {
            port: self.client_port,
            reason: format!("failed to remove '{}': {e}", self.base_dir.display()),
        })
    }
}

/// Parse a pid file body. Only positive integers are accepted.
pub fn parse_pid(contents: &str) -> Option<i32> {
    contents.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}
