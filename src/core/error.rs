use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestbedError {
    #[error("Failed to fetch archive from '{url}': {reason}")]
    ArchiveFetchFailed { url: String, reason: String },

    #[error("Failed to create directory '{}': {source}", .path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unpack '{}': {reason}", .archive.display())]
    UnpackFailed { archive: PathBuf, reason: String },

    #[error("Failed to rewrite config '{}': {reason}", .path.display())]
    ConfigRewriteFailed { path: PathBuf, reason: String },

    #[error("Failed to launch server: {0}")]
    LaunchFailed(String),

    #[error("No workspace for client port {0}")]
    WorkspaceNotFound(u16),

    #[error("Failed to allocate a free port: {0}")]
    PortAllocationFailed(#[source] std::io::Error),

    #[error("Failed to scan workspaces in '{}': {source}", .path.display())]
    WorkspaceScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to terminate instance on client port {port}: {reason}")]
    TerminateFailed { port: u16, reason: String },

    #[error("Instance manifest error: {0}")]
    ManifestError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, TestbedError>;

impl<T> From<std::sync::PoisonError<T>> for TestbedError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
