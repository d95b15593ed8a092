//! Lifecycle of one locally-run server, keyed by its client port.

pub mod fixture;
pub mod launcher;
pub mod manager;
pub mod manifest;
pub mod workspace;

pub use fixture::CassandraFixture;
pub use manager::{InstanceManager, ProvisionedInstance, WorkspaceInfo};
pub use manifest::InstanceManifest;
pub use workspace::Workspace;
