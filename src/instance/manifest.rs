use crate::core::{PortTriple, Result, TestbedError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What was launched in a workspace, written next to the pid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceManifest {
    pub version: String,
    pub archive_name: String,
    pub base_dir: PathBuf,
    pub ports: PortTriple,
    pub pid: i32,
    pub started_at: DateTime<Utc>,
}

impl InstanceManifest {
    pub fn save(&self, path: &Path) -> Result<()> {
        let manifest_err = |reason: String| TestbedError::ManifestError(format!("{}: {reason}", path.display()));

        let json = serde_json::to_vec_pretty(self).map_err(|e| manifest_err(e.to_string()))?;
        let dir = path
            .parent()
            .ok_or_else(|| manifest_err("no parent directory".to_string()))?;
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| manifest_err(e.to_string()))?;
        temp.write_all(&json).map_err(|e| manifest_err(e.to_string()))?;
        temp.persist(path).map_err(|e| manifest_err(e.error.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| TestbedError::ManifestError(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&data).map_err(|e| TestbedError::ManifestError(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instance.json");
        let manifest = InstanceManifest {
            version: "1.2.11".to_string(),
            archive_name: "apache-cassandra-1.2.11".to_string(),
            base_dir: temp_dir.path().to_path_buf(),
            ports: PortTriple { client: 15000, storage: 41000, management: 42000 },
            pid: 4242,
            started_at: Utc::now(),
        };

        manifest.save(&path).unwrap();
        let loaded = InstanceManifest::load(&path).unwrap();

        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instance.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(InstanceManifest::load(&path), Err(TestbedError::ManifestError(_))));
    }
}
