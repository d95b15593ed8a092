use crate::core::{Result, TestbedError};
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path};

/// Extract a `.tar.gz` into `dest`, keeping file modes and mtimes.
///
/// Returns the distinct top-level names found in the archive.
pub fn unpack(archive: &Path, dest: &Path) -> Result<BTreeSet<String>> {
    let unpack_err = |reason: String| TestbedError::UnpackFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive).map_err(|e| unpack_err(format!("open failed: {e}")))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball.set_preserve_permissions(true);
    tarball.set_preserve_mtime(true);

    let mut roots = BTreeSet::new();
    let entries = tarball
        .entries()
        .map_err(|e| unpack_err(format!("not a tar.gz archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| unpack_err(format!("corrupt entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| unpack_err(format!("bad entry path: {e}")))?
            .into_owned();

        if let Some(Component::Normal(first)) = path.components().find(|c| matches!(c, Component::Normal(_))) {
            roots.insert(first.to_string_lossy().into_owned());
        }

        entry
            .unpack_in(dest)
            .map_err(|e| unpack_err(format!("failed to extract '{}': {e}", path.display())))?;
    }

    if roots.is_empty() {
        return Err(unpack_err("archive is empty".to_string()));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn write_archive(path: &Path, files: &[(&str, &[u8], u32)]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpack_reports_top_level_dir() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.tar.gz");
        write_archive(
            &archive,
            &[
                ("apache-cassandra-1.2.11/conf/cassandra.yaml", &b"rpc_port: 9160\n"[..], 0o644),
                ("apache-cassandra-1.2.11/bin/cassandra", &b"#!/bin/sh\n"[..], 0o755),
            ],
        );
        let dest = temp_dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let roots = unpack(&archive, &dest).unwrap();

        assert_eq!(roots.into_iter().collect::<Vec<_>>(), vec!["apache-cassandra-1.2.11"]);
        assert_eq!(
            std::fs::read_to_string(dest.join("apache-cassandra-1.2.11/conf/cassandra.yaml")).unwrap(),
            "rpc_port: 9160\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_keeps_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.tar.gz");
        write_archive(&archive, &[("pkg/bin/cassandra", &b"#!/bin/sh\n"[..], 0o755)]);

        unpack(&archive, temp_dir.path()).unwrap();

        let mode = std::fs::metadata(temp_dir.path().join("pkg/bin/cassandra"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_garbage_archive_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("truncated.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let err = unpack(&archive, temp_dir.path()).unwrap_err();
        assert!(matches!(err, TestbedError::UnpackFailed { .. }));
    }

    #[test]
    fn test_missing_archive_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = unpack(&temp_dir.path().join("absent.tar.gz"), temp_dir.path()).unwrap_err();
        assert!(matches!(err, TestbedError::UnpackFailed { .. }));
    }
}
