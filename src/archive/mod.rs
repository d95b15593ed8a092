//! The shared release archive: downloaded once, unpacked into every workspace.

pub mod fetch;
pub mod unpack;

use crate::config::TestbedConfig;
use crate::core::{Result, TestbedError};
use lazy_static::lazy_static;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub use unpack::unpack;

// Serialises first-time downloads within this process. Separate processes
// sharing a temp root should pre-seed the cache.
lazy_static! {
    static ref ARCHIVE_LOCK: Mutex<()> = Mutex::new(());
}

/// Location of the cached release archive and where to get it from.
#[derive(Debug, Clone)]
pub struct ArchiveCache {
    url: String,
    path: PathBuf,
    timeout: Duration,
}

impl ArchiveCache {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TestbedConfig) -> Self {
        Self::new(config.archive_url(), config.archive_path(), config.download_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_cached(&self) -> bool {
        self.path.is_file()
    }

    /// Return the cached archive, downloading it first if it is missing.
    ///
    /// Presence is the only check: a file at the cache path is trusted as is.
    pub fn ensure(&self) -> Result<PathBuf> {
        let _guard = ARCHIVE_LOCK.lock()?;

        if self.is_cached() {
            debug!("Using cached archive {}", self.path.display());
            return Ok(self.path.clone());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TestbedError::DirectoryCreateFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!("Downloading {} to {}", self.url, self.path.display());
        let bytes = fetch::download(&self.url, &self.path, self.timeout)?;
        info!("Downloaded {} bytes", bytes);

        Ok(self.path.clone())
    }

    /// Delete the cached archive so the next `ensure` downloads it again.
    pub fn evict(&self) -> Result<bool> {
        let _guard = ARCHIVE_LOCK.lock()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TestbedError::ArchiveFetchFailed {
                url: self.url.clone(),
                reason: format!("failed to evict '{}': {e}", self.path.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    /// Serve `body` to every request, slowly, counting requests.
    fn serve_counting(body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                thread::sleep(Duration::from_millis(200));
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(body).unwrap();
            }
        });

        (format!("http://{addr}/apache-cassandra-1.2.11-bin.tar.gz"), served)
    }

    #[test]
    fn test_concurrent_first_fetch_downloads_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("apache-cassandra-1.2.11-bin.tar.gz");
        let (url, served) = serve_counting(b"archive-bytes");
        let cache = ArchiveCache::new(url, &path, Duration::from_secs(10));

        let results: Vec<PathBuf> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| cache.ensure().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(served.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|p| *p == path));
        assert_eq!(std::fs::read(&path).unwrap(), b"archive-bytes");
    }

    #[test]
    fn test_cached_archive_is_not_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("apache-cassandra-1.2.11-bin.tar.gz");
        std::fs::write(&path, b"seeded").unwrap();

        // Unroutable URL: any fetch attempt would fail.
        let cache = ArchiveCache::new("http://127.0.0.1:1/never", &path, Duration::from_secs(1));

        assert_eq!(cache.ensure().unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"seeded");
    }

    #[test]
    fn test_failed_fetch_leaves_cache_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache").join("archive.tar.gz");
        let port = crate::core::free_port().unwrap();
        let cache = ArchiveCache::new(
            format!("http://127.0.0.1:{port}/archive.tar.gz"),
            &path,
            Duration::from_secs(5),
        );

        let err = cache.ensure().unwrap_err();

        assert!(matches!(err, TestbedError::ArchiveFetchFailed { .. }));
        assert!(!cache.is_cached());
    }

    #[test]
    fn test_from_config() {
        let config = TestbedConfig::new().tmp_root("/tmp/fixtures");
        let cache = ArchiveCache::from_config(&config);

        assert_eq!(cache.path(), Path::new("/tmp/fixtures/apache-cassandra-1.2.11-bin.tar.gz"));
        assert!(cache.url().ends_with("/1.2.11/apache-cassandra-1.2.11-bin.tar.gz"));
    }

    #[test]
    fn test_evict() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("archive.tar.gz");
        std::fs::write(&path, b"x").unwrap();
        let cache = ArchiveCache::new("http://127.0.0.1:1/x", &path, Duration::from_secs(1));

        assert!(cache.evict().unwrap());
        assert!(!cache.evict().unwrap());
    }
}
