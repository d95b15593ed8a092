use crate::core::{Result, TestbedError};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Download `url` to `dest` within `timeout`.
///
/// The body is streamed into a temporary sibling of `dest` and renamed into
/// place once complete, so an interrupted transfer never shows up at `dest`.
/// Returns the number of bytes written. There is no retry.
pub fn download(url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
    let fetch_err = |reason: String| TestbedError::ArchiveFetchFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_err(format!("failed to build HTTP client: {e}")))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| fetch_err(format!("request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP status {}", response.status())));
    }

    let dir = dest
        .parent()
        .ok_or_else(|| fetch_err(format!("'{}' has no parent directory", dest.display())))?;
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| fetch_err(format!("temp file: {e}")))?;

    let bytes = response
        .copy_to(&mut temp)
        .map_err(|e| fetch_err(format!("transfer interrupted: {e}")))?;
    temp.flush().map_err(|e| fetch_err(format!("flush failed: {e}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| fetch_err(format!("sync failed: {e}")))?;

    temp.persist(dest)
        .map_err(|e| fetch_err(format!("rename failed: {}", e.error)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    /// Answer exactly one HTTP request with `status` and `body`.
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });

        format!("http://{addr}/apache-cassandra-1.2.11-bin.tar.gz")
    }

    #[test]
    fn test_download_writes_body() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        let url = serve_once("200 OK", b"archive-bytes");

        let bytes = download(&url, &dest, Duration::from_secs(10)).unwrap();

        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
    }

    #[test]
    fn test_http_error_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        let url = serve_once("404 Not Found", b"");

        let err = download(&url, &dest, Duration::from_secs(10)).unwrap_err();

        assert!(matches!(err, TestbedError::ArchiveFetchFailed { .. }));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_connection_refused() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.tar.gz");
        let port = crate::core::free_port().unwrap();
        let url = format!("http://127.0.0.1:{port}/missing.tar.gz");

        let err = download(&url, &dest, Duration::from_secs(5)).unwrap_err();

        assert!(matches!(err, TestbedError::ArchiveFetchFailed { .. }));
        assert!(!dest.exists());
    }
}
