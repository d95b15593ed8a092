use crate::core::{Result, TestbedError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_VERSION: &str = "1.2.11";
pub const DEFAULT_MIRROR: &str = "http://archive.apache.org/dist/cassandra";
pub const DEFAULT_PREFIX: &str = "cassandra";

pub const ENV_TMP_ROOT: &str = "CASSANDRA_TESTBED_TMP_ROOT";
pub const ENV_VERSION: &str = "CASSANDRA_TESTBED_VERSION";
pub const ENV_MIRROR: &str = "CASSANDRA_TESTBED_MIRROR";
pub const ENV_PREFIX: &str = "CASSANDRA_TESTBED_PREFIX";
pub const ENV_DOWNLOAD_TIMEOUT: &str = "CASSANDRA_TESTBED_DOWNLOAD_TIMEOUT_SECS";

/// Testbed configuration
///
/// Everything a provisioned instance derives its paths, ports and tuning
/// from. Built with chained setters, or from `CASSANDRA_TESTBED_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct TestbedConfig {
    /// Cassandra release to download
    pub version: String,

    /// Base URL of the release mirror
    pub mirror: String,

    /// Directory holding the archive cache and every workspace
    pub tmp_root: PathBuf,

    /// Workspace directory prefix (`<prefix>.<client port>`)
    pub prefix: String,

    /// Upper bound on the archive download
    pub download_timeout: Duration,

    /// How long to wait for the pid file after spawning the server
    pub launch_timeout: Duration,

    /// Level replacing `INFO` in the log4j config
    pub log_level: String,

    /// `MAX_HEAP_SIZE` in cassandra-env.sh
    pub max_heap_size: String,

    /// `HEAP_NEWSIZE` in cassandra-env.sh
    pub heap_newsize: String,

    /// Fail provisioning when a substitution finds nothing to replace
    pub strict_substitution: bool,

    /// Check that the Java launcher is on PATH before starting the server
    pub require_java: bool,

    /// Name or path of the Java launcher
    pub java_binary: String,
}

impl TestbedConfig {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            mirror: DEFAULT_MIRROR.to_string(),
            tmp_root: std::env::temp_dir(),
            prefix: DEFAULT_PREFIX.to_string(),
            download_timeout: Duration::from_secs(120),
            launch_timeout: Duration::from_secs(30),
            log_level: "DEBUG".to_string(),
            max_heap_size: "256M".to_string(),
            heap_newsize: "100M".to_string(),
            strict_substitution: false,
            require_java: true,
            java_binary: "java".to_string(),
        }
    }

    /// Set the Cassandra version
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the mirror base URL
    pub fn mirror(mut self, mirror: &str) -> Self {
        self.mirror = mirror.trim_end_matches('/').to_string();
        self
    }

    /// Set the temp root
    pub fn tmp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tmp_root = root.into();
        self
    }

    /// Set the workspace prefix
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn heap(mut self, max_heap_size: &str, heap_newsize: &str) -> Self {
        self.max_heap_size = max_heap_size.to_string();
        self.heap_newsize = heap_newsize.to_string();
        self
    }

    pub fn strict_substitution(mut self, strict: bool) -> Self {
        self.strict_substitution = strict;
        self
    }

    pub fn require_java(mut self, require: bool) -> Self {
        self.require_java = require;
        self
    }

    pub fn java_binary(mut self, binary: &str) -> Self {
        self.java_binary = binary.to_string();
        self
    }

    /// Defaults overridden by `CASSANDRA_TESTBED_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`TestbedConfig::from_env`] but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(root) = lookup(ENV_TMP_ROOT) {
            config = config.tmp_root(root);
        }
        if let Some(version) = lookup(ENV_VERSION) {
            config = config.version(&version);
        }
        if let Some(mirror) = lookup(ENV_MIRROR) {
            config = config.mirror(&mirror);
        }
        if let Some(prefix) = lookup(ENV_PREFIX) {
            config = config.prefix(&prefix);
        }
        if let Some(secs) = lookup(ENV_DOWNLOAD_TIMEOUT) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                TestbedError::InvalidConfig(format!("{ENV_DOWNLOAD_TIMEOUT} must be an integer, got '{secs}'"))
            })?;
            config = config.download_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(TestbedError::InvalidConfig("version cannot be empty".to_string()));
        }

        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(TestbedError::InvalidConfig(format!(
                "prefix '{}' must be a non-empty single path component",
                self.prefix
            )));
        }

        if !(self.mirror.starts_with("http://") || self.mirror.starts_with("https://")) {
            return Err(TestbedError::InvalidConfig(format!(
                "mirror '{}' must be an http(s) URL",
                self.mirror
            )));
        }

        if self.download_timeout.is_zero() || self.launch_timeout.is_zero() {
            return Err(TestbedError::InvalidConfig("timeouts must be > 0".to_string()));
        }

        Ok(())
    }

    /// Top-level directory inside the release archive
    pub fn archive_dir_name(&self) -> String {
        format!("apache-cassandra-{}", self.version)
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}-bin.tar.gz", self.archive_dir_name())
    }

    pub fn archive_url(&self) -> String {
        format!("{}/{}/{}", self.mirror, self.version, self.archive_file_name())
    }

    /// Local cache path shared by every workspace
    pub fn archive_path(&self) -> PathBuf {
        self.tmp_root.join(self.archive_file_name())
    }

    /// Base directory of the workspace keyed by `client_port`
    pub fn workspace_dir(&self, client_port: u16) -> PathBuf {
        self.tmp_root.join(format!("{}.{}", self.prefix, client_port))
    }
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self::new()
    }
}
