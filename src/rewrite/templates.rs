//! Substitutions applied to a stock Cassandra 1.2 `conf/` directory.
//!
//! Every find text is the literal default shipped upstream. If a release
//! changes one of those lines the rule stops matching, which
//! [`super::rewrite_file`] reports.

use super::SubstitutionSet;
use crate::config::TestbedConfig;
use crate::core::PortTriple;
use std::path::{Path, PathBuf};

/// The three files edited in every workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    CassandraYaml,
    Log4jServer,
    CassandraEnv,
}

impl ConfigFile {
    pub const ALL: [ConfigFile; 3] = [Self::CassandraYaml, Self::Log4jServer, Self::CassandraEnv];

    /// Path relative to the unpacked archive directory.
    pub fn relative_path(self) -> &'static str {
        match self {
            Self::CassandraYaml => "conf/cassandra.yaml",
            Self::Log4jServer => "conf/log4j-server.properties",
            Self::CassandraEnv => "conf/cassandra-env.sh",
        }
    }

    pub fn path_in(self, install_dir: &Path) -> PathBuf {
        install_dir.join(self.relative_path())
    }

    /// Rules for this file given the workspace base directory and ports.
    pub fn substitutions(self, base_dir: &Path, ports: &PortTriple, config: &TestbedConfig) -> SubstitutionSet {
        let under_base = |name: &str| base_dir.join(name).display().to_string();

        match self {
            Self::CassandraYaml => SubstitutionSet::new()
                .rule("rpc_port: 9160", format!("rpc_port: {}", ports.client))
                .rule("storage_port: 7000", format!("storage_port: {}", ports.storage))
                .rule("/var/lib/cassandra/data", under_base("data"))
                .rule("/var/lib/cassandra/commitlog", under_base("commit"))
                .rule("/var/lib/cassandra/saved_caches", under_base("saved_caches")),
            Self::Log4jServer => SubstitutionSet::new()
                .rule("/var/log/cassandra/system.log", under_base("system.log"))
                .rule("INFO", config.log_level.as_str()),
            Self::CassandraEnv => SubstitutionSet::new()
                .rule("JMX_PORT=\"7199\"", format!("JMX_PORT=\"{}\"", ports.management))
                .rule("#MAX_HEAP_SIZE=\"4G\"", format!("MAX_HEAP_SIZE=\"{}\"", config.max_heap_size))
                .rule("#HEAP_NEWSIZE=\"800M\"", format!("HEAP_NEWSIZE=\"{}\"", config.heap_newsize)),
        }
    }
}
