//! A stand-in Cassandra distribution for tests that must not download or run Java.

#![allow(dead_code)]

use cassandra_testbed::TestbedConfig;
use cassandra_testbed::instance::launcher;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::Path;

pub const CASSANDRA_YAML: &str = "\
cluster_name: 'Test Cluster'
data_file_directories:
    - /var/lib/cassandra/data
commitlog_directory: /var/lib/cassandra/commitlog
saved_caches_directory: /var/lib/cassandra/saved_caches
storage_port: 7000
rpc_port: 9160
";

pub const LOG4J_SERVER: &str = "\
log4j.rootLogger=INFO,stdout,R
log4j.appender.R.File=/var/log/cassandra/system.log
";

pub const CASSANDRA_ENV: &str = "\
#MAX_HEAP_SIZE=\"4G\"
#HEAP_NEWSIZE=\"800M\"
JMX_PORT=\"7199\"
";

/// Follows the stock launcher: with `-f` the server stays in the foreground
/// and no pid file is written; otherwise the server is backgrounded, `$!`
/// goes to the `-p` path and the script exits.
pub const LAUNCH_SCRIPT: &str = "#!/bin/sh
foreground=\"\"
pidfile=\"\"
while [ $# -gt 0 ]; do
  case \"$1\" in
    -f) foreground=yes; shift ;;
    -p) pidfile=\"$2\"; shift 2 ;;
    *) shift ;;
  esac
done
if [ -n \"$foreground\" ]; then
  exec sleep 300
fi
sleep 300 <&- &
if [ -n \"$pidfile\" ]; then
  printf \"%d\" $! > \"$pidfile\"
fi
exit 0
";

/// Config rooted at `root` that never looks for Java.
///
/// Also makes the test process adopt backgrounded servers, so killed ones
/// are reaped here rather than left as zombies under a non-reaping init.
pub fn config(root: &Path) -> TestbedConfig {
    launcher::adopt_orphans().unwrap();
    TestbedConfig::new().tmp_root(root).require_java(false)
}

/// Put a fake release archive at the cache path of `config`.
pub fn seed_archive(config: &TestbedConfig) {
    seed_archive_with(config, LAUNCH_SCRIPT);
}

pub fn seed_archive_with(config: &TestbedConfig, script: &str) {
    let top = config.archive_dir_name();
    let files: [(String, &[u8], u32); 4] = [
        (format!("{top}/conf/cassandra.yaml"), CASSANDRA_YAML.as_bytes(), 0o644),
        (format!("{top}/conf/log4j-server.properties"), LOG4J_SERVER.as_bytes(), 0o644),
        (format!("{top}/conf/cassandra-env.sh"), CASSANDRA_ENV.as_bytes(), 0o755),
        (format!("{top}/bin/cassandra"), script.as_bytes(), 0o755),
    ];

    std::fs::create_dir_all(&config.tmp_root).unwrap();
    let encoder = GzEncoder::new(File::create(config.archive_path()).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}
