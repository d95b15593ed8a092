use anyhow::{Context, Result};
use cassandra_testbed::{InstanceManager, TestbedConfig, free_port};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cassandra-testbed")]
#[command(about = "Start and stop throwaway local Cassandra instances for tests")]
struct Cli {
    /// Directory holding the archive cache and workspaces
    #[arg(long, global = true)]
    tmp_root: Option<PathBuf>,

    /// Cassandra release to use
    #[arg(long, global = true)]
    version_tag: Option<String>,

    /// Mirror base URL
    #[arg(long, global = true)]
    mirror: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Provision and launch an instance
    Start {
        #[arg(long)]
        client_port: Option<u16>,
        #[arg(long)]
        storage_port: Option<u16>,
    },
    /// Kill an instance and remove its workspace
    Stop {
        #[arg(long)]
        client_port: u16,
    },
    /// Remove a workspace left behind by a failed start
    Clean {
        #[arg(long)]
        client_port: u16,
    },
    /// List workspaces under the temp root
    List,
    /// Download the release archive into the cache
    Fetch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let config = build_config(&cli)?;
    let manager = InstanceManager::new(config).context("invalid configuration")?;

    // No subcommand: smoke-test a start on a free port.
    let command = cli.command.unwrap_or(Command::Start {
        client_port: None,
        storage_port: None,
    });

    match command {
        Command::Start { client_port, storage_port } => {
            let client_port = match client_port {
                Some(port) => port,
                None => free_port().context("failed to allocate a client port")?,
            };
            let instance = manager
                .provision(client_port, storage_port)
                .with_context(|| format!("failed to start cassandra on port {client_port}"))?;
            println!(
                "client_port={} storage_port={} jmx_port={} pid={}",
                instance.ports.client, instance.ports.storage, instance.ports.management, instance.pid
            );
            println!("base_dir={}", instance.base_dir.display());
            println!("archive={}", instance.archive_name);
        }
        Command::Stop { client_port } => {
            manager
                .terminate(client_port)
                .with_context(|| format!("failed to stop cassandra on port {client_port}"))?;
        }
        Command::Clean { client_port } => {
            manager
                .cleanup(client_port)
                .with_context(|| format!("failed to clean workspace for port {client_port}"))?;
        }
        Command::List => {
            for info in manager.list_workspaces()? {
                let pid = info.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
                let state = if info.running { "running" } else { "stopped" };
                println!("{}\t{}\t{}\t{}", info.client_port, pid, state, info.base_dir.display());
            }
        }
        Command::Fetch => {
            let path = manager.ensure_archive().context("failed to fetch archive")?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<TestbedConfig> {
    let mut config = TestbedConfig::from_env().context("invalid CASSANDRA_TESTBED_* environment")?;
    if let Some(root) = &cli.tmp_root {
        config = config.tmp_root(root);
    }
    if let Some(version) = &cli.version_tag {
        config = config.version(version);
    }
    if let Some(mirror) = &cli.mirror {
        config = config.mirror(mirror);
    }
    Ok(config)
}
