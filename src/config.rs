use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::{logging, store::DataFiles};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[clap(
    version = "0.1.0",
    about = "nexa-stats",
    long_about = r#"Fetches recent Nexa blocks and transactions through nexa-cli and charts hourly statistics"#
)]
pub struct Config {
    #[clap(
        long,
        env = "LOG_FORMAT",
        help = "Log format (plain, json)",
        default_value = "plain",
        global = true
    )]
    pub log_format: logging::Format,

    #[clap(
        long,
        env = "DATA_DIR",
        help = "Directory holding the fetched JSON files and rendered chart",
        default_value = ".",
        global = true
    )]
    pub data_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, Subcommand)]
pub enum Command {
    /// Check that nexa-cli is reachable with the configured credentials
    Check(NodeConfig),
    /// Fetch the latest blocks and their transactions into the data directory
    Fetch(FetchConfig),
    /// Aggregate the fetched data hourly and render the chart
    Process(ProcessConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct NodeConfig {
    #[clap(
        long,
        env = "NEXA_CLI_PATH",
        help = "Path to the nexa-cli binary",
        default_value = "nexa-cli"
    )]
    pub nexa_cli_path: PathBuf,

    #[clap(long, env = "NEXA_RPC_USER", help = "User for Nexa RPC authentication")]
    pub nexa_rpc_user: String,

    #[clap(
        long,
        env = "NEXA_RPC_PASSWORD",
        help = "Password for Nexa RPC authentication"
    )]
    pub nexa_rpc_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct FetchConfig {
    #[clap(flatten)]
    pub node: NodeConfig,

    #[clap(
        long,
        env = "BLOCK_COUNT",
        help = "Number of most recent blocks to fetch",
        default_value = "100"
    )]
    pub block_count: u64,

    #[clap(
        long,
        env = "WORKERS",
        help = "Number of concurrent nexa-cli invocations (defaults to available cores)"
    )]
    pub workers: Option<usize>,
}

impl FetchConfig {
    pub fn workers(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct ProcessConfig {
    #[clap(
        long,
        env = "CHART_PATH",
        help = "Where to write the SVG chart, relative to the data directory unless absolute",
        default_value = "nexa_hourly_stats.svg"
    )]
    pub chart_path: PathBuf,
}

impl Config {
    pub fn data_files(&self) -> DataFiles {
        DataFiles::in_dir(&self.data_dir)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }
}
