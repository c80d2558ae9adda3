//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use locator_node::NodeConfig;

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "locator")]
#[command(about = "Resolve objects and adapters over multicast discovery", long_about = None)]
pub struct Cli {
    /// Node configuration file to read network and discovery settings from
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Discovery domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Per-round reply timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Rounds reissued after the first times out
    #[arg(long)]
    pub retries: Option<u32>,

    /// Multicast group as `address:port`
    #[arg(long)]
    pub group: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve an object identity (`category/name` or `name`)
    Object {
        identity: String,
    },
    /// Resolve an adapter or replica group
    Adapter {
        name: String,
    },
    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Effective configuration: file (or defaults), then environment, then
    /// command-line flags.
    pub fn node_config(&self) -> Result<NodeConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        config.apply_env_overrides();

        if let Some(domain) = &self.domain {
            config.discovery.domain_id = domain.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.discovery.timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            config.discovery.retry_count = retries;
        }
        if let Some(group) = &self.group {
            let (address, port) = group.rsplit_once(':').ok_or_else(|| {
                CliError::InvalidArgument(format!("group '{}' must be address:port", group))
            })?;
            config.network.multicast_group = address.to_string();
            config.network.multicast_port = port.parse().map_err(|e| {
                CliError::InvalidArgument(format!("invalid port in group '{}': {}", group, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}
