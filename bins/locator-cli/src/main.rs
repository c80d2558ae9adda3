//! CLI tool for multicast object location.

use clap::Parser;
use locator_cli::cli::{Cli, Commands};
use locator_cli::client::{format_address, DiscoveryClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.node_config()?;

    match &cli.command {
        Commands::Object { identity } => {
            let client = DiscoveryClient::connect(&config).await?;
            let address = client.resolve_object(identity).await?;
            println!("{}", format_address(&address));
        }
        Commands::Adapter { name } => {
            let client = DiscoveryClient::connect(&config).await?;
            let address = client.resolve_adapter(name).await?;
            println!("{}", format_address(&address));
        }
        Commands::Config => {
            println!("domain:     {:?}", config.discovery.domain_id);
            println!("group:      {}", config.multicast_addr()?);
            println!("timeout:    {}ms", config.discovery.timeout_ms);
            println!("retries:    {}", config.discovery.retry_count);
            println!("multiplier: {}%", config.discovery.latency_multiplier);
        }
    }

    Ok(())
}
