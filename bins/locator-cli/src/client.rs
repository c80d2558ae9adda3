//! One-shot discovery client.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use locator_core::{AdapterName, Address, Identity};
use locator_discovery::{QueryChannel, ReplyRouter, RequestCoordinator, TokioTimer};
use locator_node::NodeConfig;
use locator_node::transport::{self, MulticastChannel};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CliError;

/// Resolves names without serving any.
///
/// Owns a reply socket and its receive loop for as long as it lives.
pub struct DiscoveryClient {
    coordinator: RequestCoordinator,
    shutdown: watch::Sender<bool>,
}

impl DiscoveryClient {
    /// Bind a reply socket and multicast queries to the configured group.
    pub async fn connect(config: &NodeConfig) -> Result<Self, CliError> {
        let group = SocketAddr::V4(config.multicast_addr()?);
        Self::connect_to(config, group).await
    }

    /// Like [`connect`](Self::connect), but send queries to `target`.
    pub async fn connect_to(config: &NodeConfig, target: SocketAddr) -> Result<Self, CliError> {
        let socket = Arc::new(UdpSocket::bind(config.reply_bind_addr()?).await?);

        let advertised = match config.interface_addr()? {
            ip if ip.is_unspecified() => IpAddr::from([127, 0, 0, 1]),
            ip => IpAddr::V4(ip),
        };
        let reply_endpoint = transport::reply_endpoint(&socket, advertised)?;
        debug!(target = %target, reply_endpoint = %reply_endpoint, "Discovery client ready");

        let (channel, query_queue) = MulticastChannel::new(target);
        let channels: Vec<Arc<dyn QueryChannel>> = vec![Arc::new(channel)];
        let coordinator = RequestCoordinator::new(
            config.discovery_config()?,
            channels,
            Arc::new(TokioTimer::current()?),
            reply_endpoint,
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(transport::send_queries(
            Arc::clone(&socket),
            target,
            query_queue,
            coordinator.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(transport::route_replies(
            socket,
            ReplyRouter::new(coordinator.clone()),
            shutdown_rx,
        ));

        Ok(Self {
            coordinator,
            shutdown,
        })
    }

    pub async fn resolve_object(&self, identity: &str) -> Result<Address, CliError> {
        let identity = Identity::parse(identity)?;
        Ok(self.coordinator.resolve_object(&identity).await?)
    }

    pub async fn resolve_adapter(&self, name: &str) -> Result<Address, CliError> {
        let name = AdapterName::parse(name)?;
        Ok(self.coordinator.resolve_adapter(&name).await?)
    }
}

impl Drop for DiscoveryClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Human-readable form of a resolved address, one endpoint per line.
pub fn format_address(address: &Address) -> String {
    let mut lines = Vec::with_capacity(address.endpoints().len() + 2);
    if let Some(identity) = address.identity() {
        lines.push(format!("object:  {}", identity));
    }
    if let Some(adapter) = address.adapter() {
        lines.push(format!("adapter: {}", adapter));
    }
    for endpoint in address.endpoints() {
        lines.push(format!("  {}", endpoint));
    }
    lines.join("\n")
}
