//! Node service wiring the discovery protocol to UDP sockets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use locator_core::Address;
use locator_discovery::{
    DiscoveryLocator, Locator, LocatorRegistry, QueryChannel, QueryHandler, Registry, ReplyRouter,
    RequestCoordinator, TokioTimer,
};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::probe::TcpProbe;
use crate::transport::{self, MulticastChannel, UdpReplySender};

/// A running discovery node.
///
/// Serves queries for the adapters in its [`Registry`] and resolves names
/// for local callers through its [`DiscoveryLocator`].
pub struct LocatorService {
    config: NodeConfig,
    registry: Arc<Registry>,
    locator: DiscoveryLocator,
    handler: Arc<QueryHandler>,
    router: ReplyRouter,
    query_socket: Arc<UdpSocket>,
    reply_socket: Arc<UdpSocket>,
    reply_endpoint: String,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LocatorService {
    /// Bind the multicast and reply sockets and build the service.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        info!("Creating locator service");

        let group = config.multicast_addr()?;
        let interface = config.interface_addr()?;

        let query_socket = transport::bind_multicast(group, interface)
            .await
            .with_context(|| format!("Failed to join multicast group {}", group))?;
        let reply_socket = UdpSocket::bind(config.reply_bind_addr()?)
            .await
            .context("Failed to bind reply socket")?;

        Self::with_sockets(config, query_socket, reply_socket, SocketAddr::V4(group)).await
    }

    /// Build the service on already-bound sockets.
    ///
    /// Queries are sent to `group` and received on `query_socket`; replies
    /// are sent and received on `reply_socket`.
    pub async fn with_sockets(
        config: NodeConfig,
        query_socket: UdpSocket,
        reply_socket: UdpSocket,
        group: SocketAddr,
    ) -> Result<Self> {
        let discovery = config.discovery_config()?;
        let query_socket = Arc::new(query_socket);
        let reply_socket = Arc::new(reply_socket);

        let advertised = match config.interface_addr()? {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => IpAddr::V4(ip),
        };
        let reply_endpoint = transport::reply_endpoint(&reply_socket, advertised)?;
        if advertised.is_loopback() && !reply_socket.local_addr()?.ip().is_loopback() {
            warn!(
                reply_endpoint = %reply_endpoint,
                "No interface configured; remote nodes cannot reach this reply endpoint"
            );
        }

        let probe = TcpProbe::new(Duration::from_millis(config.discovery.probe_timeout_ms));
        let registry = Arc::new(Registry::new(Arc::new(probe)));

        let (channel, query_queue) = MulticastChannel::new(group);
        let channels: Vec<Arc<dyn QueryChannel>> = vec![Arc::new(channel)];
        let coordinator = RequestCoordinator::new(
            discovery.clone(),
            channels,
            Arc::new(TokioTimer::current()?),
            reply_endpoint.clone(),
        );

        let (reply_sender, reply_queue) = UdpReplySender::new();
        let handler = Arc::new(QueryHandler::new(
            discovery.domain_id(),
            Arc::clone(&registry),
            Arc::new(reply_sender),
        ));
        let router = ReplyRouter::new(coordinator.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Send loops run from construction so the locator is usable before
        // the receive loops are started.
        tokio::spawn(transport::send_queries(
            Arc::clone(&reply_socket),
            group,
            query_queue,
            coordinator.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(transport::send_replies(
            Arc::clone(&reply_socket),
            reply_queue,
            shutdown_rx.clone(),
        ));

        let locator = DiscoveryLocator::new(coordinator, Arc::clone(&registry));

        let service = Self {
            config,
            registry,
            locator,
            handler,
            router,
            query_socket,
            reply_socket,
            reply_endpoint,
            shutdown_tx,
            shutdown_rx,
        };
        service.publish_configured_adapters().await?;

        info!(
            domain = %discovery.domain_id(),
            group = %group,
            reply_endpoint = %service.reply_endpoint,
            "Locator service initialized"
        );
        Ok(service)
    }

    async fn publish_configured_adapters(&self) -> Result<()> {
        let registration = self.locator.registry();
        for adapter in &self.config.adapters {
            let name = adapter.adapter_name()?;
            let address = Address::for_adapter(name.clone(), adapter.endpoints()?);

            match adapter.group_name()? {
                Some(group) => {
                    registration
                        .set_replicated_adapter_direct_address(&name, &group, Some(address))
                        .await?
                }
                None => {
                    registration
                        .set_adapter_direct_address(&name, Some(address))
                        .await?
                }
            }
        }
        debug!(count = self.config.adapters.len(), "Published configured adapters");
        Ok(())
    }

    pub fn locator(&self) -> &DiscoveryLocator {
        &self.locator
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Address replies to this node's queries are sent to.
    pub fn reply_endpoint(&self) -> &str {
        &self.reply_endpoint
    }

    /// Get a shutdown trigger that can be used to signal shutdown.
    ///
    /// This should be called before moving the service into a spawn.
    pub fn shutdown_trigger(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Start the receive loops without blocking.
    ///
    /// The loops stop when the shutdown trigger fires.
    pub fn spawn_loops(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let queries = tokio::spawn(transport::serve_queries(
            Arc::clone(&self.query_socket),
            Arc::clone(&self.handler),
            transport::MAX_CONCURRENT_QUERIES,
            self.shutdown_rx.clone(),
        ));
        let replies = tokio::spawn(transport::route_replies(
            Arc::clone(&self.reply_socket),
            self.router.clone(),
            self.shutdown_rx.clone(),
        ));
        (queries, replies)
    }

    /// Serve until the shutdown trigger fires.
    pub async fn run(self) -> Result<()> {
        info!("Locator service running");

        let (queries, replies) = self.spawn_loops();
        let (queries, replies) = tokio::join!(queries, replies);
        queries.context("Query loop panicked")?;
        replies.context("Reply loop panicked")?;

        info!(
            pending = self.locator.coordinator().pending_count(),
            "Locator service shutdown complete"
        );
        Ok(())
    }

    /// Stop any spawned loops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
