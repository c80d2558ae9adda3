//! In-process stand-in for a multicast group plus unicast replies.
//!
//! Queries sent on a [`LoopbackNetwork::channel`] are delivered to every
//! attached server's [`QueryHandler`]; replies are delivered to the
//! [`ReplyRouter`] registered under the query's reply endpoint. Delivery
//! always happens on a spawned task after the server's latency, never inside
//! `send`, matching what the coordinator requires of a transport.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use locator_discovery::{QueryHandler, Registry, ReplyRouter};
//! use locator_test_utils::{fixtures, LoopbackNetwork};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let network = LoopbackNetwork::new();
//!
//!     let registry = Arc::new(Registry::default());
//!     registry.publish_adapter(fixtures::adapter("Hello"), fixtures::adapter_address("Hello", 1));
//!     let replies = network.reply_sender(Duration::from_millis(5));
//!     network.attach_server(Arc::new(QueryHandler::new("", registry, replies)));
//!
//!     let coordinator = fixtures::coordinator(fixtures::test_config(), vec![network.channel()]);
//!     network.attach_client(fixtures::CLIENT_ENDPOINT, ReplyRouter::new(coordinator.clone()));
//!
//!     let address = coordinator.resolve_adapter(&fixtures::adapter("Hello")).await.unwrap();
//!     assert_eq!(address.endpoints()[0].port, 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use locator_core::{Query, Reply, ReplyTarget};
use locator_discovery::{ChannelError, QueryChannel, QueryHandler, ReplyRouter, ReplySender};
use parking_lot::RwLock;
use tracing::trace;

#[derive(Default)]
struct Shared {
    servers: RwLock<Vec<Arc<QueryHandler>>>,
    clients: RwLock<HashMap<String, ReplyRouter>>,
    queries: AtomicUsize,
    replies: AtomicUsize,
}

/// Loopback multicast group. Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    shared: Arc<Shared>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering queries to `handler`.
    pub fn attach_server(&self, handler: Arc<QueryHandler>) {
        self.shared.servers.write().push(handler);
    }

    /// Deliver replies addressed to `endpoint` to `router`.
    pub fn attach_client(&self, endpoint: impl Into<String>, router: ReplyRouter) {
        self.shared.clients.write().insert(endpoint.into(), router);
    }

    /// A channel onto this group.
    pub fn channel(&self) -> Arc<dyn QueryChannel> {
        Arc::new(LoopbackChannel {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Reply path for one server, delivering after `latency`.
    pub fn reply_sender(&self, latency: Duration) -> Arc<dyn ReplySender> {
        Arc::new(LoopbackReplySender {
            shared: Arc::clone(&self.shared),
            latency,
        })
    }

    /// Total queries multicast on this group.
    pub fn queries_sent(&self) -> usize {
        self.shared.queries.load(Ordering::SeqCst)
    }

    /// Total replies sent by attached servers.
    pub fn replies_sent(&self) -> usize {
        self.shared.replies.load(Ordering::SeqCst)
    }
}

struct LoopbackChannel {
    shared: Arc<Shared>,
}

impl QueryChannel for LoopbackChannel {
    fn send(&self, query: &Query) -> Result<(), ChannelError> {
        self.shared.queries.fetch_add(1, Ordering::SeqCst);

        let servers = self.shared.servers.read().clone();
        for server in servers {
            let query = query.clone();
            tokio::spawn(async move {
                server.handle(query).await;
            });
        }
        Ok(())
    }

    fn name(&self) -> String {
        "loopback".to_string()
    }
}

struct LoopbackReplySender {
    shared: Arc<Shared>,
    latency: Duration,
}

impl ReplySender for LoopbackReplySender {
    fn send_reply(&self, target: &ReplyTarget, reply: Reply) -> Result<(), ChannelError> {
        let router = self
            .shared
            .clients
            .read()
            .get(&target.endpoint)
            .cloned()
            .ok_or_else(|| ChannelError::Send(format!("unknown endpoint {}", target.endpoint)))?;

        self.shared.replies.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            trace!(request_id = %reply.request_id(), "Delivering loopback reply");
            router.route(reply);
        });
        Ok(())
    }
}
