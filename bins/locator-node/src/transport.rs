//! UDP transport for the discovery protocol.
//!
//! Queries are JSON-encoded [`Datagram`]s multicast to the configured group;
//! replies are JSON datagrams sent unicast to the `udp://host:port` reply
//! endpoint carried by the query.
//!
//! Outbound datagrams are queued by the synchronous channel seams and
//! written by send loops that await the socket, so a socket that is not yet
//! writable delays a query instead of failing it. Send errors for queries
//! are reported back to the coordinator for the round that issued them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use locator_core::{Datagram, Endpoint, Query, Reply, ReplyTarget};
use locator_discovery::{
    ChannelError, QueryChannel, QueryHandler, ReplyRouter, ReplySender, RequestCoordinator,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, trace, warn};

/// Largest datagram accepted.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Datagrams queued per sender before sends are refused.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Queries answered concurrently by one node. Further queries are dropped;
/// the querying side retries.
pub const MAX_CONCURRENT_QUERIES: usize = 64;

/// Bind a socket on the group's port and join the group on `interface`.
pub async fn bind_multicast(group: SocketAddrV4, interface: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port())).await?;
    socket.join_multicast_v4(*group.ip(), interface)?;
    socket.set_multicast_loop_v4(true)?;
    debug!(group = %group, interface = %interface, "Joined multicast group");
    Ok(socket)
}

/// `udp://host:port` endpoint other processes reach `socket` at.
///
/// A wildcard bind is advertised as `fallback`.
pub fn reply_endpoint(socket: &UdpSocket, fallback: IpAddr) -> std::io::Result<String> {
    let local = socket.local_addr()?;
    let ip = if local.ip().is_unspecified() {
        fallback
    } else {
        local.ip()
    };
    Ok(format!("udp://{}", SocketAddr::new(ip, local.port())))
}

pub fn encode(datagram: &Datagram) -> Result<Vec<u8>, ChannelError> {
    serde_json::to_vec(datagram).map_err(|e| ChannelError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Option<Datagram> {
    match serde_json::from_slice(bytes) {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            trace!(error = %e, len = bytes.len(), "Dropping undecodable datagram");
            None
        }
    }
}

/// Resolve a `udp://host:port` reply endpoint to a socket address.
pub fn parse_reply_endpoint(endpoint: &str) -> Result<SocketAddr, ChannelError> {
    let endpoint = Endpoint::parse(endpoint).map_err(|e| ChannelError::Send(e.to_string()))?;
    if endpoint.protocol != "udp" {
        return Err(ChannelError::Send(format!(
            "unsupported reply protocol '{}'",
            endpoint.protocol
        )));
    }
    format!("{}:{}", endpoint.host, endpoint.port)
        .parse()
        .map_err(|e| ChannelError::Send(format!("invalid reply endpoint: {}", e)))
}

/// A query waiting for its send loop.
#[derive(Debug)]
pub struct OutboundQuery {
    query: Query,
    bytes: Vec<u8>,
}

/// [`QueryChannel`] multicasting on one group.
///
/// Queries are queued here and written by [`send_queries`].
pub struct MulticastChannel {
    group: SocketAddr,
    queue: mpsc::Sender<OutboundQuery>,
}

impl MulticastChannel {
    /// Channel for `group`, plus the queue its send loop drains.
    pub fn new(group: SocketAddr) -> (Self, mpsc::Receiver<OutboundQuery>) {
        let (queue, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        (Self { group, queue }, rx)
    }
}

impl QueryChannel for MulticastChannel {
    fn send(&self, query: &Query) -> Result<(), ChannelError> {
        let bytes = encode(&Datagram::Query(query.clone()))?;
        self.queue
            .try_send(OutboundQuery {
                query: query.clone(),
                bytes,
            })
            .map_err(queue_error)
    }

    fn name(&self) -> String {
        format!("udp://{}", self.group)
    }
}

/// [`ReplySender`] sending unicast datagrams.
///
/// Replies are queued here and written by [`send_replies`].
pub struct UdpReplySender {
    queue: mpsc::Sender<(SocketAddr, Vec<u8>)>,
}

impl UdpReplySender {
    /// Sender plus the queue its send loop drains.
    pub fn new() -> (Self, mpsc::Receiver<(SocketAddr, Vec<u8>)>) {
        let (queue, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        (Self { queue }, rx)
    }
}

impl ReplySender for UdpReplySender {
    fn send_reply(&self, target: &ReplyTarget, reply: Reply) -> Result<(), ChannelError> {
        let addr = parse_reply_endpoint(&target.endpoint)?;
        let bytes = encode(&Datagram::Reply(reply))?;
        self.queue.try_send((addr, bytes)).map_err(queue_error)
    }
}

fn queue_error<T>(e: TrySendError<T>) -> ChannelError {
    match e {
        TrySendError::Full(_) => ChannelError::Send("send queue full".to_string()),
        TrySendError::Closed(_) => ChannelError::Closed,
    }
}

/// Write queued queries to `group` until shutdown or until every
/// [`MulticastChannel`] feeding `queue` is gone.
///
/// A failed send is reported to `coordinator` against the round the query
/// belongs to.
pub async fn send_queries(
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    mut queue: mpsc::Receiver<OutboundQuery>,
    coordinator: RequestCoordinator,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            outbound = queue.recv() => {
                let Some(OutboundQuery { query, bytes }) = outbound else {
                    break;
                };
                if let Err(e) = socket.send_to(&bytes, group).await {
                    trace!(group = %group, error = %e, "Query send failed");
                    let error = ChannelError::from(e);
                    coordinator.on_channel_failed(&query.key(), query.reply_to().request_id, &error);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!(group = %group, "Query send loop stopping");
}

/// Write queued replies until shutdown or until the [`UdpReplySender`] is
/// gone. Failures are logged and dropped.
pub async fn send_replies(
    socket: Arc<UdpSocket>,
    mut queue: mpsc::Receiver<(SocketAddr, Vec<u8>)>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            outbound = queue.recv() => {
                let Some((addr, bytes)) = outbound else {
                    break;
                };
                if let Err(e) = socket.send_to(&bytes, addr).await {
                    debug!(to = %addr, error = %e, "Reply send failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Reply send loop stopping");
}

/// Receive queries on `socket` and hand them to `handler` until shutdown.
///
/// Each query is answered on its own task so a slow liveness probe does not
/// hold up the socket. At most `max_in_flight` queries are answered at once;
/// queries arriving beyond that are dropped.
pub async fn serve_queries(
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    max_in_flight: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "Query socket receive failed");
                        continue;
                    }
                };
                match decode(&buf[..len]) {
                    Some(Datagram::Query(query)) => {
                        trace!(from = %from, key = %query.key(), "Received query");
                        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                            debug!(from = %from, key = %query.key(), "Too many queries in flight, dropping");
                            continue;
                        };
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            handler.handle(query).await;
                            drop(permit);
                        });
                    }
                    // Our own replies are never sent to the group.
                    Some(Datagram::Reply(_)) => trace!(from = %from, "Ignoring reply on query socket"),
                    None => {}
                }
            }
            _ = shutdown.changed() => {
                debug!("Query loop stopping");
                break;
            }
        }
    }
}

/// Receive replies on `socket` and route them until shutdown.
pub async fn route_replies(
    socket: Arc<UdpSocket>,
    router: ReplyRouter,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port unreachable from an earlier send surfaces here on some platforms.
                        debug!(error = %e, "Reply socket receive failed");
                        continue;
                    }
                };
                match decode(&buf[..len]) {
                    Some(Datagram::Reply(reply)) => {
                        trace!(from = %from, request_id = %reply.request_id(), "Received reply");
                        router.route(reply);
                    }
                    Some(Datagram::Query(_)) => trace!(from = %from, "Ignoring query on reply socket"),
                    None => {}
                }
            }
            _ = shutdown.changed() => {
                debug!("Reply loop stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use locator_core::{AdapterName, Address, Identity, RequestId, RequestKey};
    use locator_discovery::{DiscoveryConfig, ObjectProbe, Registry, TokioTimer};

    fn hello() -> AdapterName {
        AdapterName::parse("Hello").unwrap()
    }

    fn coordinator(group: SocketAddr, endpoint: String, timeout: Duration) -> (RequestCoordinator, mpsc::Receiver<OutboundQuery>) {
        let config = DiscoveryConfig::builder()
            .timeout(timeout)
            .retry_count(2)
            .build()
            .unwrap();
        let (channel, queue) = MulticastChannel::new(group);
        let channels: Vec<Arc<dyn QueryChannel>> = vec![Arc::new(channel)];
        let coordinator = RequestCoordinator::new(
            config,
            channels,
            Arc::new(TokioTimer::current().unwrap()),
            endpoint,
        );
        (coordinator, queue)
    }

    /// Answers the first adapter query it receives with `port`.
    async fn answer_one_query(server: UdpSocket, port: u16) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let Some(Datagram::Query(query)) = decode(&buf[..len]) else {
            panic!("expected a query");
        };
        let reply = Reply::FoundAdapterById {
            adapter: hello(),
            request_id: query.reply_to().request_id,
            address: Address::for_adapter(hello(), [Endpoint::tcp("127.0.0.1", port)]),
            is_replica_group: false,
        };
        let to = parse_reply_endpoint(&query.reply_to().endpoint).unwrap();
        server
            .send_to(&encode(&Datagram::Reply(reply)).unwrap(), to)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolves_right_after_binding() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let group = server.local_addr().unwrap();
        let responder = tokio::spawn(answer_one_query(server, 10000));

        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let endpoint = reply_endpoint(&socket, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        let (coordinator, queue) = coordinator(group, endpoint, Duration::from_secs(5));
        let (_shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(send_queries(
            Arc::clone(&socket),
            group,
            queue,
            coordinator.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(route_replies(
            socket,
            ReplyRouter::new(coordinator.clone()),
            shutdown_rx,
        ));

        let address = tokio::time::timeout(Duration::from_secs(2), coordinator.resolve_adapter(&hello()))
            .await
            .expect("resolution should not wait for a retry")
            .unwrap();

        assert_eq!(address.endpoints(), &[Endpoint::tcp("127.0.0.1", 10000)]);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn channel_send_only_queues() {
        let group: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let (channel, mut queue) = MulticastChannel::new(group);
        let query = Query::new(
            "",
            RequestKey::Adapter(hello()),
            ReplyTarget {
                request_id: RequestId::new(),
                endpoint: "udp://127.0.0.1:1".to_string(),
            },
        );

        channel.send(&query).unwrap();

        let queued = queue.try_recv().unwrap();
        assert_eq!(queued.query, query);
        assert_eq!(decode(&queued.bytes), Some(Datagram::Query(query)));
    }

    #[tokio::test]
    async fn closed_queue_is_a_channel_failure() {
        let (channel, queue) = MulticastChannel::new("127.0.0.1:9".parse().unwrap());
        drop(queue);
        let query = Query::new(
            "",
            RequestKey::Adapter(hello()),
            ReplyTarget {
                request_id: RequestId::new(),
                endpoint: "udp://127.0.0.1:1".to_string(),
            },
        );

        assert!(matches!(channel.send(&query), Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn socket_send_failure_ends_the_lookup_early() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let endpoint = reply_endpoint(&socket, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        // An IPv4 socket cannot send to an IPv6 destination.
        let group: SocketAddr = "[::1]:4061".parse().unwrap();
        let (coordinator, queue) = coordinator(group, endpoint, Duration::from_secs(30));
        let (_shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(send_queries(socket, group, queue, coordinator.clone(), shutdown_rx));

        let result = tokio::time::timeout(Duration::from_secs(2), coordinator.resolve_adapter(&hello()))
            .await
            .expect("a failed send should not wait out the round deadline");

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(coordinator.pending_count(), 0);
    }

    struct StalledProbe;

    #[async_trait]
    impl ObjectProbe for StalledProbe {
        async fn is_reachable(&self, _address: &Address) -> bool {
            std::future::pending().await
        }
    }

    /// Serve with `max_in_flight`, occupy one slot with a stalled object
    /// query, then ask for an adapter. Returns whether the adapter query was
    /// answered.
    async fn adapter_answered_while_object_query_stalls(max_in_flight: usize) -> bool {
        let registry = Arc::new(Registry::new(Arc::new(StalledProbe)));
        registry.publish_adapter(
            hello(),
            Address::for_adapter(hello(), [Endpoint::tcp("127.0.0.1", 10000)]),
        );

        let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server_socket.local_addr().unwrap();
        let (reply_sender, reply_queue) = UdpReplySender::new();
        let handler = Arc::new(QueryHandler::new("", registry, Arc::new(reply_sender)));
        let (_shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(send_replies(Arc::clone(&server_socket), reply_queue, shutdown_rx.clone()));
        tokio::spawn(serve_queries(server_socket, handler, max_in_flight, shutdown_rx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply_to = ReplyTarget {
            request_id: RequestId::new(),
            endpoint: format!("udp://{}", client.local_addr().unwrap()),
        };
        for key in [
            RequestKey::Object(Identity::parse("printers/lobby").unwrap()),
            RequestKey::Adapter(hello()),
        ] {
            let query = Query::new("", key, reply_to.clone());
            client
                .send_to(&encode(&Datagram::Query(query)).unwrap(), server_addr)
                .await
                .unwrap();
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        match tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await {
            Ok(received) => {
                let (len, _) = received.unwrap();
                matches!(decode(&buf[..len]), Some(Datagram::Reply(Reply::FoundAdapterById { .. })))
            }
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn queries_beyond_the_limit_are_dropped() {
        assert!(!adapter_answered_while_object_query_stalls(1).await);
    }

    #[tokio::test]
    async fn queries_within_the_limit_are_answered() {
        assert!(adapter_answered_while_object_query_stalls(2).await);
    }

    #[test]
    fn parses_udp_reply_endpoints() {
        assert_eq!(
            parse_reply_endpoint("udp://127.0.0.1:4000").unwrap(),
            "127.0.0.1:4000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_reply_endpoint("udp://[::1]:4000").unwrap(),
            "[::1]:4000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn rejects_other_reply_protocols() {
        assert!(parse_reply_endpoint("tcp://127.0.0.1:4000").is_err());
        assert!(parse_reply_endpoint("127.0.0.1:4000").is_err());
        assert!(parse_reply_endpoint("udp://printer.local:4000").is_err());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode(b"not json").is_none());
        assert!(decode(br#"{"type":"query"}"#).is_none());
    }

    #[tokio::test]
    async fn wildcard_bind_advertises_fallback() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        let endpoint = reply_endpoint(&socket, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(endpoint, format!("udp://127.0.0.1:{port}"));
    }
}
