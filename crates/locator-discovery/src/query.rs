//! Server side of the discovery protocol.

use std::sync::Arc;

use locator_core::{AdapterName, Identity, Query, Reply, ReplyTarget};
use tracing::{debug, trace};

use crate::channel::ReplySender;
use crate::registry::Registry;

/// Answers discovery queries from the local [`Registry`].
///
/// Queries for another domain are dropped. A query this process cannot
/// answer gets no reply at all; silence is the only negative answer the
/// protocol has.
pub struct QueryHandler {
    domain_id: String,
    registry: Arc<Registry>,
    replies: Arc<dyn ReplySender>,
}

impl QueryHandler {
    pub fn new(
        domain_id: impl Into<String>,
        registry: Arc<Registry>,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            registry,
            replies,
        }
    }

    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    /// Handle one inbound query.
    pub async fn handle(&self, query: Query) {
        match query {
            Query::FindObjectById {
                domain_id,
                identity,
                reply_to,
            } => self.find_object_by_id(&domain_id, &identity, &reply_to).await,
            Query::FindAdapterById {
                domain_id,
                adapter,
                reply_to,
            } => self.find_adapter_by_id(&domain_id, &adapter, &reply_to),
        }
    }

    pub async fn find_object_by_id(&self, domain_id: &str, identity: &Identity, reply_to: &ReplyTarget) {
        if !self.accepts(domain_id) {
            return;
        }

        let Some(address) = self.registry.lookup_object(identity).await else {
            trace!(identity = %identity, "No reachable adapter for object");
            return;
        };

        debug!(identity = %identity, request_id = %reply_to.request_id, "Answering object query");
        self.reply(
            reply_to,
            Reply::FoundObjectById {
                identity: identity.clone(),
                request_id: reply_to.request_id,
                address,
            },
        );
    }

    pub fn find_adapter_by_id(&self, domain_id: &str, adapter: &AdapterName, reply_to: &ReplyTarget) {
        if !self.accepts(domain_id) {
            return;
        }

        let Some((address, is_replica_group)) = self.registry.lookup_adapter(adapter) else {
            trace!(adapter = %adapter, "Adapter not published here");
            return;
        };

        debug!(
            adapter = %adapter,
            request_id = %reply_to.request_id,
            is_replica_group,
            "Answering adapter query"
        );
        self.reply(
            reply_to,
            Reply::FoundAdapterById {
                adapter: adapter.clone(),
                request_id: reply_to.request_id,
                address,
                is_replica_group,
            },
        );
    }

    fn accepts(&self, domain_id: &str) -> bool {
        if domain_id != self.domain_id {
            trace!(domain = %domain_id, local = %self.domain_id, "Ignoring query for foreign domain");
            return false;
        }
        true
    }

    fn reply(&self, target: &ReplyTarget, reply: Reply) {
        // Best effort: the querier's retry loop is the recovery path.
        if let Err(e) = self.replies.send_reply(target, reply) {
            debug!(endpoint = %target.endpoint, error = %e, "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use locator_core::{Address, Endpoint, RequestId};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<Reply>>);

    impl ReplySender for Captured {
        fn send_reply(&self, _target: &ReplyTarget, reply: Reply) -> Result<(), ChannelError> {
            self.0.lock().push(reply);
            Ok(())
        }
    }

    struct Broken;

    impl ReplySender for Broken {
        fn send_reply(&self, _target: &ReplyTarget, _reply: Reply) -> Result<(), ChannelError> {
            Err(ChannelError::Closed)
        }
    }

    fn target() -> ReplyTarget {
        ReplyTarget {
            request_id: RequestId::new(),
            endpoint: "client".to_string(),
        }
    }

    fn registry_with_hello() -> Arc<Registry> {
        let registry = Registry::default();
        registry.publish_adapter(
            AdapterName::parse("Hello").unwrap(),
            Address::new([Endpoint::tcp("127.0.0.1", 10000)]),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn echoes_request_id() {
        let captured = Arc::new(Captured::default());
        let handler = QueryHandler::new("lab", registry_with_hello(), captured.clone());
        let target = target();

        handler.find_adapter_by_id("lab", &AdapterName::parse("Hello").unwrap(), &target);

        let replies = captured.0.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].request_id(), target.request_id);
    }

    #[tokio::test]
    async fn unknown_adapter_is_silent() {
        let captured = Arc::new(Captured::default());
        let handler = QueryHandler::new("", registry_with_hello(), captured.clone());

        handler.find_adapter_by_id("", &AdapterName::parse("Other").unwrap(), &target());
        handler
            .find_object_by_id("", &Identity::parse("x").unwrap(), &target())
            .await;

        // The object lookup still succeeds through the Hello adapter.
        assert_eq!(captured.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let handler = QueryHandler::new("", registry_with_hello(), Arc::new(Broken));
        handler.find_adapter_by_id("", &AdapterName::parse("Hello").unwrap(), &target());
    }
}
