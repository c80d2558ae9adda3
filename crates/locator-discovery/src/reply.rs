//! Delivery of unicast replies to the coordinator.

use locator_core::{AdapterName, Address, Identity, Reply, RequestId};

use crate::coordinator::RequestCoordinator;

/// Entry point for replies arriving on the reply endpoint.
///
/// Matching on the live round happens inside the coordinator's critical
/// section; the router only translates the payload.
#[derive(Clone)]
pub struct ReplyRouter {
    coordinator: RequestCoordinator,
}

impl ReplyRouter {
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn route(&self, reply: Reply) {
        self.coordinator.on_found(reply);
    }

    pub fn found_object_by_id(&self, identity: Identity, request_id: RequestId, address: Address) {
        self.route(Reply::FoundObjectById {
            identity,
            request_id,
            address,
        });
    }

    pub fn found_adapter_by_id(
        &self,
        adapter: AdapterName,
        request_id: RequestId,
        address: Address,
        is_replica_group: bool,
    ) {
        self.route(Reply::FoundAdapterById {
            adapter,
            request_id,
            address,
            is_replica_group,
        });
    }
}
