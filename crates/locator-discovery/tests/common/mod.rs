//! Shared helpers for locator-discovery integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use locator_core::{AdapterName, Address, Reply, RequestId};
use locator_discovery::{DiscoveryConfig, QueryChannel, RequestCoordinator};
use locator_test_utils::{fixtures, RecordingChannel};

pub use locator_test_utils::fixtures::{adapter, adapter_address, endpoint, group, identity};

/// Coordinator fanning out on `channels` recording channels.
pub fn recording_coordinator(
    config: DiscoveryConfig,
    channels: usize,
) -> (RequestCoordinator, Vec<Arc<RecordingChannel>>) {
    let recorders: Vec<Arc<RecordingChannel>> =
        (0..channels).map(|_| Arc::new(RecordingChannel::new())).collect();
    let dyn_channels = recorders
        .iter()
        .map(|channel| Arc::clone(channel) as Arc<dyn QueryChannel>)
        .collect();
    (fixtures::coordinator(config, dyn_channels), recorders)
}

/// Yield until `coordinator` has `count` pending requests.
pub async fn wait_for_pending(coordinator: &RequestCoordinator, count: usize) {
    while coordinator.pending_count() != count {
        tokio::task::yield_now().await;
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn replica_reply(name: &str, request_id: RequestId, address: Address) -> Reply {
    adapter_reply(adapter(name), request_id, address, true)
}

pub fn direct_reply(name: &str, request_id: RequestId, address: Address) -> Reply {
    adapter_reply(adapter(name), request_id, address, false)
}

fn adapter_reply(
    adapter: AdapterName,
    request_id: RequestId,
    address: Address,
    is_replica_group: bool,
) -> Reply {
    Reply::FoundAdapterById {
        adapter,
        request_id,
        address,
        is_replica_group,
    }
}
