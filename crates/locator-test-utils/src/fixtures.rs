//! Factories for names, addresses and coordinators.
//!
//! All factories panic on invalid input; they are meant for literals in
//! tests.

use std::sync::Arc;
use std::time::Duration;

use locator_core::{AdapterName, Address, Endpoint, Identity, ReplicaGroupName};
use locator_discovery::{DiscoveryConfig, QueryChannel, RequestCoordinator, TokioTimer};

/// Reply endpoint used by coordinators built here.
pub const CLIENT_ENDPOINT: &str = "loopback://client";

// ============================================================================
// Names
// ============================================================================

pub fn adapter(name: &str) -> AdapterName {
    AdapterName::parse(name).unwrap_or_else(|e| panic!("invalid adapter name {name:?}: {e}"))
}

pub fn group(name: &str) -> ReplicaGroupName {
    ReplicaGroupName::parse(name).unwrap_or_else(|e| panic!("invalid group name {name:?}: {e}"))
}

pub fn identity(s: &str) -> Identity {
    Identity::parse(s).unwrap_or_else(|e| panic!("invalid identity {s:?}: {e}"))
}

// ============================================================================
// Addresses
// ============================================================================

/// Loopback TCP endpoint on `port`.
pub fn endpoint(port: u16) -> Endpoint {
    Endpoint::tcp("127.0.0.1", port)
}

/// Address of adapter `name` with a single endpoint on `port`.
pub fn adapter_address(name: &str, port: u16) -> Address {
    Address::for_adapter(adapter(name), [endpoint(port)])
}

// ============================================================================
// Configuration
// ============================================================================

/// Default discovery configuration in the empty domain.
pub fn test_config() -> DiscoveryConfig {
    DiscoveryConfig::default()
}

/// Configuration with an explicit timeout and retry budget.
pub fn config(timeout: Duration, retry_count: u32) -> DiscoveryConfig {
    DiscoveryConfig::builder()
        .timeout(timeout)
        .retry_count(retry_count)
        .build()
        .unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

/// Configuration for a specific domain.
pub fn domain_config(domain_id: &str) -> DiscoveryConfig {
    DiscoveryConfig::builder()
        .domain_id(domain_id)
        .build()
        .unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

// ============================================================================
// Coordinators
// ============================================================================

/// Coordinator on the current runtime's timer, replying to
/// [`CLIENT_ENDPOINT`].
///
/// # Panics
///
/// Panics outside of a tokio runtime.
pub fn coordinator(
    config: DiscoveryConfig,
    channels: Vec<Arc<dyn QueryChannel>>,
) -> RequestCoordinator {
    let timer = TokioTimer::current().unwrap_or_else(|e| panic!("{e}"));
    RequestCoordinator::new(config, channels, Arc::new(timer), CLIENT_ENDPOINT)
}
