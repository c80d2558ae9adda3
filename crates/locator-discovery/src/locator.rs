//! Caller-facing resolution and registration interfaces.

use std::sync::Arc;

use async_trait::async_trait;
use locator_core::{AdapterName, Address, Identity, ReplicaGroupName};

use crate::coordinator::RequestCoordinator;
use crate::registry::Registry;
use crate::Result;

/// Resolution interface offered to clients.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Resolve an object identity.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) if nothing answered.
    async fn find_object_by_id(&self, identity: &Identity) -> Result<Address>;

    /// Resolve an adapter or replica group name.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) if nothing answered.
    async fn find_adapter_by_id(&self, adapter: &AdapterName) -> Result<Address>;

    /// Registration interface servers announce themselves through.
    fn registry(&self) -> Arc<dyn LocatorRegistry>;
}

/// Registration interface. `None` addresses unpublish.
#[async_trait]
pub trait LocatorRegistry: Send + Sync {
    async fn set_adapter_direct_address(
        &self,
        adapter: &AdapterName,
        address: Option<Address>,
    ) -> Result<()>;

    async fn set_replicated_adapter_direct_address(
        &self,
        adapter: &AdapterName,
        group: &ReplicaGroupName,
        address: Option<Address>,
    ) -> Result<()>;

    async fn add_object(&self, identity: Identity, address: Address) -> Result<()>;

    async fn remove_object(&self, identity: &Identity) -> Result<()>;
}

/// [`Locator`] backed by multicast discovery and the local [`Registry`].
#[derive(Clone)]
pub struct DiscoveryLocator {
    coordinator: RequestCoordinator,
    registry: Arc<Registry>,
}

impl DiscoveryLocator {
    pub fn new(coordinator: RequestCoordinator, registry: Arc<Registry>) -> Self {
        Self {
            coordinator,
            registry,
        }
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }
}

#[async_trait]
impl Locator for DiscoveryLocator {
    async fn find_object_by_id(&self, identity: &Identity) -> Result<Address> {
        self.coordinator.resolve_object(identity).await
    }

    async fn find_adapter_by_id(&self, adapter: &AdapterName) -> Result<Address> {
        self.coordinator.resolve_adapter(adapter).await
    }

    fn registry(&self) -> Arc<dyn LocatorRegistry> {
        self.registry.clone()
    }
}
