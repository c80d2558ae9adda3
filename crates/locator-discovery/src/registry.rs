//! Process-local directory of published adapters.
//!
//! Servers publish the adapters they host (optionally as members of a
//! replica group) and well-known objects; the [`QueryHandler`] consults the
//! registry to answer discovery queries.
//!
//! All maps live behind one lock, so every call sees and produces a
//! consistent snapshot. Liveness probes run after the lock is released.
//!
//! [`QueryHandler`]: crate::QueryHandler

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use locator_core::{AdapterName, Address, Identity, ReplicaGroupName};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, trace, warn};

use crate::locator::LocatorRegistry;

/// Liveness check for a candidate object address.
///
/// The registry asks whether `address` (an adapter address re-scoped to the
/// identity being looked up) currently answers.
#[async_trait]
pub trait ObjectProbe: Send + Sync + 'static {
    async fn is_reachable(&self, address: &Address) -> bool;
}

/// Probe that treats every candidate as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl ObjectProbe for AlwaysReachable {
    async fn is_reachable(&self, _address: &Address) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct Directory {
    adapters: BTreeMap<AdapterName, Address>,
    replica_groups: BTreeMap<ReplicaGroupName, BTreeSet<AdapterName>>,
    objects: HashMap<Identity, Address>,
}

/// Directory of adapter addresses, replica groups and well-known objects.
pub struct Registry {
    directory: RwLock<Directory>,
    probe: Arc<dyn ObjectProbe>,
    rng: Mutex<StdRng>,
}

impl Registry {
    /// Registry with the given probe and an OS-seeded shuffle.
    pub fn new(probe: Arc<dyn ObjectProbe>) -> Self {
        Self::with_rng(probe, StdRng::from_os_rng())
    }

    /// Registry with an explicit RNG, for reproducible candidate order.
    pub fn with_rng(probe: Arc<dyn ObjectProbe>, rng: StdRng) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            probe,
            rng: Mutex::new(rng),
        }
    }

    /// Publish or replace the address of a standalone adapter.
    pub fn publish_adapter(&self, name: AdapterName, address: Address) {
        debug!(adapter = %name, "Publishing adapter");
        self.directory.write().adapters.insert(name, address);
    }

    /// Remove an adapter's address. No-op if absent.
    pub fn unpublish_adapter(&self, name: &AdapterName) {
        if self.directory.write().adapters.remove(name).is_some() {
            debug!(adapter = %name, "Unpublished adapter");
        }
    }

    /// Publish an adapter as a member of a replica group.
    pub fn publish_replica_member(
        &self,
        group: ReplicaGroupName,
        name: AdapterName,
        address: Address,
    ) {
        debug!(adapter = %name, group = %group, "Publishing replica group member");
        let mut directory = self.directory.write();
        directory.adapters.insert(name.clone(), address);
        directory.replica_groups.entry(group).or_default().insert(name);
    }

    /// Remove an adapter from a replica group and drop its address.
    ///
    /// The group itself is dropped once its last member leaves.
    pub fn unpublish_replica_member(&self, group: &ReplicaGroupName, name: &AdapterName) {
        let mut directory = self.directory.write();
        directory.adapters.remove(name);

        if let Some(members) = directory.replica_groups.get_mut(group) {
            members.remove(name);
            if members.is_empty() {
                directory.replica_groups.remove(group);
                debug!(group = %group, "Replica group is now empty");
            }
        }
    }

    /// Register a well-known object.
    pub fn add_object(&self, identity: Identity, address: Address) {
        debug!(identity = %identity, "Adding well-known object");
        self.directory.write().objects.insert(identity, address);
    }

    pub fn remove_object(&self, identity: &Identity) {
        self.directory.write().objects.remove(identity);
    }

    /// Resolve an object to the address of a reachable adapter hosting it.
    ///
    /// Well-known objects are returned as registered. Otherwise candidates
    /// are probed in random order, replica group members before standalone
    /// adapters, and the first reachable one wins.
    pub async fn lookup_object(&self, identity: &Identity) -> Option<Address> {
        let candidates = {
            let directory = self.directory.read();
            if let Some(address) = directory.objects.get(identity) {
                return Some(address.clone());
            }

            let grouped: BTreeSet<&AdapterName> =
                directory.replica_groups.values().flatten().collect();

            let mut members: Vec<Address> = grouped
                .iter()
                .filter_map(|name| directory.adapters.get(*name))
                .cloned()
                .collect();
            let mut standalone: Vec<Address> = directory
                .adapters
                .iter()
                .filter(|(name, _)| !grouped.contains(name))
                .map(|(_, address)| address.clone())
                .collect();

            let mut rng = self.rng.lock();
            members.shuffle(&mut *rng);
            standalone.shuffle(&mut *rng);

            members
                .into_iter()
                .chain(standalone)
                .map(|address| address.with_identity(identity.clone()))
                .collect::<Vec<_>>()
        };

        for candidate in candidates {
            if self.probe.is_reachable(&candidate).await {
                return Some(candidate);
            }
            trace!(identity = %identity, candidate = %candidate, "Candidate unreachable");
        }

        None
    }

    /// Resolve an adapter or replica group name.
    ///
    /// A plain adapter resolves to its own address with `false`. A replica
    /// group resolves to the union of its members' endpoints with `true`.
    /// Members without a published address are skipped.
    pub fn lookup_adapter(&self, name: &AdapterName) -> Option<(Address, bool)> {
        let directory = self.directory.read();

        if let Some(address) = directory.adapters.get(name) {
            return Some((address.clone(), false));
        }

        let members = directory.replica_groups.get(name.as_str())?;
        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            match directory.adapters.get(member) {
                Some(address) => resolved.push(address),
                None => warn!(
                    group = %name,
                    adapter = %member,
                    "Replica group member has no published address"
                ),
            }
        }

        let merged = Address::merge(resolved)?;
        Some((merged.with_adapter(name.clone()), true))
    }

    /// Names of all published adapters.
    pub fn adapter_names(&self) -> Vec<AdapterName> {
        self.directory.read().adapters.keys().cloned().collect()
    }

    /// Members of a replica group, empty if the group is unknown.
    pub fn replica_group_members(&self, group: &ReplicaGroupName) -> Vec<AdapterName> {
        self.directory
            .read()
            .replica_groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysReachable))
    }
}

#[async_trait]
impl LocatorRegistry for Registry {
    async fn set_adapter_direct_address(
        &self,
        adapter: &AdapterName,
        address: Option<Address>,
    ) -> crate::Result<()> {
        match address {
            Some(address) => self.publish_adapter(adapter.clone(), address),
            None => self.unpublish_adapter(adapter),
        }
        Ok(())
    }

    async fn set_replicated_adapter_direct_address(
        &self,
        adapter: &AdapterName,
        group: &ReplicaGroupName,
        address: Option<Address>,
    ) -> crate::Result<()> {
        match address {
            Some(address) => self.publish_replica_member(group.clone(), adapter.clone(), address),
            None => self.unpublish_replica_member(group, adapter),
        }
        Ok(())
    }

    async fn add_object(&self, identity: Identity, address: Address) -> crate::Result<()> {
        Registry::add_object(self, identity, address);
        Ok(())
    }

    async fn remove_object(&self, identity: &Identity) -> crate::Result<()> {
        Registry::remove_object(self, identity);
        Ok(())
    }
}
