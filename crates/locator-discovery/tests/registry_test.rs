//! Integration tests for the registry and its registration interface.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use locator_core::{Address, Endpoint};
use locator_discovery::{LocatorRegistry, Registry};
use locator_test_utils::ScriptedProbe;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::rstest;

fn registry_with_probe(seed: u64) -> (Registry, Arc<ScriptedProbe>) {
    let probe = Arc::new(ScriptedProbe::new());
    let registry = Registry::with_rng(probe.clone(), StdRng::seed_from_u64(seed));
    (registry, probe)
}

// ============================================================================
// Object lookup
// ============================================================================

#[rstest]
#[case(1)]
#[case(42)]
#[case(1337)]
#[tokio::test]
async fn object_lookup_spreads_over_live_members(#[case] seed: u64) {
    let (registry, probe) = registry_with_probe(seed);
    for i in 0..7u16 {
        let name = format!("A{i}");
        registry.publish_replica_member(group("G"), adapter(&name), adapter_address(&name, 1000 + i));
    }
    probe.mark_unreachable(adapter("A5"));
    probe.mark_unreachable(adapter("A6"));

    let object = identity("printer");
    let mut chosen = HashSet::new();
    for _ in 0..100 {
        let address = registry.lookup_object(&object).await.unwrap();
        assert_eq!(address.identity(), Some(&object));
        chosen.insert(address.adapter().cloned().unwrap());
    }

    assert!(chosen.len() > 1, "lookups pinned to {chosen:?}");
    assert!(!chosen.contains(&adapter("A5")));
    assert!(!chosen.contains(&adapter("A6")));
}

#[tokio::test]
async fn object_lookup_falls_back_to_standalone_adapters() {
    let (registry, probe) = registry_with_probe(7);
    registry.publish_replica_member(group("G"), adapter("A1"), adapter_address("A1", 1));
    registry.publish_adapter(adapter("Solo"), adapter_address("Solo", 2));
    probe.mark_unreachable(adapter("A1"));

    let address = registry.lookup_object(&identity("printer")).await.unwrap();

    assert_eq!(address.adapter(), Some(&adapter("Solo")));
    let probed: Vec<_> = probe.probed().iter().filter_map(|a| a.adapter().cloned()).collect();
    assert_eq!(probed, vec![adapter("A1"), adapter("Solo")]);
}

#[tokio::test]
async fn object_lookup_with_nothing_reachable_is_absent() {
    let (registry, probe) = registry_with_probe(7);
    registry.publish_adapter(adapter("Solo"), adapter_address("Solo", 2));
    probe.mark_unreachable(adapter("Solo"));

    assert!(registry.lookup_object(&identity("printer")).await.is_none());
}

// ============================================================================
// Adapter lookup
// ============================================================================

#[rstest]
#[case("A1", false, 1)]
#[case("A2", false, 1)]
#[case("G", true, 2)]
#[case("Solo", false, 1)]
fn adapter_lookup(#[case] name: &str, #[case] is_group: bool, #[case] endpoints: usize) {
    let registry = Registry::default();
    registry.publish_replica_member(group("G"), adapter("A1"), adapter_address("A1", 1));
    registry.publish_replica_member(group("G"), adapter("A2"), adapter_address("A2", 2));
    registry.publish_adapter(adapter("Solo"), adapter_address("Solo", 3));

    let (address, is_replica_group) = registry.lookup_adapter(&adapter(name)).unwrap();

    assert_eq!(is_replica_group, is_group);
    assert_eq!(address.endpoints().len(), endpoints);
}

#[test]
fn group_members_with_multiple_endpoints_are_unioned() {
    let registry = Registry::default();
    registry.publish_replica_member(
        group("G"),
        adapter("A1"),
        Address::for_adapter(adapter("A1"), [endpoint(1), endpoint(2)]),
    );
    registry.publish_replica_member(
        group("G"),
        adapter("A2"),
        Address::for_adapter(adapter("A2"), [endpoint(2), Endpoint::new("udp", "10.0.0.1", 3)]),
    );

    let (address, _) = registry.lookup_adapter(&adapter("G")).unwrap();

    assert_eq!(address.endpoints().len(), 3);
    assert_eq!(registry.replica_group_members(&group("G")), vec![adapter("A1"), adapter("A2")]);
}

// ============================================================================
// Registration interface
// ============================================================================

#[tokio::test]
async fn registration_interface_publishes_and_unpublishes() {
    let registry = Arc::new(Registry::default());
    let registration: Arc<dyn LocatorRegistry> = registry.clone();

    registration
        .set_adapter_direct_address(&adapter("Hello"), Some(adapter_address("Hello", 1)))
        .await
        .unwrap();
    registration
        .set_replicated_adapter_direct_address(&adapter("A1"), &group("G"), Some(adapter_address("A1", 2)))
        .await
        .unwrap();
    assert!(registry.lookup_adapter(&adapter("Hello")).is_some());
    assert!(registry.lookup_adapter(&adapter("G")).is_some());

    registration
        .set_adapter_direct_address(&adapter("Hello"), None)
        .await
        .unwrap();
    registration
        .set_replicated_adapter_direct_address(&adapter("A1"), &group("G"), None)
        .await
        .unwrap();
    assert!(registry.lookup_adapter(&adapter("Hello")).is_none());
    assert!(registry.lookup_adapter(&adapter("G")).is_none());
    assert!(registry.adapter_names().is_empty());
}

#[tokio::test]
async fn registration_interface_manages_well_known_objects() {
    let registry = Arc::new(Registry::default());
    let registration: Arc<dyn LocatorRegistry> = registry.clone();
    let object = identity("services/clock");
    let address = Address::new([endpoint(9)]).with_identity(object.clone());

    registration.add_object(object.clone(), address.clone()).await.unwrap();
    assert_eq!(registry.lookup_object(&object).await, Some(address));

    registration.remove_object(&object).await.unwrap();
    assert!(registry.lookup_object(&object).await.is_none());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publish_and_lookup_never_tear() {
    let registry = Arc::new(Registry::default());

    let writers: Vec<_> = (0..4u16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let name = format!("A{i}");
                for round in 0..200u16 {
                    registry.publish_replica_member(
                        group("G"),
                        adapter(&name),
                        Address::for_adapter(adapter(&name), [endpoint(i * 1000 + round)]),
                    );
                    registry.unpublish_replica_member(&group("G"), &adapter(&name));
                }
            })
        })
        .collect();

    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for _ in 0..500 {
                if let Some((address, is_replica_group)) = registry.lookup_adapter(&adapter("G")) {
                    assert!(is_replica_group);
                    assert!(!address.endpoints().is_empty());
                    assert!(address.endpoints().len() <= 4);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    assert!(registry.lookup_adapter(&adapter("G")).is_none());
}
