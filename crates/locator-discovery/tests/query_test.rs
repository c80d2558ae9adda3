//! Integration tests for the query handler.

mod common;

use std::sync::Arc;

use common::*;
use locator_core::{Query, Reply, ReplyTarget, RequestId, RequestKey};
use locator_discovery::{QueryHandler, Registry};
use locator_test_utils::RecordingReplySender;
use rstest::rstest;

fn target() -> ReplyTarget {
    ReplyTarget {
        request_id: RequestId::new(),
        endpoint: "udp://10.0.0.2:40100".to_string(),
    }
}

fn populated_registry() -> Arc<Registry> {
    let registry = Registry::default();
    registry.publish_adapter(adapter("Hello"), adapter_address("Hello", 1));
    registry.publish_replica_member(group("G"), adapter("A1"), adapter_address("A1", 2));
    registry.publish_replica_member(group("G"), adapter("A2"), adapter_address("A2", 3));
    Arc::new(registry)
}

fn handler(domain: &str) -> (QueryHandler, Arc<RecordingReplySender>) {
    let replies = Arc::new(RecordingReplySender::new());
    (QueryHandler::new(domain, populated_registry(), replies.clone()), replies)
}

// ============================================================================
// Domains
// ============================================================================

#[rstest]
#[case("A", "B")]
#[case("A", "")]
#[case("", "A")]
#[case("lab", "Lab")]
#[tokio::test]
async fn foreign_domain_is_never_answered(#[case] local: &str, #[case] remote: &str) {
    let (handler, replies) = handler(local);

    for key in [
        RequestKey::Adapter(adapter("Hello")),
        RequestKey::Adapter(adapter("G")),
        RequestKey::Object(identity("printer")),
    ] {
        handler.handle(Query::new(remote, key, target())).await;
    }

    assert!(replies.is_empty());
}

#[rstest]
#[case("")]
#[case("A")]
#[tokio::test]
async fn own_domain_is_answered(#[case] domain: &str) {
    let (handler, replies) = handler(domain);

    handler
        .handle(Query::new(domain, RequestKey::Adapter(adapter("Hello")), target()))
        .await;

    assert_eq!(replies.replies().len(), 1);
}

// ============================================================================
// Replies
// ============================================================================

#[tokio::test]
async fn adapter_reply_echoes_round_and_target() {
    let (handler, replies) = handler("");
    let reply_to = target();

    handler.find_adapter_by_id("", &adapter("Hello"), &reply_to);

    assert_eq!(replies.targets(), vec![reply_to.clone()]);
    assert_eq!(
        replies.replies(),
        vec![Reply::FoundAdapterById {
            adapter: adapter("Hello"),
            request_id: reply_to.request_id,
            address: adapter_address("Hello", 1),
            is_replica_group: false,
        }]
    );
}

#[tokio::test]
async fn group_reply_is_flagged_and_merged() {
    let (handler, replies) = handler("");

    handler.find_adapter_by_id("", &adapter("G"), &target());

    match replies.replies().as_slice() {
        [Reply::FoundAdapterById {
            address,
            is_replica_group: true,
            ..
        }] => {
            assert_eq!(address.adapter(), Some(&adapter("G")));
            assert_eq!(address.endpoints(), &[endpoint(2), endpoint(3)]);
        }
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn object_reply_is_scoped_to_identity() {
    let (handler, replies) = handler("");
    let object = identity("printer");

    handler.find_object_by_id("", &object, &target()).await;

    match replies.replies().as_slice() {
        [Reply::FoundObjectById { identity, address, .. }] => {
            assert_eq!(identity, &object);
            assert_eq!(address.identity(), Some(&object));
        }
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_adapter_gets_silence() {
    let replies = Arc::new(RecordingReplySender::new());
    let handler = QueryHandler::new("", Arc::new(Registry::default()), replies.clone());

    handler.find_adapter_by_id("", &adapter("Nobody"), &target());
    handler.find_object_by_id("", &identity("nothing"), &target()).await;

    assert!(replies.is_empty());
}
