//! Logical discovery messages.
//!
//! Queries travel over multicast; replies travel back over unicast to the
//! [`ReplyTarget`] carried by the query. The wire encoding belongs to the
//! transport; these types only fix the payload shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AdapterName, Address, Identity};

/// Token identifying one round of a lookup.
///
/// A fresh id is minted every time a request is issued or retried. Replies
/// echo it back so answers to superseded rounds can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a lookup is for: an object or an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKey {
    Object(Identity),
    Adapter(AdapterName),
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKey::Object(identity) => write!(f, "object {}", identity),
            RequestKey::Adapter(adapter) => write!(f, "adapter {}", adapter),
        }
    }
}

impl From<Identity> for RequestKey {
    fn from(identity: Identity) -> Self {
        RequestKey::Object(identity)
    }
}

impl From<AdapterName> for RequestKey {
    fn from(adapter: AdapterName) -> Self {
        RequestKey::Adapter(adapter)
    }
}

/// Where a server should send its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTarget {
    /// Round the reply answers.
    pub request_id: RequestId,

    /// Transport-specific unicast address of the querying process.
    pub endpoint: String,
}

/// Multicast discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    FindObjectById {
        domain_id: String,
        identity: Identity,
        reply_to: ReplyTarget,
    },
    FindAdapterById {
        domain_id: String,
        adapter: AdapterName,
        reply_to: ReplyTarget,
    },
}

impl Query {
    pub fn new(domain_id: impl Into<String>, key: RequestKey, reply_to: ReplyTarget) -> Self {
        let domain_id = domain_id.into();
        match key {
            RequestKey::Object(identity) => Query::FindObjectById {
                domain_id,
                identity,
                reply_to,
            },
            RequestKey::Adapter(adapter) => Query::FindAdapterById {
                domain_id,
                adapter,
                reply_to,
            },
        }
    }

    pub fn domain_id(&self) -> &str {
        match self {
            Query::FindObjectById { domain_id, .. } | Query::FindAdapterById { domain_id, .. } => {
                domain_id
            }
        }
    }

    pub fn reply_to(&self) -> &ReplyTarget {
        match self {
            Query::FindObjectById { reply_to, .. } | Query::FindAdapterById { reply_to, .. } => {
                reply_to
            }
        }
    }

    pub fn key(&self) -> RequestKey {
        match self {
            Query::FindObjectById { identity, .. } => RequestKey::Object(identity.clone()),
            Query::FindAdapterById { adapter, .. } => RequestKey::Adapter(adapter.clone()),
        }
    }
}

/// Unicast answer to a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    FoundObjectById {
        identity: Identity,
        request_id: RequestId,
        address: Address,
    },
    FoundAdapterById {
        adapter: AdapterName,
        request_id: RequestId,
        address: Address,
        is_replica_group: bool,
    },
}

impl Reply {
    pub fn request_id(&self) -> RequestId {
        match self {
            Reply::FoundObjectById { request_id, .. }
            | Reply::FoundAdapterById { request_id, .. } => *request_id,
        }
    }

    pub fn key(&self) -> RequestKey {
        match self {
            Reply::FoundObjectById { identity, .. } => RequestKey::Object(identity.clone()),
            Reply::FoundAdapterById { adapter, .. } => RequestKey::Adapter(adapter.clone()),
        }
    }
}

/// Envelope for anything a discovery transport carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Datagram {
    Query(Query),
    Reply(Reply),
}
