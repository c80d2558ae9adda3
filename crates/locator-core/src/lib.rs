//! Data model for multicast object location.
//!
//! This crate defines the values that flow through the discovery protocol:
//! object identities, adapter and replica group names, endpoint addresses,
//! request identifiers and the four logical discovery messages. It does not
//! send anything over the network; see `locator-discovery` for the protocol
//! and `locator-node` for a UDP transport.

pub mod address;
pub mod identity;
pub mod message;

mod error;

pub use address::{Address, Endpoint};
pub use error::{Error, Result};
pub use identity::{AdapterName, Identity, ReplicaGroupName};
pub use message::{Datagram, Query, Reply, ReplyTarget, RequestId, RequestKey};

/// Separator between an identity's category and name in its string form.
pub const IDENTITY_SEPARATOR: char = '/';
