//! Shared test utilities for the locator workspace.
//!
//! ## Module Organization
//!
//! - [`fixtures`] - Name, address and configuration factories
//! - [`channel`] - Recording and failing [`QueryChannel`]s and a recording [`ReplySender`]
//! - [`probe`] - Scripted liveness probe
//! - [`network`] - In-process multicast/unicast loopback
//!
//! ## Quick Start
//!
//! ```rust
//! use locator_test_utils::fixtures;
//!
//! let address = fixtures::adapter_address("Hello", 10000);
//! assert_eq!(address.endpoints()[0].port, 10000);
//! ```
//!
//! [`QueryChannel`]: locator_discovery::QueryChannel
//! [`ReplySender`]: locator_discovery::ReplySender

pub mod channel;
pub mod fixtures;
pub mod network;
pub mod probe;

pub use channel::{FailingChannel, RecordingChannel, RecordingReplySender};
pub use network::LoopbackNetwork;
pub use probe::ScriptedProbe;
