//! Error types for discovery operations.

use std::time::Duration;

use locator_core::RequestKey;
use thiserror::Error;

/// Discovery error.
///
/// [`Error::NotFound`] is the only outcome of a resolution that callers are
/// expected to handle. It is an ordinary result (nothing currently
/// advertises the name), not a fault.
#[derive(Debug, Error)]
pub enum Error {
    /// The key could not be resolved within the retry budget.
    #[error("{0} not found")]
    NotFound(RequestKey),

    /// No tokio runtime is available to drive timers.
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Local failure sending on one discovery channel.
///
/// Never reaches callers directly: the coordinator counts it against the
/// round and relies on the retry loop for recovery.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport refused the datagram.
    #[error("send failed: {0}")]
    Send(String),

    /// The channel has been shut down.
    #[error("channel closed")]
    Closed,

    /// Failed to encode the message for the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// I/O error from the underlying socket.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration validation error.
///
/// Returned when [`DiscoveryConfig`] is built with out-of-range values.
///
/// [`DiscoveryConfig`]: crate::DiscoveryConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration is below its minimum.
    #[error("{field} must be at least {minimum:?}, got {provided:?}")]
    DurationBelowMinimum {
        field: &'static str,
        minimum: Duration,
        provided: Duration,
    },

    /// A numeric value is below its minimum.
    #[error("{field} must be at least {minimum}, got {provided}")]
    BelowMinimum {
        field: &'static str,
        minimum: u64,
        provided: u64,
    },
}
