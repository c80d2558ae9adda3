//! Error types for parsing locator values.

use thiserror::Error;

/// Parse and validation errors for the data model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Identity string is malformed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Adapter or replica group name is malformed.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Endpoint string is malformed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type for data model operations.
pub type Result<T> = std::result::Result<T, Error>;
