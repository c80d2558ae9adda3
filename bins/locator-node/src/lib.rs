//! Locator node: UDP multicast transport and daemon wiring for discovery.

pub mod config;
pub mod probe;
pub mod service;
pub mod transport;

pub use config::NodeConfig;
pub use service::LocatorService;
