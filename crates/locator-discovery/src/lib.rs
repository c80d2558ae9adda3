//! Multicast discovery for adapters, replica groups and objects.
//!
//! Servers publish what they host in a [`Registry`] and answer multicast
//! queries through a [`QueryHandler`]. Clients resolve names through a
//! [`RequestCoordinator`], which fans each lookup out on every
//! [`QueryChannel`], coalesces concurrent lookups of the same key, retries
//! on timeout, and merges replica group replies. Replies come back over
//! unicast and are fed in through a [`ReplyRouter`].
//!
//! Transport, timers and liveness probing are injected through traits, so
//! the protocol runs unchanged over UDP or an in-process loopback.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use locator_core::AdapterName;
//! use locator_discovery::{DiscoveryConfig, QueryChannel, RequestCoordinator, TokioTimer};
//!
//! # async fn example(channel: Arc<dyn QueryChannel>) -> locator_discovery::Result<()> {
//! let coordinator = RequestCoordinator::new(
//!     DiscoveryConfig::default(),
//!     vec![channel],
//!     Arc::new(TokioTimer::current()?),
//!     "udp://10.0.0.5:40100",
//! );
//!
//! let address = coordinator
//!     .resolve_adapter(&AdapterName::parse("Hello").expect("valid name"))
//!     .await?;
//! println!("Hello is at {address}");
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod locator;
pub mod query;
pub mod registry;
pub mod reply;
pub mod timer;

mod error;

pub use channel::{QueryChannel, ReplySender};
pub use config::{DiscoveryConfig, DiscoveryConfigBuilder};
pub use coordinator::RequestCoordinator;
pub use error::{ChannelError, ConfigError, Error, Result};
pub use locator::{DiscoveryLocator, Locator, LocatorRegistry};
pub use query::QueryHandler;
pub use registry::{AlwaysReachable, ObjectProbe, Registry};
pub use reply::ReplyRouter;
pub use timer::{Timer, TimerHandle, TimerTask, TokioTimer};
