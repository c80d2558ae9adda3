//! Transport seams used by the protocol.
//!
//! The protocol never touches sockets. It sends queries through
//! [`QueryChannel`]s (one per configured multicast group) and replies through
//! a [`ReplySender`]; the transport decides how the bytes travel.

use locator_core::{Query, Reply, ReplyTarget};

use crate::error::ChannelError;

/// One multicast channel a query can be fanned out on.
///
/// `send` is called with the coordinator's lock held. It must not block and
/// must not call back into the coordinator; delivery happens elsewhere.
pub trait QueryChannel: Send + Sync + 'static {
    /// Queue a query for transmission.
    ///
    /// An `Err` is a local failure (no route, socket closed) and counts
    /// against the current round. Failures discovered after `send` returned
    /// are reported through [`RequestCoordinator::on_channel_failed`].
    ///
    /// [`RequestCoordinator::on_channel_failed`]: crate::RequestCoordinator::on_channel_failed
    fn send(&self, query: &Query) -> Result<(), ChannelError>;

    /// Human-readable name for logs.
    fn name(&self) -> String {
        "multicast".to_string()
    }
}

/// Unicast path back to a querying process.
pub trait ReplySender: Send + Sync + 'static {
    /// Send a reply to `target`. Best effort: failures are not retried.
    fn send_reply(&self, target: &ReplyTarget, reply: Reply) -> Result<(), ChannelError>;
}
