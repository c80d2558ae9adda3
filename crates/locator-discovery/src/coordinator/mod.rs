//! Client side of the discovery protocol.
//!
//! The [`RequestCoordinator`] turns concurrent lookups of the same key into a
//! single multicast round: the first caller creates a pending request and
//! issues the query on every channel, later callers attach to it, and all of
//! them are woken together with the same outcome.
//!
//! # Rounds
//!
//! Every issue and reissue mints a new [`RequestId`]. Replies carry the id of
//! the round they answer and are dropped unless it matches the live round,
//! so a late answer to a superseded round can never be misattributed.
//!
//! # Replica groups
//!
//! An adapter lookup finalizes on the first direct reply. Replica group
//! replies are collected instead; the first one moves the deadline to
//! `rtt * latency_multiplier%` so nearby siblings can answer, after which the
//! collected addresses are merged.
//!
//! # Locking
//!
//! All state sits behind one mutex per coordinator. Channel sends and timer
//! scheduling happen under it, which is why [`QueryChannel::send`] and
//! [`Timer::schedule`] must never call back synchronously.

mod request;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use locator_core::{AdapterName, Address, Identity, Query, Reply, ReplyTarget, RequestId, RequestKey};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::channel::QueryChannel;
use crate::config::DiscoveryConfig;
use crate::error::{ChannelError, Error, Result};
use crate::timer::Timer;

use request::{ArmedTimer, DeadlineOutcome, PendingRequest, ReplyOutcome};

type PendingTable = HashMap<RequestKey, PendingRequest>;

/// Coalescing, retrying lookup client.
///
/// Cheap to clone; clones share the same pending table.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: DiscoveryConfig,
    channels: Vec<Arc<dyn QueryChannel>>,
    timer: Arc<dyn Timer>,
    /// Unicast address remote servers reply to.
    reply_endpoint: String,
    pending: Mutex<PendingTable>,
    next_timer_token: AtomicU64,
    channel_failure_logged: AtomicBool,
}

impl RequestCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `config` - Protocol parameters
    /// * `channels` - Multicast channels every query is fanned out on
    /// * `timer` - Deadline scheduler
    /// * `reply_endpoint` - Unicast address replies should be sent to
    pub fn new(
        config: DiscoveryConfig,
        channels: Vec<Arc<dyn QueryChannel>>,
        timer: Arc<dyn Timer>,
        reply_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                channels,
                timer,
                reply_endpoint: reply_endpoint.into(),
                pending: Mutex::new(HashMap::new()),
                next_timer_token: AtomicU64::new(0),
                channel_failure_logged: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    /// Resolve an object identity to an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no server answered within the retry
    /// budget.
    pub async fn resolve_object(&self, identity: &Identity) -> Result<Address> {
        self.resolve(RequestKey::Object(identity.clone())).await
    }

    /// Resolve an adapter or replica group name to an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no server answered within the retry
    /// budget.
    pub async fn resolve_adapter(&self, adapter: &AdapterName) -> Result<Address> {
        self.resolve(RequestKey::Adapter(adapter.clone())).await
    }

    /// Attach to the pending request for `key`, issuing one if none exists.
    pub async fn resolve(&self, key: RequestKey) -> Result<Address> {
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock();
            match pending.get_mut(&key) {
                Some(request) => {
                    trace!(key = %key, waiters = request.waiters.len() + 1, "Joining pending request");
                    request.waiters.push(tx);
                }
                None => {
                    let mut request = PendingRequest::new(key.clone(), self.inner.config.retry_count());
                    request.waiters.push(tx);
                    pending.insert(key.clone(), request);
                    self.inner.issue(&mut pending, &key);
                }
            }
        }

        match rx.await {
            Ok(Some(address)) => Ok(address),
            Ok(None) | Err(_) => Err(Error::NotFound(key)),
        }
    }

    /// Handle a reply routed back from a server.
    ///
    /// Replies for unknown keys or superseded rounds are dropped.
    pub fn on_found(&self, reply: Reply) {
        let key = reply.key();
        let request_id = reply.request_id();
        let (address, is_replica_group) = match reply {
            Reply::FoundObjectById { address, .. } => (address, false),
            Reply::FoundAdapterById {
                address,
                is_replica_group,
                ..
            } => (address, is_replica_group),
        };

        let mut pending = self.inner.pending.lock();
        let Some(request) = pending.get_mut(&key) else {
            trace!(key = %key, request_id = %request_id, "Dropping reply for unknown request");
            return;
        };
        if request.request_id != request_id {
            trace!(key = %key, request_id = %request_id, "Dropping stale reply");
            return;
        }

        match request.on_reply(address, is_replica_group, &self.inner.config) {
            ReplyOutcome::Finalize(address) => {
                debug!(key = %key, address = %address, "Resolved");
                self.inner.finalize(&mut pending, &key, Some(address));
            }
            ReplyOutcome::Reschedule(delay) => {
                debug!(key = %key, window = ?delay, "First replica reply, shortening deadline");
                self.inner.arm(request, delay);
            }
            ReplyOutcome::Collected => {
                trace!(key = %key, "Collected replica reply");
            }
        }
    }

    /// Report a send failure on one channel for the given round.
    ///
    /// Once every channel of the live round has failed the request finalizes
    /// as not found without waiting for its deadline. Failures for
    /// superseded rounds are ignored.
    pub fn on_channel_failed(&self, key: &RequestKey, request_id: RequestId, error: &ChannelError) {
        let mut pending = self.inner.pending.lock();
        let Some(request) = pending.get_mut(key) else {
            return;
        };
        if request.request_id != request_id {
            return;
        }

        self.inner.log_channel_failure(error);
        if request.record_failure() {
            debug!(key = %key, "Every channel failed");
            self.inner.finalize_without_reply(&mut pending, key);
        }
    }

    /// Expire the live round of `key` now, as if its deadline had elapsed.
    pub fn on_timeout(&self, key: &RequestKey) {
        let mut pending = self.inner.pending.lock();
        if let Some(request) = pending.get_mut(key) {
            request.cancel_timer();
            self.inner.expire(&mut pending, key);
        }
    }

    /// Number of lookups currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Id of the live round for `key`, if a lookup is in flight.
    pub fn current_request_id(&self, key: &RequestKey) -> Option<RequestId> {
        self.inner.pending.lock().get(key).map(|request| request.request_id)
    }
}

impl Inner {
    /// Start a new round for `key`: mint an id, fan the query out and arm
    /// the deadline.
    fn issue(self: &Arc<Self>, pending: &mut PendingTable, key: &RequestKey) {
        let Some(request) = pending.get_mut(key) else {
            return;
        };

        let request_id = request.begin_round(self.channels.len());
        let query = Query::new(
            self.config.domain_id(),
            key.clone(),
            ReplyTarget {
                request_id,
                endpoint: self.reply_endpoint.clone(),
            },
        );

        debug!(
            key = %key,
            request_id = %request_id,
            channels = self.channels.len(),
            retries_remaining = request.retries_remaining,
            "Issuing discovery query"
        );

        for channel in &self.channels {
            if let Err(e) = channel.send(&query) {
                trace!(channel = %channel.name(), error = %e, "Channel send failed");
                self.log_channel_failure(&e);
                request.failed += 1;
            }
        }

        if request.all_channels_failed() {
            debug!(key = %key, "No channel accepted the query");
            self.finalize_without_reply(pending, key);
            return;
        }

        let timeout = self.config.timeout();
        self.arm(request, timeout);
    }

    /// Replace the request's deadline. The previous timer is cancelled first.
    fn arm(self: &Arc<Self>, request: &mut PendingRequest, delay: Duration) {
        request.cancel_timer();

        let token = self.next_timer_token.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(self);
        let key = request.key.clone();

        let handle = self.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(&key, token);
                }
            }),
        );

        request.timer = Some(ArmedTimer { token, handle });
    }

    /// Timer callback. Ignored unless `token` is still the armed deadline.
    fn fire(self: &Arc<Self>, key: &RequestKey, token: u64) {
        let mut pending = self.pending.lock();
        let Some(request) = pending.get_mut(key) else {
            return;
        };
        if request.timer.as_ref().map(|armed| armed.token) != Some(token) {
            return;
        }
        request.timer = None;

        self.expire(&mut pending, key);
    }

    fn expire(self: &Arc<Self>, pending: &mut PendingTable, key: &RequestKey) {
        let Some(request) = pending.get_mut(key) else {
            return;
        };

        match request.on_deadline() {
            DeadlineOutcome::Finalize(address) => {
                debug!(key = %key, address = %address, "Replica window closed");
                self.finalize(pending, key, Some(address));
            }
            DeadlineOutcome::Retry => {
                debug!(key = %key, retries_remaining = request.retries_remaining, "Round timed out, retrying");
                self.issue(pending, key);
            }
            DeadlineOutcome::Exhausted => {
                debug!(key = %key, "Retries exhausted");
                self.finalize(pending, key, None);
            }
        }
    }

    /// Finalize with whatever replica replies were collected, or not found.
    fn finalize_without_reply(&self, pending: &mut PendingTable, key: &RequestKey) {
        let result = pending
            .get(key)
            .and_then(|request| request.collected_address());
        self.finalize(pending, key, result);
    }

    fn finalize(&self, pending: &mut PendingTable, key: &RequestKey, result: Option<Address>) {
        if let Some(request) = pending.remove(key) {
            request.complete(result);
        }
    }

    fn log_channel_failure(&self, error: &ChannelError) {
        if !self.config.warn_on_channel_failure() {
            return;
        }
        if !self.channel_failure_logged.swap(true, Ordering::Relaxed) {
            warn!(
                error = %error,
                "Failed to send discovery query; further send failures will not be logged"
            );
        }
    }
}
