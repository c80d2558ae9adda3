//! State of one in-flight lookup.
//!
//! Object and adapter lookups share the round bookkeeping and differ only in
//! how replies settle them, so the kind is a field rather than a type.

use std::time::Duration;

use locator_core::{Address, RequestId, RequestKey};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::DiscoveryConfig;
use crate::timer::TimerHandle;

/// Caller waiting on a lookup. `None` means not found.
pub(crate) type Waiter = oneshot::Sender<Option<Address>>;

/// Armed deadline. The token lets a firing timer detect that it has been
/// superseded while it waited for the lock.
pub(crate) struct ArmedTimer {
    pub token: u64,
    pub handle: Box<dyn TimerHandle>,
}

pub(crate) enum RequestKind {
    /// First valid reply wins.
    Object,
    /// Replica replies are collected for a short window and merged.
    Adapter {
        collected: Vec<Address>,
        first_reply_at: Option<Instant>,
    },
}

/// What a reply did to a request.
#[derive(Debug, PartialEq)]
pub(crate) enum ReplyOutcome {
    Finalize(Address),
    /// First replica reply: move the deadline to the given delay from now.
    Reschedule(Duration),
    /// Collected; keep waiting for the current deadline.
    Collected,
}

/// What an elapsed deadline did to a request.
#[derive(Debug, PartialEq)]
pub(crate) enum DeadlineOutcome {
    Finalize(Address),
    Retry,
    Exhausted,
}

pub(crate) struct PendingRequest {
    pub key: RequestKey,
    pub request_id: RequestId,
    pub retries_remaining: u32,
    pub waiters: Vec<Waiter>,
    /// Channels queried this round.
    pub outstanding: usize,
    /// Channels that reported a local send failure this round.
    pub failed: usize,
    pub issued_at: Instant,
    pub timer: Option<ArmedTimer>,
    pub kind: RequestKind,
}

impl PendingRequest {
    pub fn new(key: RequestKey, retry_count: u32) -> Self {
        let kind = match key {
            RequestKey::Object(_) => RequestKind::Object,
            RequestKey::Adapter(_) => RequestKind::Adapter {
                collected: Vec::new(),
                first_reply_at: None,
            },
        };

        Self {
            key,
            request_id: RequestId::new(),
            retries_remaining: retry_count,
            waiters: Vec::new(),
            outstanding: 0,
            failed: 0,
            issued_at: Instant::now(),
            timer: None,
            kind,
        }
    }

    /// Start a new round on `channels` channels and return its id.
    pub fn begin_round(&mut self, channels: usize) -> RequestId {
        self.request_id = RequestId::new();
        self.outstanding = channels;
        self.failed = 0;
        self.issued_at = Instant::now();
        if let RequestKind::Adapter { first_reply_at, .. } = &mut self.kind {
            *first_reply_at = None;
        }
        self.request_id
    }

    /// Record a local send failure. Returns `true` once every channel of
    /// the round has failed.
    pub fn record_failure(&mut self) -> bool {
        self.failed += 1;
        self.all_channels_failed()
    }

    pub fn all_channels_failed(&self) -> bool {
        self.failed >= self.outstanding
    }

    pub fn on_reply(
        &mut self,
        address: Address,
        is_replica_group: bool,
        config: &DiscoveryConfig,
    ) -> ReplyOutcome {
        match &mut self.kind {
            RequestKind::Object => ReplyOutcome::Finalize(address),
            RequestKind::Adapter { .. } if !is_replica_group => ReplyOutcome::Finalize(address),
            RequestKind::Adapter {
                collected,
                first_reply_at,
            } => {
                if !collected.contains(&address) {
                    collected.push(address);
                }

                if first_reply_at.is_some() {
                    return ReplyOutcome::Collected;
                }

                let now = Instant::now();
                *first_reply_at = Some(now);
                let rtt = now.saturating_duration_since(self.issued_at);
                ReplyOutcome::Reschedule(config.replica_window(rtt))
            }
        }
    }

    pub fn on_deadline(&mut self) -> DeadlineOutcome {
        if let Some(address) = self.collected_address() {
            return DeadlineOutcome::Finalize(address);
        }

        if self.retries_remaining > 0 {
            self.retries_remaining -= 1;
            DeadlineOutcome::Retry
        } else {
            DeadlineOutcome::Exhausted
        }
    }

    /// Merged address of the replica replies collected so far.
    pub fn collected_address(&self) -> Option<Address> {
        match &self.kind {
            RequestKind::Object => None,
            RequestKind::Adapter { collected, .. } => Address::merge(collected),
        }
    }

    pub fn cancel_timer(&mut self) {
        if let Some(armed) = self.timer.take() {
            armed.handle.cancel();
        }
    }

    /// Resolve every waiter with the same outcome.
    pub fn complete(mut self, result: Option<Address>) {
        self.cancel_timer();
        for waiter in self.waiters.drain(..) {
            // A waiter that gave up has dropped its receiver.
            let _ = waiter.send(result.clone());
        }
    }
}
