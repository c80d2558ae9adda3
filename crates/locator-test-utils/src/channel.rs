//! Scripted transport endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};

use locator_core::{Query, Reply, ReplyTarget, RequestId};
use locator_discovery::{ChannelError, QueryChannel, ReplySender};
use parking_lot::Mutex;

/// Channel that accepts and records every query without delivering it.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    queries: Mutex<Vec<Query>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries sent so far.
    pub fn sent(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }

    /// Request id of the most recent query, i.e. the live round.
    pub fn last_request_id(&self) -> Option<RequestId> {
        self.queries
            .lock()
            .last()
            .map(|query| query.reply_to().request_id)
    }
}

impl QueryChannel for RecordingChannel {
    fn send(&self, query: &Query) -> Result<(), ChannelError> {
        self.queries.lock().push(query.clone());
        Ok(())
    }

    fn name(&self) -> String {
        "recording".to_string()
    }
}

/// Channel whose every send fails locally.
#[derive(Debug, Default)]
pub struct FailingChannel {
    attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl QueryChannel for FailingChannel {
    fn send(&self, _query: &Query) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::Send("no route to multicast group".to_string()))
    }

    fn name(&self) -> String {
        "failing".to_string()
    }
}

/// Reply sender that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingReplySender {
    replies: Mutex<Vec<(ReplyTarget, Reply)>>,
}

impl RecordingReplySender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies
            .lock()
            .iter()
            .map(|(_, reply)| reply.clone())
            .collect()
    }

    pub fn targets(&self) -> Vec<ReplyTarget> {
        self.replies
            .lock()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.lock().is_empty()
    }
}

impl ReplySender for RecordingReplySender {
    fn send_reply(&self, target: &ReplyTarget, reply: Reply) -> Result<(), ChannelError> {
        self.replies.lock().push((target.clone(), reply));
        Ok(())
    }
}
