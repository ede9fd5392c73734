//! Outbound message queue with strict priority ordering.
//!
//! Messages are ordered by priority tier (Critical > High > Normal > Low)
//! and FIFO by submission time within a tier. Strict priority is a
//! deliberate trade-off for time-critical drone commands: sustained
//! higher-priority traffic may starve lower tiers, bounded only by arrival
//! rate. This is documented behavior, not a bug to fix.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::oneshot;

use super::frame::Priority;

/// Unique identifier for a submitted outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Lifecycle state of an outbound message.
///
/// `Queued → Sent → AwaitingAck → {Acked | Queued (retry) | Failed}`.
/// A message reaches exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Waiting in the priority queue.
    Queued,
    /// Handed to the link, write in progress.
    Sent,
    /// On the air, ack timer running.
    AwaitingAck,
    /// Acknowledged by the peer. Terminal.
    Acked,
    /// Gave up. Terminal.
    Failed,
}

/// Why a message reached `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No acknowledgement after the configured number of attempts.
    RetriesExhausted,
    /// Cancelled by a mode change before completion.
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "retries exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal outcome reported to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The peer acknowledged the message.
    Acked {
        /// Transmission attempts used (1 = first try).
        attempts: u8,
    },
    /// The message was dropped.
    Failed {
        /// Why it failed.
        reason: FailureReason,
        /// Transmission attempts used.
        attempts: u8,
    },
}

/// An outbound message owned by the retry scheduler until terminal state.
///
/// `attempts` counts transmissions (including ones where the link write
/// itself failed) and never exceeds `max_attempts`.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Submission-ordered identifier.
    pub id: MessageId,
    /// Priority tier; preserved across retries.
    pub priority: Priority,
    /// Payload handed to the frame codec.
    pub payload: Vec<u8>,
    /// Submission time; preserved across retries for queue fairness.
    pub created_at: Instant,
    /// Transmission attempts so far.
    pub attempts: u8,
    /// Attempt bound.
    pub max_attempts: u8,
    /// Current lifecycle state.
    pub status: MessageStatus,
    /// One-shot completion channel back to the submitter.
    pub(crate) completion: Option<oneshot::Sender<SendOutcome>>,
}

impl OutboundMessage {
    /// Reports the terminal outcome to the submitter, if they still listen.
    pub(crate) fn complete(&mut self, outcome: SendOutcome) {
        self.status = match outcome {
            SendOutcome::Acked { .. } => MessageStatus::Acked,
            SendOutcome::Failed { .. } => MessageStatus::Failed,
        };
        if let Some(tx) = self.completion.take() {
            // A dropped receiver just means the caller stopped caring.
            let _ = tx.send(outcome);
        }
    }
}

/// Strict-priority FIFO queue of `Queued` messages.
///
/// One deque per tier; retried messages re-enter their original tier at the
/// position their original `created_at` earns them, so a retry does not
/// jump ahead of older traffic nor lose its place to newer traffic.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    // Index 0 = Low ... 3 = Critical.
    tiers: [VecDeque<OutboundMessage>; 4],
}

impl PriorityQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message into its priority tier, ordered by
    /// `(created_at, id)`.
    pub fn push(&mut self, message: OutboundMessage) {
        let tier = &mut self.tiers[message.priority as usize];
        let key = (message.created_at, message.id);
        let at = tier.partition_point(|m| (m.created_at, m.id) <= key);
        tier.insert(at, message);
    }

    /// Removes and returns the highest-priority, oldest-queued message.
    pub fn pop_next(&mut self) -> Option<OutboundMessage> {
        self.tiers.iter_mut().rev().find_map(VecDeque::pop_front)
    }

    /// Total queued messages across all tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    /// Drains every queued message, for cancellation.
    pub fn drain_all(&mut self) -> Vec<OutboundMessage> {
        self.tiers.iter_mut().flat_map(|t| t.drain(..)).collect()
    }
}
