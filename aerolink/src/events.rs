//! Telemetry events emitted by the service daemons.
//!
//! Events flow over an unbounded channel to whoever embeds the service
//! (the CLI logs them; a flight controller would react to them). Emission
//! never blocks a daemon loop, and a dropped receiver silently discards
//! events rather than wedging the sender.

use tokio::sync::mpsc;

use crate::localization::{LocalizedObject, TrackId};
use crate::radio::{FailureReason, LinkHealth, MessageId};

/// An event published by the radio scheduler or the localization daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A track was created or refreshed by a fusion cycle.
    ObjectLocalized {
        /// Snapshot of the updated track.
        object: LocalizedObject,
    },
    /// A track aged out and was removed.
    TrackEvicted {
        /// Identity of the removed track.
        track_id: TrackId,
    },
    /// An outbound message was acknowledged by the ground station.
    MessageAcked {
        /// The acknowledged message.
        id: MessageId,
        /// Transmission attempts used.
        attempts: u8,
    },
    /// An outbound message was dropped.
    MessageFailed {
        /// The failed message.
        id: MessageId,
        /// Transmission attempts used.
        attempts: u8,
        /// Why it was dropped.
        reason: FailureReason,
    },
    /// An outbound message went back on the queue for another attempt.
    MessageRetried {
        /// The retried message.
        id: MessageId,
        /// The attempt that just timed out (1 = first try).
        attempt: u8,
    },
    /// A data frame arrived from the ground station.
    CommandReceived {
        /// Raw payload for the embedding application to interpret.
        payload: Vec<u8>,
    },
    /// The advisory link health changed.
    LinkHealthChanged {
        /// Health before the change.
        previous: LinkHealth,
        /// Health after the change.
        current: LinkHealth,
    },
    /// A keep-alive ping went out on an idle link.
    PingSent {
        /// Frame sequence number of the ping.
        sequence: u32,
    },
}

impl TelemetryEvent {
    /// Stable lowercase tag for logging and dispatch.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ObjectLocalized { .. } => "object_localized",
            Self::TrackEvicted { .. } => "track_evicted",
            Self::MessageAcked { .. } => "message_acked",
            Self::MessageFailed { .. } => "message_failed",
            Self::MessageRetried { .. } => "message_retried",
            Self::CommandReceived { .. } => "command_received",
            Self::LinkHealthChanged { .. } => "link_health_changed",
            Self::PingSent { .. } => "ping_sent",
        }
    }
}

/// Sending half of the event channel, cloned into each daemon.
pub type EventSender = mpsc::UnboundedSender<TelemetryEvent>;

/// Receiving half handed to the service embedder.
pub type EventReceiver = mpsc::UnboundedReceiver<TelemetryEvent>;

/// Creates the event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
