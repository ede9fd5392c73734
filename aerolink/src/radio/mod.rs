//! Reliable transport over a half-duplex LoRa-class radio.
//!
//! Layers, bottom up:
//! - [`frame`]: wire codec with CRC-16 integrity checking
//! - [`link`]: exclusive device ownership and stream reassembly
//! - [`queue`]: strict-priority outbound ordering
//! - [`monitor`]: link quality window and transport counters
//! - [`scheduler`]: stop-and-wait retries, ack matching, keep-alive
//!
//! The scheduler task is the sole owner of the link, which is what makes
//! the half-duplex channel safe: at most one frame is on the air in either
//! direction at a time. Everything above it interacts through the
//! cloneable [`RadioHandle`].

pub mod frame;
pub mod link;
pub mod monitor;
pub mod queue;
pub mod scheduler;

pub use frame::{DecodeError, Frame, FrameError, FrameKind, Priority, MAX_PAYLOAD_LEN};
pub use link::{
    LinkError, NullDevice, RadioDevice, RadioLink, ReceivedChunk, SimulatedDevice,
    SimulatedDeviceConfig,
};
pub use monitor::{LinkHealth, LinkQualitySample, LinkStats, NetworkMonitor, SharedLinkStats};
pub use queue::{FailureReason, MessageId, MessageStatus, OutboundMessage, SendOutcome};
pub use scheduler::{RadioHandle, RetryScheduler, SendReceipt, SubmitError};
