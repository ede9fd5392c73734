//! Retry scheduling, ack matching, and link supervision.
//!
//! The scheduler is the single owner of the radio link. It runs a
//! cancellable cycle loop that polls inbound frames, matches acks against
//! the one in-flight message (stop-and-wait), retires or requeues timed-out
//! messages, dequeues the next transmission, and keeps the link alive with
//! pings when idle. Embedders talk to it through a cloneable
//! [`RadioHandle`] over a bounded command channel.
//!
//! Timers use the tokio clock so tests can drive retry timing with a
//! paused clock; the quality monitor keeps its own wall-clock timeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant as StdInstant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::RadioSettings;
use crate::events::{EventSender, TelemetryEvent};

use super::frame::{Frame, FrameError, FrameKind, Priority, MAX_PAYLOAD_LEN};
use super::link::{LinkError, RadioDevice, RadioLink};
use super::monitor::{LinkHealth, LinkStats, NetworkMonitor, SharedLinkStats};
use super::queue::{
    FailureReason, MessageId, MessageStatus, OutboundMessage, PriorityQueue, SendOutcome,
};

/// Errors returned when submitting work to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Payload exceeds the single-frame limit.
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN} byte frame limit")]
    PayloadTooLong(usize),

    /// The submission channel is at capacity; back off and retry.
    #[error("outbound submission queue is full")]
    QueueFull,

    /// The scheduler has shut down.
    #[error("radio scheduler is not running")]
    Closed,
}

/// Commands accepted over the scheduler's channel.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Enqueue an outbound message.
    Submit(Box<OutboundMessage>),
    /// Fail everything queued or in flight with `Cancelled`.
    CancelAll,
}

/// Receipt for a submitted message.
#[derive(Debug)]
pub struct SendReceipt {
    /// Identifier assigned at submission.
    pub id: MessageId,
    /// Resolves to the terminal [`SendOutcome`].
    pub outcome: oneshot::Receiver<SendOutcome>,
}

/// Cloneable submission handle to a running scheduler.
#[derive(Debug, Clone)]
pub struct RadioHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    next_id: Arc<AtomicU64>,
}

impl RadioHandle {
    /// Submits a payload for reliable delivery.
    ///
    /// # Errors
    ///
    /// [`SubmitError::PayloadTooLong`] for oversized payloads,
    /// [`SubmitError::QueueFull`] when the channel is at capacity, and
    /// [`SubmitError::Closed`] once the scheduler has stopped.
    pub fn submit(&self, payload: Vec<u8>, priority: Priority) -> Result<SendReceipt, SubmitError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SubmitError::PayloadTooLong(payload.len()));
        }

        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (done_tx, done_rx) = oneshot::channel();
        let message = OutboundMessage {
            id,
            priority,
            payload,
            created_at: StdInstant::now(),
            attempts: 0,
            // Assigned from settings when the scheduler accepts it.
            max_attempts: 0,
            status: MessageStatus::Queued,
            completion: Some(done_tx),
        };

        self.commands
            .try_send(SchedulerCommand::Submit(Box::new(message)))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
            })?;
        Ok(SendReceipt {
            id,
            outcome: done_rx,
        })
    }

    /// Cancels every queued and in-flight message.
    ///
    /// # Errors
    ///
    /// [`SubmitError::QueueFull`] or [`SubmitError::Closed`] if the command
    /// cannot be delivered.
    pub fn cancel_all(&self) -> Result<(), SubmitError> {
        self.commands
            .try_send(SchedulerCommand::CancelAll)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
            })
    }
}

/// The message currently on the air, with its ack deadline.
#[derive(Debug)]
struct InFlight {
    message: OutboundMessage,
    sequence: u32,
    deadline: Instant,
}

/// Stop-and-wait retry scheduler over one radio link.
pub struct RetryScheduler {
    settings: RadioSettings,
    link: RadioLink,
    monitor: NetworkMonitor,
    queue: PriorityQueue,
    commands: mpsc::Receiver<SchedulerCommand>,
    events: EventSender,
    shared_stats: SharedLinkStats,
    in_flight: Option<InFlight>,
    next_sequence: u32,
    last_activity: Instant,
    last_health: LinkHealth,
}

impl RetryScheduler {
    /// Builds a scheduler over `device` and returns it with its handle.
    ///
    /// `queue_capacity` bounds the submission channel; submissions beyond
    /// it fail fast with [`SubmitError::QueueFull`].
    pub fn new(
        settings: RadioSettings,
        queue_capacity: usize,
        device: Box<dyn RadioDevice>,
        events: EventSender,
    ) -> (Self, RadioHandle) {
        let (command_tx, command_rx) = mpsc::channel(queue_capacity.max(1));
        let monitor = NetworkMonitor::new(
            std::time::Duration::from_secs(settings.quality_window_secs),
            std::time::Duration::from_secs(settings.silence_threshold_secs),
            settings.degraded_snr_db,
            settings.degraded_rssi_dbm,
        );
        let link = RadioLink::new(device, settings.write_timeout());

        let scheduler = Self {
            settings,
            link,
            monitor,
            queue: PriorityQueue::new(),
            commands: command_rx,
            events,
            shared_stats: SharedLinkStats::default(),
            in_flight: None,
            next_sequence: 0,
            last_activity: Instant::now(),
            last_health: LinkHealth::Unreachable,
        };
        let handle = RadioHandle {
            commands: command_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (scheduler, handle)
    }

    /// Shared handle to the latest published [`LinkStats`].
    pub fn stats_handle(&self) -> SharedLinkStats {
        Arc::clone(&self.shared_stats)
    }

    /// Runs the scheduler until `shutdown` is cancelled.
    ///
    /// On shutdown every queued and in-flight message fails with
    /// `Cancelled` so no submitter waits forever.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            ack_timeout_secs = self.settings.ack_timeout_secs,
            retry_count = self.settings.retry_count,
            "radio scheduler started"
        );

        let mut ticker = time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                }

                _ = ticker.tick() => {
                    self.cycle();
                }
            }
        }

        self.cancel_everything();
        info!("radio scheduler stopped");
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Submit(mut message) => {
                message.max_attempts = self.settings.retry_count.max(1);
                debug!(
                    id = %message.id,
                    priority = ?message.priority,
                    bytes = message.payload.len(),
                    "message queued"
                );
                self.queue.push(*message);
            }
            SchedulerCommand::CancelAll => self.cancel_everything(),
        }
    }

    fn cancel_everything(&mut self) {
        let mut cancelled = self.queue.drain_all();
        if let Some(in_flight) = self.in_flight.take() {
            cancelled.push(in_flight.message);
        }
        if cancelled.is_empty() {
            return;
        }

        info!(count = cancelled.len(), "cancelling outbound messages");
        for mut message in cancelled {
            let attempts = message.attempts;
            message.complete(SendOutcome::Failed {
                reason: FailureReason::Cancelled,
                attempts,
            });
            self.monitor.note_failed();
            let _ = self.events.send(TelemetryEvent::MessageFailed {
                id: message.id,
                attempts,
                reason: FailureReason::Cancelled,
            });
        }
    }

    /// One scheduler cycle: inbound, timers, dequeue, keep-alive, publish.
    fn cycle(&mut self) {
        let now = Instant::now();
        self.poll_inbound();
        self.check_ack_deadline(now);
        if self.in_flight.is_none() {
            if let Some(message) = self.queue.pop_next() {
                self.transmit(message, now);
            }
        }
        self.maybe_ping(now);
        self.publish_stats();
    }

    fn poll_inbound(&mut self) {
        loop {
            match self.link.poll_frame(&mut self.monitor) {
                Ok(Some(frame)) => {
                    self.last_activity = Instant::now();
                    self.handle_frame(frame);
                }
                Ok(None) => return,
                Err(LinkError::DeviceUnavailable) => {
                    trace!("no radio device attached");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "inbound poll failed");
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::Ack => {
                let matches = self
                    .in_flight
                    .as_ref()
                    .is_some_and(|in_flight| in_flight.sequence == frame.sequence);
                if !matches {
                    // Late ack for a retransmitted or cancelled message.
                    debug!(sequence = frame.sequence, "unmatched ack ignored");
                    return;
                }

                let mut in_flight = match self.in_flight.take() {
                    Some(in_flight) => in_flight,
                    None => return,
                };
                let attempts = in_flight.message.attempts;
                info!(
                    id = %in_flight.message.id,
                    sequence = frame.sequence,
                    attempts,
                    "message acknowledged"
                );
                in_flight.message.complete(SendOutcome::Acked { attempts });
                self.monitor.note_acked();
                let _ = self.events.send(TelemetryEvent::MessageAcked {
                    id: in_flight.message.id,
                    attempts,
                });
            }
            FrameKind::Data => {
                debug!(
                    sequence = frame.sequence,
                    bytes = frame.payload.len(),
                    "command frame received"
                );
                let ack = Frame::ack(frame.sequence);
                match self.link.send_frame(&ack) {
                    Ok(()) => self.monitor.note_sent(),
                    Err(err) => warn!(error = %err, "failed to ack inbound command"),
                }
                let _ = self.events.send(TelemetryEvent::CommandReceived {
                    payload: frame.payload,
                });
            }
            FrameKind::Ping => {
                // The quality sample was already taken; nothing to answer.
                trace!(sequence = frame.sequence, "ping received");
            }
        }
    }

    fn check_ack_deadline(&mut self, now: Instant) {
        let expired = self
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.deadline <= now);
        if !expired {
            return;
        }
        let in_flight = match self.in_flight.take() {
            Some(in_flight) => in_flight,
            None => return,
        };
        self.retry_or_fail(in_flight.message, "ack timeout");
    }

    /// Requeues a message that still has attempts left, or retires it.
    fn retry_or_fail(&mut self, mut message: OutboundMessage, cause: &str) {
        let attempts = message.attempts;
        if attempts >= message.max_attempts {
            warn!(id = %message.id, attempts, cause, "message failed");
            message.complete(SendOutcome::Failed {
                reason: FailureReason::RetriesExhausted,
                attempts,
            });
            self.monitor.note_failed();
            let _ = self.events.send(TelemetryEvent::MessageFailed {
                id: message.id,
                attempts,
                reason: FailureReason::RetriesExhausted,
            });
            return;
        }

        debug!(id = %message.id, attempt = attempts, cause, "scheduling retry");
        self.monitor.note_retransmission();
        let _ = self.events.send(TelemetryEvent::MessageRetried {
            id: message.id,
            attempt: attempts,
        });
        message.status = MessageStatus::Queued;
        self.queue.push(message);
    }

    /// One transmission attempt for the dequeued message.
    fn transmit(&mut self, mut message: OutboundMessage, now: Instant) {
        message.attempts += 1;
        message.status = MessageStatus::Sent;
        let sequence = self.next_sequence();

        let frame = match Frame::data(sequence, message.priority, message.payload.clone()) {
            Ok(frame) => frame,
            Err(FrameError::PayloadTooLong(len)) => {
                // Submission already bounds payload size; retrying an
                // oversized payload can never succeed.
                warn!(id = %message.id, bytes = len, "dropping oversized message");
                let attempts = message.attempts;
                message.complete(SendOutcome::Failed {
                    reason: FailureReason::Cancelled,
                    attempts,
                });
                self.monitor.note_failed();
                return;
            }
        };

        match self.link.send_frame(&frame) {
            Ok(()) => {
                self.monitor.note_sent();
                self.last_activity = now;
                message.status = MessageStatus::AwaitingAck;

                // A struggling link gets twice as long to produce the ack.
                let mut timeout = self.settings.ack_timeout();
                if self.last_health == LinkHealth::Degraded {
                    timeout *= 2;
                }
                debug!(
                    id = %message.id,
                    sequence,
                    attempt = message.attempts,
                    timeout_ms = timeout.as_millis() as u64,
                    "frame transmitted"
                );
                self.in_flight = Some(InFlight {
                    message,
                    sequence,
                    deadline: now + timeout,
                });
            }
            Err(err) => {
                // A failed write consumes an attempt like a lost frame does.
                warn!(id = %message.id, error = %err, "radio write failed");
                self.retry_or_fail(message, "write failed");
            }
        }
    }

    fn maybe_ping(&mut self, now: Instant) {
        let idle = self.in_flight.is_none() && self.queue.is_empty();
        if !idle || now.duration_since(self.last_activity) < self.settings.ping_interval() {
            return;
        }

        let sequence = self.next_sequence();
        match self.link.send_frame(&Frame::ping(sequence)) {
            Ok(()) => {
                self.monitor.note_sent();
                self.last_activity = now;
                debug!(sequence, "keep-alive ping sent");
                let _ = self.events.send(TelemetryEvent::PingSent { sequence });
            }
            Err(err) => {
                trace!(error = %err, "keep-alive ping not sent");
                // Push the next attempt out a full interval either way.
                self.last_activity = now;
            }
        }
    }

    fn publish_stats(&mut self) {
        let stats = self.monitor.stats(StdInstant::now());
        if stats.health != self.last_health {
            info!(
                previous = %self.last_health,
                current = %stats.health,
                "link health changed"
            );
            let _ = self.events.send(TelemetryEvent::LinkHealthChanged {
                previous: self.last_health,
                current: stats.health,
            });
            self.last_health = stats.health;
        }
        self.store_stats(stats);
    }

    fn store_stats(&self, stats: LinkStats) {
        match self.shared_stats.write() {
            Ok(mut guard) => *guard = stats,
            Err(poisoned) => *poisoned.into_inner() = stats,
        }
    }

    fn next_sequence(&mut self) -> u32 {
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.next_sequence
    }
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight.is_some())
            .field("health", &self.last_health)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventReceiver};
    use crate::radio::frame::encode;
    use crate::radio::link::{SimulatedDevice, SimulatedDeviceConfig};

    struct Harness {
        handle: RadioHandle,
        stats: SharedLinkStats,
        events: EventReceiver,
        shutdown: CancellationToken,
    }

    fn start(device: SimulatedDevice) -> Harness {
        start_with(device, RadioSettings::default(), 16)
    }

    fn start_with(device: SimulatedDevice, settings: RadioSettings, capacity: usize) -> Harness {
        let (event_tx, event_rx) = events::channel();
        let (scheduler, handle) =
            RetryScheduler::new(settings, capacity, Box::new(device), event_tx);
        let stats = scheduler.stats_handle();
        let shutdown = CancellationToken::new();
        tokio::spawn(scheduler.run(shutdown.clone()));
        Harness {
            handle,
            stats,
            events: event_rx,
            shutdown,
        }
    }

    async fn next_event_of(events: &mut EventReceiver, wanted: &str) -> TelemetryEvent {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if event.event_type() == wanted {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acked_on_first_attempt() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig::default());
        let mut harness = start(device);

        let receipt = harness
            .handle
            .submit(b"position report".to_vec(), Priority::Normal)
            .unwrap();
        let outcome = receipt.outcome.await.unwrap();
        assert_eq!(outcome, SendOutcome::Acked { attempts: 1 });

        let event = next_event_of(&mut harness.events, "message_acked").await;
        assert_eq!(
            event,
            TelemetryEvent::MessageAcked {
                id: receipt.id,
                attempts: 1
            }
        );
        harness.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_fails_on_total_loss() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            loss_rate: 1.0,
            ..Default::default()
        });
        let mut harness = start(device);

        let started = Instant::now();
        let receipt = harness
            .handle
            .submit(b"into the void".to_vec(), Priority::High)
            .unwrap();
        let outcome = receipt.outcome.await.unwrap();

        assert_eq!(
            outcome,
            SendOutcome::Failed {
                reason: FailureReason::RetriesExhausted,
                attempts: 3,
            }
        );
        // Three attempts, each waiting out the full 2s ack timeout.
        assert!(started.elapsed() >= std::time::Duration::from_secs(6));

        let first = next_event_of(&mut harness.events, "message_retried").await;
        assert_eq!(
            first,
            TelemetryEvent::MessageRetried {
                id: receipt.id,
                attempt: 1
            }
        );

        // Give the loop a cycle to publish the final counters.
        time::sleep(std::time::Duration::from_millis(100)).await;
        let stats = harness.stats.read().unwrap().clone();
        assert_eq!(stats.retransmissions, 2);
        assert_eq!(stats.messages_failed, 1);
        harness.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_link_stretches_ack_timeout() {
        let mut device = SimulatedDevice::new(SimulatedDeviceConfig {
            auto_ack: false,
            ..Default::default()
        });
        // A weak reception drags the quality averages below both degraded
        // floors before any message goes out.
        device.inject(encode(&Frame::ping(1)), -120, -5.0);
        let mut harness = start(device);

        let event = next_event_of(&mut harness.events, "link_health_changed").await;
        assert_eq!(
            event,
            TelemetryEvent::LinkHealthChanged {
                previous: LinkHealth::Unreachable,
                current: LinkHealth::Degraded,
            }
        );

        let started = Instant::now();
        let receipt = harness
            .handle
            .submit(b"uplink".to_vec(), Priority::Normal)
            .unwrap();
        let retried = next_event_of(&mut harness.events, "message_retried").await;
        assert_eq!(
            retried,
            TelemetryEvent::MessageRetried {
                id: receipt.id,
                attempt: 1
            }
        );

        // On a degraded link the first retry waits out twice the 2s ack
        // timeout instead of one.
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(4));
        assert!(elapsed < std::time::Duration::from_secs(6));
        harness.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_jumps_the_queue() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig::default());
        let (event_tx, mut event_rx) = events::channel();
        let (scheduler, handle) = RetryScheduler::new(
            RadioSettings::default(),
            16,
            Box::new(device),
            event_tx,
        );
        let shutdown = CancellationToken::new();

        // Queue everything before the loop starts so ordering is decided
        // by priority, not submission racing.
        let low = handle.submit(b"low".to_vec(), Priority::Low).unwrap();
        let normal = handle.submit(b"normal".to_vec(), Priority::Normal).unwrap();
        let critical = handle
            .submit(b"critical".to_vec(), Priority::Critical)
            .unwrap();
        tokio::spawn(scheduler.run(shutdown.clone()));

        let mut acked_order = Vec::new();
        for _ in 0..3 {
            if let TelemetryEvent::MessageAcked { id, .. } =
                next_event_of(&mut event_rx, "message_acked").await
            {
                acked_order.push(id);
            }
        }
        assert_eq!(acked_order, vec![critical.id, normal.id, low.id]);
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_fails_pending() {
        // No acks ever arrive, so the first message camps in flight and
        // the second waits in the queue.
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            auto_ack: false,
            ..Default::default()
        });
        let harness = start(device);

        let first = harness
            .handle
            .submit(b"first".to_vec(), Priority::Normal)
            .unwrap();
        let second = harness
            .handle
            .submit(b"second".to_vec(), Priority::Normal)
            .unwrap();

        // Let the first transmission happen, then cancel.
        time::sleep(std::time::Duration::from_millis(100)).await;
        harness.handle.cancel_all().unwrap();

        let outcome = first.outcome.await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                reason: FailureReason::Cancelled,
                ..
            }
        ));
        let outcome = second.outcome.await.unwrap();
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                reason: FailureReason::Cancelled,
                ..
            }
        ));
        harness.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_command_forwarded() {
        let mut device = SimulatedDevice::new(SimulatedDeviceConfig {
            auto_ack: false,
            ..Default::default()
        });
        let command = Frame::data(42, Priority::High, b"RTL".to_vec()).unwrap();
        device.inject_frame(&command);

        let mut harness = start(device);
        let event = next_event_of(&mut harness.events, "command_received").await;
        assert_eq!(
            event,
            TelemetryEvent::CommandReceived {
                payload: b"RTL".to_vec()
            }
        );
        harness.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_when_idle() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            auto_ack: false,
            ..Default::default()
        });
        let mut harness = start(device);

        let started = Instant::now();
        let event = next_event_of(&mut harness.events, "ping_sent").await;
        assert!(matches!(event, TelemetryEvent::PingSent { .. }));
        // Default idle threshold is 15 seconds.
        assert!(started.elapsed() >= std::time::Duration::from_secs(14));
        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_queue_full_rejected() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig::default());
        let (event_tx, _event_rx) = events::channel();
        // Scheduler never spawned: the channel fills at its capacity.
        let (_scheduler, handle) =
            RetryScheduler::new(RadioSettings::default(), 1, Box::new(device), event_tx);

        handle.submit(b"fits".to_vec(), Priority::Normal).unwrap();
        let err = handle
            .submit(b"overflow".to_vec(), Priority::Normal)
            .unwrap_err();
        assert_eq!(err, SubmitError::QueueFull);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig::default());
        let (event_tx, _event_rx) = events::channel();
        let (_scheduler, handle) =
            RetryScheduler::new(RadioSettings::default(), 4, Box::new(device), event_tx);

        let err = handle
            .submit(vec![0u8; MAX_PAYLOAD_LEN + 1], Priority::Normal)
            .unwrap_err();
        assert_eq!(err, SubmitError::PayloadTooLong(MAX_PAYLOAD_LEN + 1));
    }
}
