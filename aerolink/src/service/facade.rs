//! High-level service facade.
//!
//! [`AerolinkService::start`] wires the radio scheduler and the
//! localization daemon together over a shared configuration and event
//! channel, spawns both onto the current tokio runtime, and exposes the
//! narrow API the embedding application needs.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConfigFile, ConfigHandle};
use crate::events::{self, EventReceiver, EventSender};
use crate::localization::{Detection, LocalizedObject, TrackId};
use crate::localization::trajectory::TrajectoryPoint;
use crate::radio::{
    LinkStats, Priority, RadioDevice, RetryScheduler, SendReceipt, SharedLinkStats,
};

use super::daemon::{LocalizationDaemon, SharedObjects, SharedTrajectories};
use super::error::ServiceError;

/// Running perception-and-transport service.
///
/// Dropping the service does not stop its tasks; call
/// [`shutdown`](Self::shutdown) for an orderly stop.
pub struct AerolinkService {
    config: ConfigHandle,
    radio: crate::radio::RadioHandle,
    detections: mpsc::Sender<Detection>,
    link_stats: SharedLinkStats,
    objects: SharedObjects,
    trajectories: SharedTrajectories,
    events: Option<EventReceiver>,
    event_tx: EventSender,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AerolinkService {
    /// Wires and spawns the service over `device`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ConfigFile, device: Box<dyn RadioDevice>) -> Self {
        let config = ConfigHandle::new(config);
        let snapshot = config.snapshot();
        let (event_tx, event_rx) = events::channel();
        let shutdown = CancellationToken::new();

        let (scheduler, radio) = RetryScheduler::new(
            snapshot.radio.clone(),
            snapshot.channels.outbound_queue,
            device,
            event_tx.clone(),
        );
        let link_stats = scheduler.stats_handle();

        let (detection_tx, detection_rx) =
            mpsc::channel(snapshot.channels.detection_queue.max(1));
        let daemon = LocalizationDaemon::new(
            config.clone(),
            detection_rx,
            radio.clone(),
            event_tx.clone(),
        );
        let objects = daemon.objects_handle();
        let trajectories = daemon.trajectories_handle();

        let tasks = vec![
            tokio::spawn(scheduler.run(shutdown.clone())),
            tokio::spawn(daemon.run(shutdown.clone())),
        ];
        info!("aerolink service started");

        Self {
            config,
            radio,
            detections: detection_tx,
            link_stats,
            objects,
            trajectories,
            events: Some(event_rx),
            event_tx,
            shutdown,
            tasks,
        }
    }

    /// Handle to the active configuration; replacing it takes effect on
    /// each daemon's next cycle.
    pub fn config(&self) -> ConfigHandle {
        self.config.clone()
    }

    /// A clone of the event sender, for embedders that inject their own
    /// events into the same stream.
    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    /// Takes the telemetry event receiver. Returns `None` after the first
    /// call.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    /// Submits a payload for reliable delivery to the ground station.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::radio::SubmitError`] as a service error.
    pub fn send_message(
        &self,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<SendReceipt, ServiceError> {
        Ok(self.radio.submit(payload, priority)?)
    }

    /// Submits a detection for the next fusion cycle.
    ///
    /// # Errors
    ///
    /// Validation failures are rejected here, before queueing; a full
    /// channel returns [`ServiceError::DetectionQueueFull`].
    pub fn submit_detection(&self, detection: Detection) -> Result<(), ServiceError> {
        detection.validate()?;
        self.detections
            .try_send(detection)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ServiceError::DetectionQueueFull,
                mpsc::error::TrySendError::Closed(_) => ServiceError::NotRunning,
            })
    }

    /// Cancels every queued and in-flight outbound message.
    ///
    /// # Errors
    ///
    /// Fails if the scheduler is unreachable.
    pub fn cancel_outbound(&self) -> Result<(), ServiceError> {
        Ok(self.radio.cancel_all()?)
    }

    /// Latest live-object snapshot from the fusion engine.
    pub fn current_objects(&self) -> Vec<LocalizedObject> {
        match self.objects.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Movement history for one track, oldest first.
    pub fn history(&self, track_id: TrackId) -> Vec<TrajectoryPoint> {
        match self.trajectories.read() {
            Ok(guard) => guard.history(track_id),
            Err(poisoned) => poisoned.into_inner().history(track_id),
        }
    }

    /// Latest published link statistics.
    pub fn link_stats(&self) -> LinkStats {
        match self.link_stats.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stops both daemons and waits for them to exit.
    pub async fn shutdown(self) {
        info!("aerolink service shutting down");
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("aerolink service stopped");
    }
}

impl std::fmt::Debug for AerolinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AerolinkService")
            .field("events_taken", &self.events.is_none())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
