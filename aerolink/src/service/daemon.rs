//! Localization daemon.
//!
//! Runs the synchronous fusion engine as an independent async task:
//!
//! 1. Receives detections from the bounded ingestion channel
//! 2. Runs a fusion cycle on a timer
//! 3. Records updates into the trajectory store and publishes a snapshot
//!    of live objects for readers
//! 4. Transmits each update to the ground station through the radio handle
//!
//! The daemon owns the engine and is its only writer. Readers see the
//! state it publishes through shared handles, so queries never block a
//! fusion cycle.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::events::{EventSender, TelemetryEvent};
use crate::localization::{
    Detection, LocalizationEngine, LocalizedObject, TrajectoryStore,
};
use crate::radio::{Priority, RadioHandle, SubmitError};

/// Shared handle to the latest live-object snapshot.
pub type SharedObjects = Arc<RwLock<Vec<LocalizedObject>>>;

/// Shared handle to the trajectory store.
pub type SharedTrajectories = Arc<RwLock<TrajectoryStore>>;

/// Compact object report transmitted over the radio.
///
/// Field names are shortened to keep the JSON well inside the
/// single-frame payload limit.
#[derive(Debug, Serialize)]
struct ObjectReport<'a> {
    #[serde(rename = "t")]
    track_id: u32,
    #[serde(rename = "c")]
    object_class: &'a str,
    lat: f64,
    lon: f64,
    alt: f64,
    conf: f64,
}

impl<'a> From<&'a LocalizedObject> for ObjectReport<'a> {
    fn from(object: &'a LocalizedObject) -> Self {
        Self {
            track_id: object.track_id.0,
            object_class: &object.object_class,
            lat: object.position.lat,
            lon: object.position.lon,
            alt: object.position.alt,
            conf: object.confidence,
        }
    }
}

/// Async wrapper around the fusion engine.
pub struct LocalizationDaemon {
    config: ConfigHandle,
    engine: LocalizationEngine,
    detections: mpsc::Receiver<Detection>,
    radio: RadioHandle,
    events: EventSender,
    objects: SharedObjects,
    trajectories: SharedTrajectories,
}

impl LocalizationDaemon {
    /// Creates a daemon reading detections from `detections`.
    pub fn new(
        config: ConfigHandle,
        detections: mpsc::Receiver<Detection>,
        radio: RadioHandle,
        events: EventSender,
    ) -> Self {
        let engine = LocalizationEngine::new(config.snapshot().localization.clone());
        Self {
            config,
            engine,
            detections,
            radio,
            events,
            objects: SharedObjects::default(),
            trajectories: SharedTrajectories::default(),
        }
    }

    /// Shared handle to the live-object snapshot.
    pub fn objects_handle(&self) -> SharedObjects {
        Arc::clone(&self.objects)
    }

    /// Shared handle to the trajectory store.
    pub fn trajectories_handle(&self) -> SharedTrajectories {
        Arc::clone(&self.trajectories)
    }

    /// Runs the daemon until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("localization daemon started");

        let mut ticker = tokio::time::interval(self.config.snapshot().localization.fusion_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(detection) = self.detections.recv() => {
                    if let Err(err) = self.engine.ingest(detection) {
                        warn!(error = %err, "detection rejected");
                    }
                }

                _ = ticker.tick() => {
                    self.cycle();
                }
            }
        }

        info!("localization daemon stopped");
    }

    fn cycle(&mut self) {
        let settings = self.config.snapshot().localization.clone();
        self.engine.set_settings(settings.clone());

        let now = Utc::now();
        let output = self.engine.run_cycle(now);

        if !output.updates.is_empty() || !output.evicted.is_empty() {
            debug!(
                updates = output.updates.len(),
                evicted = output.evicted.len(),
                tracks = self.engine.track_count(),
                "fusion cycle complete"
            );
        }

        {
            let mut store = match self.trajectories.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for object in &output.updates {
                store.record(now, object.clone());
            }
            store.evict_stale(now, settings.max_age());
        }

        for object in &output.updates {
            self.transmit_report(object);
            let _ = self.events.send(TelemetryEvent::ObjectLocalized {
                object: object.clone(),
            });
        }
        for track_id in output.evicted {
            let _ = self.events.send(TelemetryEvent::TrackEvicted { track_id });
        }

        let snapshot = self.engine.current_objects(now);
        match self.objects.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Fire-and-forget transmission of one object report. The scheduler
    /// owns retries; the outcome surfaces as a telemetry event.
    fn transmit_report(&self, object: &LocalizedObject) {
        let report = ObjectReport::from(object);
        let payload = match serde_json::to_vec(&report) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize object report");
                return;
            }
        };
        match self.radio.submit(payload, Priority::Normal) {
            Ok(_receipt) => {}
            Err(SubmitError::QueueFull) => {
                // The link is saturated; the next cycle sends a fresher
                // estimate anyway.
                warn!(track_id = %object.track_id, "radio queue full, report dropped");
            }
            Err(err) => warn!(error = %err, "object report not submitted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::TrackId;
    use crate::geo::GeoPosition;

    #[test]
    fn test_object_report_is_compact() {
        let object = LocalizedObject {
            track_id: TrackId(12),
            object_class: "vehicle".to_string(),
            position: GeoPosition::new(43.60412345678, 1.44056789012, 123.456).unwrap(),
            confidence: 0.8765432,
            last_updated: Utc::now(),
            age_secs: 0.0,
        };
        let payload = serde_json::to_vec(&ObjectReport::from(&object)).unwrap();
        assert!(payload.len() <= crate::radio::MAX_PAYLOAD_LEN);

        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["t"], 12);
        assert_eq!(value["c"], "vehicle");
    }
}
