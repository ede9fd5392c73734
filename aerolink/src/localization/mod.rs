//! Object localization: detection fusion, tracking, and trajectory history.
//!
//! The engine consumes [`Detection`] records from any number of sources,
//! reduces them to bearing rays, fuses corroborating rays into position
//! estimates, and maintains smoothed [`LocalizedObject`] tracks plus their
//! movement history. The core is synchronous and clock-driven through
//! explicit `DateTime<Utc>` arguments; the service wraps it in a daemon
//! that runs fusion cycles on a timer.

pub mod detection;
pub mod engine;
pub mod trajectory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use detection::{Detection, DetectionError, Observation, SensorPose};
pub use engine::{CycleOutput, LocalizationEngine};
pub use trajectory::TrajectoryStore;

use crate::geo::GeoPosition;

/// Unique identifier for a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

/// A tracked object's state at one point in time.
///
/// This is the unit the engine emits, the trajectory store records, and
/// the radio transmits (as JSON) to the ground station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedObject {
    /// Stable identity across updates of the same physical object.
    pub track_id: TrackId,
    /// Class label carried over from the detections.
    pub object_class: String,
    /// Smoothed position estimate.
    pub position: GeoPosition,
    /// Estimate confidence in `[0, 1]`.
    pub confidence: f64,
    /// When the estimate was last refreshed.
    pub last_updated: DateTime<Utc>,
    /// Seconds since the last refresh, as of snapshot time.
    pub age_secs: f64,
}
