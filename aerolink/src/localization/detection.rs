//! Detection records submitted by the vision pipeline.
//!
//! The core never runs inference; detections arrive from outside already
//! scored and classed. Each one carries the observing sensor's pose so the
//! engine can turn it into a bearing ray without a registry lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPosition;

/// Pose of the observing sensor at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorPose {
    /// Sensor position (typically the drone's GPS fix).
    pub position: GeoPosition,
    /// Compass heading of the camera boresight, degrees clockwise from
    /// true north.
    pub heading_deg: f64,
    /// Horizontal field of view in degrees.
    pub fov_deg: f64,
}

/// Spatial observation attached to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// A bearing to the object, degrees clockwise from true north.
    Bearing {
        /// Absolute compass bearing.
        bearing_deg: f64,
    },
    /// A bounding box in normalized image coordinates `[x1, y1, x2, y2]`,
    /// each in `[0, 1]` with x growing rightward.
    BoundingBox {
        /// Normalized box corners.
        bbox: [f64; 4],
    },
}

/// One sighting from one source. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Identity of the producing sensor ("drone-1/cam0", "tower-3", ...).
    pub source_id: String,
    /// When the frame was captured.
    pub timestamp: DateTime<Utc>,
    /// Class label from the detector ("person", "vehicle", ...).
    pub object_class: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Spatial observation from this source's viewpoint.
    pub observation: Observation,
    /// Sensor pose at capture time.
    pub pose: SensorPose,
}

/// Errors validating a detection at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// Confidence outside `[0, 1]` or not finite.
    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    /// Bounding box coordinates outside `[0, 1]` or inverted.
    #[error("malformed bounding box {0:?}")]
    InvalidBoundingBox([f64; 4]),
}

impl Detection {
    /// Validates a detection.
    ///
    /// # Errors
    ///
    /// Rejects out-of-range confidence and malformed bounding boxes.
    /// Bearing observations are normalized into `[0, 360)` by the caller
    /// of [`bearing_deg`](Self::bearing_deg), so any finite value passes.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(DetectionError::InvalidConfidence(self.confidence));
        }
        if let Observation::BoundingBox { bbox } = self.observation {
            let ok = bbox.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v))
                && bbox[0] <= bbox[2]
                && bbox[1] <= bbox[3];
            if !ok {
                return Err(DetectionError::InvalidBoundingBox(bbox));
            }
        }
        Ok(())
    }

    /// Absolute compass bearing to the object, degrees in `[0, 360)`.
    ///
    /// Bounding boxes convert through the horizontal camera model: the box
    /// center's offset from the image center, scaled by the field of view,
    /// added to the camera heading.
    pub fn bearing_deg(&self) -> f64 {
        let raw = match self.observation {
            Observation::Bearing { bearing_deg } => bearing_deg,
            Observation::BoundingBox { bbox } => {
                let center_x = (bbox[0] + bbox[2]) / 2.0;
                self.pose.heading_deg + (center_x - 0.5) * self.pose.fov_deg
            }
        };
        raw.rem_euclid(360.0)
    }
}
