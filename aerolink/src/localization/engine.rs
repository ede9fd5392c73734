//! Detection fusion and track maintenance.
//!
//! The engine buffers validated detections between cycles. Each cycle it
//! drops detections older than the association window, associates the rest
//! to live tracks (same class, within the association distance) or clusters
//! them into candidate objects, fuses each group into a raw position, and
//! folds the result into the track state with exponential smoothing.
//!
//! Fusion prefers triangulation: when a group contains bearing rays from at
//! least two distinct sources, the estimate is the confidence-weighted mean
//! of the pairwise ray intersections. With a single source (or when all ray
//! pairs are near-parallel) it falls back to projecting each ray at the
//! configured assumed range.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::LocalizationSettings;
use crate::geo::{self, GeoPosition, LocalFrame};

use super::detection::{Detection, DetectionError};
use super::{LocalizedObject, TrackId};

/// Result of one fusion cycle.
#[derive(Debug, Default)]
pub struct CycleOutput {
    /// Tracks refreshed or created this cycle, in emission order.
    pub updates: Vec<LocalizedObject>,
    /// Tracks that aged out this cycle.
    pub evicted: Vec<TrackId>,
}

/// Internal mutable state of one live track.
#[derive(Debug)]
struct Track {
    id: TrackId,
    object_class: String,
    position: GeoPosition,
    confidence: f64,
    last_updated: DateTime<Utc>,
}

impl Track {
    fn snapshot(&self, now: DateTime<Utc>) -> LocalizedObject {
        let age = (now - self.last_updated).num_milliseconds() as f64 / 1000.0;
        LocalizedObject {
            track_id: self.id,
            object_class: self.object_class.clone(),
            position: self.position,
            confidence: self.confidence,
            last_updated: self.last_updated,
            age_secs: age.max(0.0),
        }
    }
}

/// A bearing ray extracted from one detection, in a shared local frame.
struct Ray<'a> {
    source_id: &'a str,
    origin: (f64, f64),
    bearing_deg: f64,
    confidence: f64,
    sensor_alt: f64,
}

/// Synchronous fusion core.
///
/// All time flows in through explicit `now` arguments, which keeps cycle
/// behavior deterministic under test. The service's localization daemon
/// drives it with `Utc::now()` on a timer.
#[derive(Debug)]
pub struct LocalizationEngine {
    settings: LocalizationSettings,
    pending: Vec<Detection>,
    tracks: Vec<Track>,
    next_track_id: u32,
}

impl LocalizationEngine {
    /// Creates an engine with no tracks.
    pub fn new(settings: LocalizationSettings) -> Self {
        Self {
            settings,
            pending: Vec::new(),
            tracks: Vec::new(),
            next_track_id: 1,
        }
    }

    /// Replaces the engine settings; takes effect from the next cycle.
    pub fn set_settings(&mut self, settings: LocalizationSettings) {
        self.settings = settings;
    }

    /// Validates and buffers a detection for the next cycle.
    ///
    /// # Errors
    ///
    /// Rejects detections that fail [`Detection::validate`]; invalid input
    /// never reaches the fusion path.
    pub fn ingest(&mut self, detection: Detection) -> Result<(), DetectionError> {
        detection.validate()?;
        self.pending.push(detection);
        Ok(())
    }

    /// Number of detections waiting for the next cycle.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Snapshots of all non-stale tracks as of `now`.
    pub fn current_objects(&self, now: DateTime<Utc>) -> Vec<LocalizedObject> {
        let max_age = self.settings.max_age();
        self.tracks
            .iter()
            .filter(|t| now - t.last_updated <= max_age)
            .map(|t| t.snapshot(now))
            .collect()
    }

    /// Runs one fusion cycle as of `now`.
    ///
    /// Buffered detections are consumed; tracks older than the age limit
    /// are evicted before association so stale tracks never absorb fresh
    /// detections.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutput {
        let mut output = CycleOutput::default();

        let max_age = self.settings.max_age();
        self.tracks.retain(|track| {
            if now - track.last_updated > max_age {
                info!(track_id = %track.id, class = %track.object_class, "track aged out");
                output.evicted.push(track.id);
                false
            } else {
                true
            }
        });

        let mut detections: Vec<Detection> = std::mem::take(&mut self.pending);
        detections.sort_by_key(|d| d.timestamp);

        let window = self.settings.association_window();
        let before = detections.len();
        detections.retain(|d| now - d.timestamp <= window);
        if detections.len() < before {
            debug!(
                dropped = before - detections.len(),
                "discarded detections outside association window"
            );
        }
        if detections.is_empty() {
            return output;
        }

        let (track_buckets, clusters) = self.associate(detections);

        for (track_id, group) in track_buckets {
            let Some((raw_position, raw_confidence)) = self.fuse(&group) else {
                continue;
            };
            if raw_confidence < self.settings.min_confidence {
                debug!(
                    track_id = %track_id,
                    confidence = raw_confidence,
                    "estimate below confidence floor"
                );
                continue;
            }
            if let Some(track) = self.tracks.iter_mut().find(|t| t.id == track_id) {
                let alpha = self.settings.position_smoothing;
                track.position = GeoPosition {
                    lat: alpha * raw_position.lat + (1.0 - alpha) * track.position.lat,
                    lon: alpha * raw_position.lon + (1.0 - alpha) * track.position.lon,
                    alt: alpha * raw_position.alt + (1.0 - alpha) * track.position.alt,
                };
                let dt = ((now - track.last_updated).num_milliseconds() as f64 / 1000.0).max(0.0);
                let decayed = track.confidence * (-dt / self.settings.max_age_secs).exp();
                track.confidence = raw_confidence.max(decayed).min(1.0);
                track.last_updated = now;
                output.updates.push(track.snapshot(now));
            }
        }

        for group in clusters {
            if group.len() < self.settings.min_detections {
                debug!(
                    class = %group[0].object_class,
                    detections = group.len(),
                    "candidate below detection floor"
                );
                continue;
            }
            let Some((position, confidence)) = self.fuse(&group) else {
                continue;
            };
            if confidence < self.settings.min_confidence {
                debug!(
                    class = %group[0].object_class,
                    confidence,
                    "candidate below confidence floor"
                );
                continue;
            }
            let track = Track {
                id: TrackId(self.next_track_id),
                object_class: group[0].object_class.clone(),
                position,
                confidence,
                last_updated: now,
            };
            self.next_track_id += 1;
            info!(
                track_id = %track.id,
                class = %track.object_class,
                confidence,
                "new track"
            );
            output.updates.push(track.snapshot(now));
            self.tracks.push(track);
        }

        output
    }

    /// Splits detections into per-track groups and new-object clusters.
    ///
    /// Processing follows timestamp order (the caller sorts), so an earlier
    /// detection seeds the cluster a later one joins.
    fn associate(
        &self,
        detections: Vec<Detection>,
    ) -> (HashMap<TrackId, Vec<Detection>>, Vec<Vec<Detection>>) {
        let mut track_buckets: HashMap<TrackId, Vec<Detection>> = HashMap::new();
        let mut clusters: Vec<(GeoPosition, Vec<Detection>)> = Vec::new();

        for detection in detections {
            let provisional = self.provisional_position(&detection);

            let nearest = self
                .tracks
                .iter()
                .filter(|t| t.object_class == detection.object_class)
                .map(|t| (t.id, geo::distance_m(&t.position, &provisional)))
                .filter(|(_, d)| *d <= self.settings.max_association_distance_m)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((track_id, _)) = nearest {
                track_buckets.entry(track_id).or_default().push(detection);
                continue;
            }

            let cluster = clusters.iter_mut().find(|(seed, members)| {
                members[0].object_class == detection.object_class
                    && geo::distance_m(seed, &provisional)
                        <= self.settings.max_association_distance_m
            });
            match cluster {
                Some((_, members)) => members.push(detection),
                None => clusters.push((provisional, vec![detection])),
            }
        }

        (
            track_buckets,
            clusters.into_iter().map(|(_, members)| members).collect(),
        )
    }

    /// Where a lone detection would place the object: its bearing ray
    /// projected at the assumed range.
    fn provisional_position(&self, detection: &Detection) -> GeoPosition {
        let frame = LocalFrame::new(detection.pose.position);
        let (east, north) = geo::project_bearing(
            (0.0, 0.0),
            detection.bearing_deg(),
            self.settings.assumed_range_m,
        );
        frame.to_geo(east, north, detection.pose.position.alt)
    }

    /// Fuses a group of detections into a raw position and confidence.
    ///
    /// Returns `None` only for an empty group.
    fn fuse(&self, group: &[Detection]) -> Option<(GeoPosition, f64)> {
        let first = group.first()?;
        let frame = LocalFrame::new(first.pose.position);

        let rays: Vec<Ray<'_>> = group
            .iter()
            .map(|d| Ray {
                source_id: &d.source_id,
                origin: frame.to_local(&d.pose.position),
                bearing_deg: d.bearing_deg(),
                confidence: d.confidence,
                sensor_alt: d.pose.position.alt,
            })
            .collect();

        let distinct_sources: HashSet<&str> = rays.iter().map(|r| r.source_id).collect();

        let mut east = 0.0;
        let mut north = 0.0;
        let mut weight = 0.0;

        if distinct_sources.len() >= 2 {
            for (i, a) in rays.iter().enumerate() {
                for b in rays.iter().skip(i + 1) {
                    if a.source_id == b.source_id {
                        continue;
                    }
                    if let Some((e, n)) = geo::intersect_bearings(
                        a.origin,
                        a.bearing_deg,
                        b.origin,
                        b.bearing_deg,
                    ) {
                        let w = (a.confidence + b.confidence) / 2.0;
                        east += w * e;
                        north += w * n;
                        weight += w;
                    }
                }
            }
        }

        // Single source, or every cross-source pair was near-parallel:
        // average the fixed-range projections instead.
        if weight <= f64::EPSILON {
            east = 0.0;
            north = 0.0;
            weight = 0.0;
            for ray in &rays {
                let (e, n) =
                    geo::project_bearing(ray.origin, ray.bearing_deg, self.settings.assumed_range_m);
                let w = ray.confidence.max(f64::EPSILON);
                east += w * e;
                north += w * n;
                weight += w;
            }
        }

        east /= weight;
        north /= weight;

        let conf_sum: f64 = rays.iter().map(|r| r.confidence).sum();
        let confidence = conf_sum / rays.len() as f64;

        let alt = if conf_sum > 0.0 {
            rays.iter().map(|r| r.confidence * r.sensor_alt).sum::<f64>() / conf_sum
        } else {
            rays.iter().map(|r| r.sensor_alt).sum::<f64>() / rays.len() as f64
        };

        Some((frame.to_geo(east, north, alt), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::{Observation, SensorPose};
    use chrono::Duration;

    fn settings() -> LocalizationSettings {
        LocalizationSettings::default()
    }

    fn anchor() -> GeoPosition {
        GeoPosition::new(43.6, 1.44, 120.0).unwrap()
    }

    fn detection(
        source_id: &str,
        timestamp: DateTime<Utc>,
        confidence: f64,
        position: GeoPosition,
        bearing_deg: f64,
    ) -> Detection {
        Detection {
            source_id: source_id.to_string(),
            timestamp,
            object_class: "person".to_string(),
            confidence,
            observation: Observation::Bearing { bearing_deg },
            pose: SensorPose {
                position,
                heading_deg: bearing_deg,
                fov_deg: 60.0,
            },
        }
    }

    #[test]
    fn test_two_source_triangulation() {
        let mut engine = LocalizationEngine::new(settings());
        let now = Utc::now();
        let frame = LocalFrame::new(anchor());

        // Sensor A at the anchor, sensor B 100m east, both sighting a
        // target at local (50, 300). The rays intersect exactly there.
        let sensor_b = frame.to_geo(100.0, 0.0, 120.0);
        let bearing_a = 50.0f64.atan2(300.0).to_degrees();
        let bearing_b = (-50.0f64).atan2(300.0).to_degrees();
        engine
            .ingest(detection("drone-1", now, 0.9, anchor(), bearing_a))
            .unwrap();
        engine
            .ingest(detection("drone-2", now, 0.8, sensor_b, bearing_b))
            .unwrap();

        let output = engine.run_cycle(now);
        assert_eq!(output.updates.len(), 1);

        let object = &output.updates[0];
        let expected = frame.to_geo(50.0, 300.0, 120.0);
        assert!(geo::distance_m(&object.position, &expected) < 2.0);
        assert!((object.confidence - 0.85).abs() < 1e-9);
        assert_eq!(object.object_class, "person");
    }

    #[test]
    fn test_single_detection_below_floor() {
        let mut engine = LocalizationEngine::new(settings());
        let now = Utc::now();

        engine
            .ingest(detection("drone-1", now, 0.9, anchor(), 0.0))
            .unwrap();

        let output = engine.run_cycle(now);
        assert!(output.updates.is_empty());
        assert_eq!(engine.track_count(), 0);
    }

    #[test]
    fn test_low_confidence_rejected() {
        let mut engine = LocalizationEngine::new(settings());
        let now = Utc::now();
        let frame = LocalFrame::new(anchor());
        let sensor_b = frame.to_geo(100.0, 0.0, 120.0);

        // Same geometry as the triangulation test, but the rays carry too
        // little confidence between them.
        let bearing_a = 50.0f64.atan2(300.0).to_degrees();
        let bearing_b = (-50.0f64).atan2(300.0).to_degrees();
        engine
            .ingest(detection("drone-1", now, 0.3, anchor(), bearing_a))
            .unwrap();
        engine
            .ingest(detection("drone-2", now, 0.4, sensor_b, bearing_b))
            .unwrap();

        let output = engine.run_cycle(now);
        assert!(output.updates.is_empty());
        assert_eq!(engine.track_count(), 0);
    }

    #[test]
    fn test_stale_detection_ignored() {
        let mut config = settings();
        config.min_detections = 1;
        let mut engine = LocalizationEngine::new(config);
        let now = Utc::now();

        engine
            .ingest(detection(
                "drone-1",
                now - Duration::seconds(10),
                0.9,
                anchor(),
                0.0,
            ))
            .unwrap();

        let output = engine.run_cycle(now);
        assert!(output.updates.is_empty());
    }

    #[test]
    fn test_smoothing_blends_toward_raw() {
        let mut config = settings();
        config.min_detections = 1;
        let alpha = config.position_smoothing;
        let assumed_range = config.assumed_range_m;
        let mut engine = LocalizationEngine::new(config);
        let t0 = Utc::now();
        let frame = LocalFrame::new(anchor());

        engine
            .ingest(detection("drone-1", t0, 0.9, anchor(), 0.0))
            .unwrap();
        let first = engine.run_cycle(t0);
        let prev = first.updates[0].position;

        // Second sighting 10° off the first: close enough to associate,
        // far enough that smoothing is visible.
        let t1 = t0 + Duration::seconds(1);
        engine
            .ingest(detection("drone-1", t1, 0.9, anchor(), 10.0))
            .unwrap();
        let second = engine.run_cycle(t1);
        assert_eq!(second.updates.len(), 1);
        assert_eq!(second.updates[0].track_id, first.updates[0].track_id);

        let (east, north) = geo::project_bearing((0.0, 0.0), 10.0, assumed_range);
        let raw = frame.to_geo(east, north, 120.0);
        let smoothed = second.updates[0].position;
        assert!((smoothed.lat - (alpha * raw.lat + (1.0 - alpha) * prev.lat)).abs() < 1e-9);
        assert!((smoothed.lon - (alpha * raw.lon + (1.0 - alpha) * prev.lon)).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_decays_between_updates() {
        let mut config = settings();
        config.min_detections = 1;
        let mut engine = LocalizationEngine::new(config);
        let t0 = Utc::now();

        engine
            .ingest(detection("drone-1", t0, 0.9, anchor(), 0.0))
            .unwrap();
        engine.run_cycle(t0);

        // A weaker raw estimate 3 seconds later: the decayed previous
        // confidence (0.9 * e^-0.1) still wins.
        let t1 = t0 + Duration::seconds(3);
        engine
            .ingest(detection("drone-1", t1, 0.5, anchor(), 0.0))
            .unwrap();
        let output = engine.run_cycle(t1);

        let expected = 0.9 * (-3.0f64 / 30.0).exp();
        assert!((output.updates[0].confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn test_track_eviction() {
        let mut config = settings();
        config.min_detections = 1;
        let mut engine = LocalizationEngine::new(config);
        let t0 = Utc::now();

        engine
            .ingest(detection("drone-1", t0, 0.9, anchor(), 0.0))
            .unwrap();
        let first = engine.run_cycle(t0);
        let id = first.updates[0].track_id;

        let later = t0 + Duration::seconds(40);
        assert!(engine.current_objects(later).is_empty());

        let output = engine.run_cycle(later);
        assert_eq!(output.evicted, vec![id]);
        assert_eq!(engine.track_count(), 0);
    }

    #[test]
    fn test_classes_never_merge() {
        let mut engine = LocalizationEngine::new(settings());
        let now = Utc::now();
        let frame = LocalFrame::new(anchor());
        let sensor_b = frame.to_geo(100.0, 0.0, 120.0);

        // Rays point at the same spot but carry different class labels.
        let bearing_a = 50.0f64.atan2(300.0).to_degrees();
        let bearing_b = (-50.0f64).atan2(300.0).to_degrees();
        let mut vehicle = detection("drone-2", now, 0.9, sensor_b, bearing_b);
        vehicle.object_class = "vehicle".to_string();

        engine
            .ingest(detection("drone-1", now, 0.9, anchor(), bearing_a))
            .unwrap();
        engine.ingest(vehicle).unwrap();

        // One person ray and one vehicle ray: neither group reaches the
        // two-detection floor.
        let output = engine.run_cycle(now);
        assert!(output.updates.is_empty());
    }

    #[test]
    fn test_single_source_never_triangulates_with_itself() {
        let mut config = settings();
        config.min_detections = 2;
        let assumed_range = config.assumed_range_m;
        let mut engine = LocalizationEngine::new(config);
        let now = Utc::now();
        let frame = LocalFrame::new(anchor());

        // Same source twice with crossing bearings: must fall back to
        // fixed-range projection, not intersect its own rays.
        engine
            .ingest(detection("drone-1", now, 0.9, anchor(), 10.0))
            .unwrap();
        engine
            .ingest(detection(
                "drone-1",
                now,
                0.9,
                frame.to_geo(100.0, 0.0, 120.0),
                350.0,
            ))
            .unwrap();

        let output = engine.run_cycle(now);
        assert_eq!(output.updates.len(), 1);

        let (e1, n1) = geo::project_bearing((0.0, 0.0), 10.0, assumed_range);
        let (e2, n2) = geo::project_bearing((100.0, 0.0), 350.0, assumed_range);
        let expected = frame.to_geo((e1 + e2) / 2.0, (n1 + n2) / 2.0, 120.0);
        assert!(geo::distance_m(&output.updates[0].position, &expected) < 2.0);
    }

    #[test]
    fn test_invalid_detection_rejected_at_ingest() {
        let mut engine = LocalizationEngine::new(settings());
        let mut det = detection("drone-1", Utc::now(), 0.9, anchor(), 0.0);
        det.confidence = 1.5;

        assert!(engine.ingest(det).is_err());
        assert_eq!(engine.pending_len(), 0);
    }
}
