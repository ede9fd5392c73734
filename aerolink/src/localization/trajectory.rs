//! Movement history for tracked objects.
//!
//! The store keeps a time-ordered deque of position snapshots per track.
//! Entries age out of the front as they pass the configured age limit, and
//! a track whose history empties is removed entirely, so memory stays
//! bounded by the number of live tracks and the age limit.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use super::{LocalizedObject, TrackId};

/// One recorded point on a track's trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    /// When the snapshot was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The object state at that time.
    pub object: LocalizedObject,
}

/// Per-track history of position snapshots.
#[derive(Debug, Default)]
pub struct TrajectoryStore {
    tracks: HashMap<TrackId, VecDeque<TrajectoryPoint>>,
}

impl TrajectoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot to its track's history.
    ///
    /// Snapshots arrive in emission order from the fusion cycle, so the
    /// deque stays time-sorted without searching.
    pub fn record(&mut self, recorded_at: DateTime<Utc>, object: LocalizedObject) {
        self.tracks
            .entry(object.track_id)
            .or_default()
            .push_back(TrajectoryPoint {
                recorded_at,
                object,
            });
    }

    /// Returns a track's history, oldest first. Empty if unknown.
    pub fn history(&self, track_id: TrackId) -> Vec<TrajectoryPoint> {
        self.tracks
            .get(&track_id)
            .map(|points| points.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tracks with recorded history.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Total snapshots across all tracks.
    pub fn point_count(&self) -> usize {
        self.tracks.values().map(VecDeque::len).sum()
    }

    /// Drops snapshots older than `max_age` and removes emptied tracks.
    ///
    /// Returns the ids of tracks removed entirely.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> Vec<TrackId> {
        let cutoff = now - max_age;
        for points in self.tracks.values_mut() {
            while let Some(front) = points.front() {
                if front.recorded_at < cutoff {
                    points.pop_front();
                } else {
                    break;
                }
            }
        }

        let emptied: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, points)| points.is_empty())
            .map(|(id, _)| *id)
            .collect();
        for id in &emptied {
            self.tracks.remove(id);
        }
        emptied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPosition;

    fn object(track_id: u32, lat: f64) -> LocalizedObject {
        LocalizedObject {
            track_id: TrackId(track_id),
            object_class: "vehicle".to_string(),
            position: GeoPosition::new(lat, 1.44, 0.0).unwrap(),
            confidence: 0.8,
            last_updated: Utc::now(),
            age_secs: 0.0,
        }
    }

    #[test]
    fn test_history_is_oldest_first() {
        let mut store = TrajectoryStore::new();
        let t0 = Utc::now();

        store.record(t0, object(1, 43.600));
        store.record(t0 + Duration::seconds(1), object(1, 43.601));
        store.record(t0 + Duration::seconds(2), object(1, 43.602));

        let history = store.history(TrackId(1));
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].object.position.lat, 43.600);
        assert_eq!(history[2].object.position.lat, 43.602);
    }

    #[test]
    fn test_unknown_track_has_empty_history() {
        let store = TrajectoryStore::new();
        assert!(store.history(TrackId(9)).is_empty());
    }

    #[test]
    fn test_tracks_are_independent() {
        let mut store = TrajectoryStore::new();
        let t0 = Utc::now();

        store.record(t0, object(1, 43.600));
        store.record(t0, object(2, 43.700));

        assert_eq!(store.track_count(), 2);
        assert_eq!(store.history(TrackId(1)).len(), 1);
        assert_eq!(store.history(TrackId(2)).len(), 1);
    }

    #[test]
    fn test_evict_drops_old_points() {
        let mut store = TrajectoryStore::new();
        let t0 = Utc::now();

        store.record(t0, object(1, 43.600));
        store.record(t0 + Duration::seconds(25), object(1, 43.601));

        let removed = store.evict_stale(t0 + Duration::seconds(40), Duration::seconds(30));
        assert!(removed.is_empty());

        let history = store.history(TrackId(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].object.position.lat, 43.601);
    }

    #[test]
    fn test_evict_removes_emptied_track() {
        let mut store = TrajectoryStore::new();
        let t0 = Utc::now();

        store.record(t0, object(1, 43.600));
        store.record(t0 + Duration::seconds(50), object(2, 43.700));

        let removed = store.evict_stale(t0 + Duration::seconds(60), Duration::seconds(30));
        assert_eq!(removed, vec![TrackId(1)]);
        assert_eq!(store.track_count(), 1);
        assert!(store.history(TrackId(1)).is_empty());
        assert_eq!(store.history(TrackId(2)).len(), 1);
    }
}
