//! Geographic coordinate types and local-plane geometry.
//!
//! Localization works on a local tangent plane anchored at a reference
//! position: detections are reduced to bearing rays in east/north meters,
//! intersected, and the result is converted back to latitude/longitude.
//! The equirectangular approximation used here is accurate to well under a
//! meter at the ranges a drone camera covers (a few kilometers).

mod types;

pub use types::{GeoError, GeoPosition, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Minimum sine of the angle between two bearing rays for their
/// intersection to be considered well-conditioned. Below this the rays are
/// close to parallel and the intersection point is numerically meaningless.
const MIN_RAY_CROSS: f64 = 1e-3;

/// A local east/north tangent plane anchored at a reference position.
///
/// All conversions are relative to the anchor; positions more than a few
/// tens of kilometers away lose accuracy and should use a re-anchored frame.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: GeoPosition,
    meters_per_deg_lat: f64,
    meters_per_deg_lon: f64,
}

impl LocalFrame {
    /// Creates a tangent plane anchored at `origin`.
    pub fn new(origin: GeoPosition) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let meters_per_deg_lon = meters_per_deg_lat * origin.lat.to_radians().cos();
        Self {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lon,
        }
    }

    /// Converts a position to (east, north) meters relative to the anchor.
    pub fn to_local(&self, pos: &GeoPosition) -> (f64, f64) {
        let east = (pos.lon - self.origin.lon) * self.meters_per_deg_lon;
        let north = (pos.lat - self.origin.lat) * self.meters_per_deg_lat;
        (east, north)
    }

    /// Converts (east, north) meters back to a geographic position.
    pub fn to_geo(&self, east: f64, north: f64, alt: f64) -> GeoPosition {
        GeoPosition {
            lat: self.origin.lat + north / self.meters_per_deg_lat,
            lon: self.origin.lon + east / self.meters_per_deg_lon,
            alt,
        }
    }
}

/// Great-circle distance between two positions in meters (haversine).
///
/// Altitude is ignored; at drone-camera ranges the horizontal component
/// dominates and this is what track association cares about.
pub fn distance_m(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Unit direction vector (east, north) for a compass bearing.
///
/// Bearings are degrees clockwise from true north.
pub fn bearing_direction(bearing_deg: f64) -> (f64, f64) {
    let rad = bearing_deg.to_radians();
    (rad.sin(), rad.cos())
}

/// Intersects two bearing rays on the local plane.
///
/// Each ray starts at `origin` (east, north meters) and extends along its
/// compass bearing. Returns the intersection point, or `None` when the rays
/// are near-parallel or the intersection lies behind either sensor.
pub fn intersect_bearings(
    origin_a: (f64, f64),
    bearing_a_deg: f64,
    origin_b: (f64, f64),
    bearing_b_deg: f64,
) -> Option<(f64, f64)> {
    let da = bearing_direction(bearing_a_deg);
    let db = bearing_direction(bearing_b_deg);

    // Cross product of unit directions = sine of the angle between rays.
    let cross = da.0 * db.1 - da.1 * db.0;
    if cross.abs() < MIN_RAY_CROSS {
        return None;
    }

    let dx = origin_b.0 - origin_a.0;
    let dy = origin_b.1 - origin_a.1;

    let ta = (dx * db.1 - dy * db.0) / cross;
    let tb = (dx * da.1 - dy * da.0) / cross;

    // Both parameters must be positive: targets sit in front of the camera.
    if ta <= 0.0 || tb <= 0.0 {
        return None;
    }

    Some((origin_a.0 + ta * da.0, origin_a.1 + ta * da.1))
}

/// Projects a point `range_m` meters along a bearing from `origin`.
pub fn project_bearing(origin: (f64, f64), bearing_deg: f64, range_m: f64) -> (f64, f64) {
    let d = bearing_direction(bearing_deg);
    (origin.0 + range_m * d.0, origin.1 + range_m * d.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> GeoPosition {
        GeoPosition::new(43.6, 1.44, 0.0).unwrap()
    }

    #[test]
    fn test_local_frame_round_trip() {
        let frame = LocalFrame::new(anchor());
        let pos = GeoPosition::new(43.605, 1.447, 50.0).unwrap();

        let (east, north) = frame.to_local(&pos);
        let back = frame.to_geo(east, north, 50.0);

        assert!((back.lat - pos.lat).abs() < 1e-9);
        assert!((back.lon - pos.lon).abs() < 1e-9);
        assert_eq!(back.alt, 50.0);
    }

    #[test]
    fn test_local_frame_north_is_north() {
        let frame = LocalFrame::new(anchor());
        // 0.001 degrees of latitude is about 111 meters.
        let north_of = GeoPosition::new(43.601, 1.44, 0.0).unwrap();
        let (east, north) = frame.to_local(&north_of);

        assert!(east.abs() < 1e-6);
        assert!((north - 111.19).abs() < 0.5);
    }

    #[test]
    fn test_distance_haversine() {
        let a = anchor();
        let b = GeoPosition::new(43.601, 1.44, 0.0).unwrap();
        let d = distance_m(&a, &b);
        assert!((d - 111.19).abs() < 0.5);

        assert!(distance_m(&a, &a) < 1e-9);
    }

    #[test]
    fn test_bearing_direction_cardinal() {
        let (e, n) = bearing_direction(0.0);
        assert!(e.abs() < 1e-12 && (n - 1.0).abs() < 1e-12);

        let (e, n) = bearing_direction(90.0);
        assert!((e - 1.0).abs() < 1e-12 && n.abs() < 1e-12);

        let (e, n) = bearing_direction(180.0);
        assert!(e.abs() < 1e-9 && (n + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_intersect_bearings_known_point() {
        // Sensor A at origin looking north-east (45°), sensor B 100m east
        // looking north-west (315°). Rays meet at (50, 50).
        let hit = intersect_bearings((0.0, 0.0), 45.0, (100.0, 0.0), 315.0).unwrap();
        assert!((hit.0 - 50.0).abs() < 1e-6);
        assert!((hit.1 - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_intersect_bearings_parallel() {
        assert!(intersect_bearings((0.0, 0.0), 10.0, (100.0, 0.0), 10.0).is_none());
    }

    #[test]
    fn test_intersect_bearings_behind_sensor() {
        // Sensor B looks east, but the only crossing with A's ray is 100m
        // behind it.
        assert!(intersect_bearings((0.0, 0.0), 0.0, (100.0, 50.0), 90.0).is_none());
    }

    #[test]
    fn test_project_bearing() {
        let p = project_bearing((10.0, 20.0), 90.0, 5.0);
        assert!((p.0 - 15.0).abs() < 1e-9);
        assert!((p.1 - 20.0).abs() < 1e-9);
    }
}
