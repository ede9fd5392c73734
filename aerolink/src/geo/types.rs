//! Geographic position types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Valid latitude range (WGS84 decimal degrees).
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range.
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A geographic position: latitude, longitude, altitude.
///
/// Latitude and longitude are WGS84 decimal degrees; altitude is meters
/// above mean sea level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
    /// Altitude in meters above MSL.
    pub alt: f64,
}

impl GeoPosition {
    /// Creates a validated position.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if latitude or longitude are outside their
    /// valid ranges, or any component is not finite.
    pub fn new(lat: f64, lon: f64, alt: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(MIN_LON..=MAX_LON).contains(&lon) {
            return Err(GeoError::InvalidLongitude(lon));
        }
        if !alt.is_finite() {
            return Err(GeoError::InvalidAltitude(alt));
        }
        Ok(Self { lat, lon, alt })
    }
}

impl std::fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}, {:.1}m)",
            self.lat, self.lon, self.alt
        )
    }
}

/// Errors from coordinate validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude is outside the valid range or not finite.
    #[error("invalid latitude: {0} (must be between {MIN_LAT} and {MAX_LAT})")]
    InvalidLatitude(f64),

    /// Longitude is outside the valid range or not finite.
    #[error("invalid longitude: {0} (must be between {MIN_LON} and {MAX_LON})")]
    InvalidLongitude(f64),

    /// Altitude is not a finite number.
    #[error("invalid altitude: {0}")]
    InvalidAltitude(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_position() {
        let pos = GeoPosition::new(43.6, 1.44, 120.0).unwrap();
        assert_eq!(pos.lat, 43.6);
        assert_eq!(pos.lon, 1.44);
        assert_eq!(pos.alt, 120.0);
    }

    #[test]
    fn test_invalid_latitude() {
        assert_eq!(
            GeoPosition::new(91.0, 0.0, 0.0),
            Err(GeoError::InvalidLatitude(91.0))
        );
        assert!(GeoPosition::new(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_invalid_longitude() {
        assert_eq!(
            GeoPosition::new(0.0, -180.5, 0.0),
            Err(GeoError::InvalidLongitude(-180.5))
        );
    }

    #[test]
    fn test_invalid_altitude() {
        assert!(GeoPosition::new(0.0, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_display() {
        let pos = GeoPosition::new(43.6, 1.44, 120.0).unwrap();
        assert_eq!(format!("{}", pos), "(43.600000, 1.440000, 120.0m)");
    }
}
