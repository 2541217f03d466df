//! Geographic primitives: great-circle distance and contract fixed-point.
//!
//! The contract stores coordinates as integers scaled by 1e6 (micro-degrees).
//! The domain works in plain degrees; conversion happens at the chain and
//! store boundaries only.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Fixed-point scale used by the contract (degrees × 1e6).
pub const COORDINATE_SCALE: f64 = 1_000_000.0;

/// A coordinate was outside the valid latitude/longitude domain.
#[derive(Debug, Error, PartialEq)]
#[error("coordinate out of range: lat={lat}, lng={lng}")]
pub struct InvalidCoordinate {
    /// The rejected latitude.
    pub lat: f64,
    /// The rejected longitude.
    pub lng: f64,
}

/// A validated geographic point in degrees.
///
/// Construction via [`GeoPoint::new`] enforces the ±90/±180 domain; points
/// decoded from the contract's fixed-point representation go through the same
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, −90 ..= 90.
    pub lat: f64,
    /// Longitude in degrees, −180 ..= 180.
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting coordinates outside the valid domain.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinate`] when latitude or longitude is out of
    /// range or not finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinate> {
        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            return Err(InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    /// Decode from the contract's micro-degree fixed point.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinate`] when the decoded degrees are out of
    /// range.
    pub fn from_fixed(lat_e6: i64, lng_e6: i64) -> Result<Self, InvalidCoordinate> {
        // Micro-degrees fit in f64 exactly.
        #[allow(clippy::cast_precision_loss)]
        let (lat, lng) = (
            lat_e6 as f64 / COORDINATE_SCALE,
            lng_e6 as f64 / COORDINATE_SCALE,
        );
        Self::new(lat, lng)
    }

    /// Encode to the contract's micro-degree fixed point, rounding.
    #[must_use]
    pub fn to_fixed(self) -> (i64, i64) {
        // |deg| ≤ 180, so |e6| ≤ 1.8e8 fits i64 comfortably.
        #[allow(clippy::cast_possible_truncation)]
        let fixed = (
            (self.lat * COORDINATE_SCALE).round() as i64,
            (self.lng * COORDINATE_SCALE).round() as i64,
        );
        fixed
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Great-circle distance between two points in meters (haversine).
#[must_use]
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
