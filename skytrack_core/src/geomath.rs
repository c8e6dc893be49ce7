//! GeoMath - spherical-earth geodesy helpers.
//!
//! Distances use the haversine formula and bearings the standard initial
//! great-circle bearing, both on a sphere of mean radius
//! [`EARTH_RADIUS_KM`]. At the few-hundred-kilometre scale of an alert map
//! the error against an ellipsoid is well under 0.5%; this module does not
//! attempt ellipsoidal (Vincenty/Karney) accuracy.

use geo::{HaversineBearing, HaversineDestination, HaversineDistance, Point};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Mean earth radius used by `geo`'s haversine implementation.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Seconds per hour, for km/s <-> km/h conversions.
pub const SECONDS_PER_HOUR: f64 = 3600.0;

// ============================================================================
// POSITION / VELOCITY
// ============================================================================

/// A WGS84 position in degrees.
///
/// Serialized as `[lat, lon]`, the order snapshot producers use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both components finite and inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }

    /// Clamps latitude to the poles and wraps longitude into [-180, 180).
    pub fn normalized(self) -> Self {
        let lat = self.lat.clamp(-90.0, 90.0);
        let lon = (self.lon + 180.0).rem_euclid(360.0) - 180.0;
        Self { lat, lon }
    }

    /// `[lon, lat]`, the GeoJSON coordinate order.
    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Linear step along a degrees-per-second vector.
    pub fn advanced(self, velocity: Velocity, dt_seconds: f64) -> Self {
        let step = velocity.to_vector() * dt_seconds;
        Self::new(self.lat + step.x, self.lon + step.y).normalized()
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl From<[f64; 2]> for Position {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Position> for [f64; 2] {
    fn from(value: Position) -> Self {
        [value.lat, value.lon]
    }
}

/// Rate of change of a position in degrees per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    #[serde(alias = "dx")]
    pub dlat: f64,
    #[serde(alias = "dy")]
    pub dlon: f64,
}

impl Velocity {
    pub const fn new(dlat: f64, dlon: f64) -> Self {
        Self { dlat, dlon }
    }

    /// Vector implied by moving from `from` to `to` over `dt_seconds`.
    ///
    /// Returns `None` if `dt_seconds` is not strictly positive.
    pub fn between(from: Position, to: Position, dt_seconds: f64) -> Option<Self> {
        if dt_seconds.is_nan() || dt_seconds <= 0.0 {
            return None;
        }
        let delta = Vector2::new(to.lat - from.lat, to.lon - from.lon) / dt_seconds;
        Some(Self::from(delta))
    }

    pub fn is_finite(&self) -> bool {
        self.dlat.is_finite() && self.dlon.is_finite()
    }

    #[inline]
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.dlat, self.dlon)
    }
}

impl From<Vector2<f64>> for Velocity {
    fn from(v: Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }
}

// ============================================================================
// DISTANCE / BEARING
// ============================================================================

/// Great-circle distance in kilometres (haversine, spherical earth).
pub fn haversine_km(from: Position, to: Position) -> f64 {
    from.to_point().haversine_distance(&to.to_point()) / 1000.0
}

/// Initial great-circle bearing from `from` to `to`, in [0, 360).
///
/// 0 is north, angles grow clockwise. Identical points yield 0.
pub fn initial_bearing(from: Position, to: Position) -> f64 {
    normalize_heading(from.to_point().haversine_bearing(to.to_point()))
}

/// Point reached after `distance_km` along the great circle leaving `from`
/// at `bearing` degrees.
pub fn destination(from: Position, bearing: f64, distance_km: f64) -> Position {
    let point = from.to_point().haversine_destination(bearing, distance_km * 1000.0);
    Position::new(point.y(), point.x()).normalized()
}

/// Maps any finite angle into [0, 360). Non-finite input maps to 0.
pub fn normalize_heading(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest-arc difference between two headings, in [0, 180].
pub fn heading_delta(a: f64, b: f64) -> f64 {
    let delta = (normalize_heading(a) - normalize_heading(b)).abs();
    delta.min(360.0 - delta)
}

/// Signed shortest-arc offset of `heading` relative to `reference`, in
/// (-180, 180].
pub fn signed_heading_offset(reference: f64, heading: f64) -> f64 {
    let offset = normalize_heading(heading - reference);
    if offset > 180.0 {
        offset - 360.0
    } else {
        offset
    }
}

/// 8-point compass label for a heading.
pub fn compass_point(heading: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = (normalize_heading(heading) / 45.0).round() as usize % 8;
    POINTS[index]
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Population variance. Fewer than two values have zero variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
