/// Geographic coordinate types and small-distance helpers.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Mean Earth radius used by the haversine distance, metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Floor applied to cos(lat) so longitude spans stay finite near the poles.
pub const MIN_COS_LAT: f64 = 0.1;

/// A point on the sphere in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }

    /// Finite and inside the usual latitude/longitude ranges.
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_m(self, other: LatLon) -> f64 {
        haversine_m(self, other)
    }

    /// Shift by `north_m` / `east_m` using the flat-earth approximation.
    pub fn offset_m(self, north_m: f64, east_m: f64) -> Self {
        let (dlat, dlon) = degree_offsets(self.lat, 1.0);
        Self {
            lat: self.lat + north_m * dlat,
            lon: self.lon + east_m * dlon,
        }
    }
}

/// Haversine great-circle distance between two points, metres.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (phi1, lam1) = a.to_radians();
    let (phi2, lam2) = b.to_radians();
    let dphi = phi2 - phi1;
    let dlam = lam2 - lam1;
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlam / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Degree half-spans `(Δlat, Δlon)` covering `radius_m` around latitude `lat`.
///
///   Δlat = r / 111 320
///   Δlon = r / (111 320 · max(0.1, cos lat))
pub fn degree_offsets(lat: f64, radius_m: f64) -> (f64, f64) {
    let cos_lat = lat.to_radians().cos().max(MIN_COS_LAT);
    (radius_m / METRES_PER_DEGREE, radius_m / (METRES_PER_DEGREE * cos_lat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn haversine_one_degree_latitude() {
        let d = haversine_m(LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0));
        // 2πR / 360
        assert_relative_eq!(d, 111_194.9, epsilon = 1.0);
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_self() {
        let a = LatLon::new(39.1, -106.4);
        let b = LatLon::new(39.12, -106.45);
        assert_relative_eq!(haversine_m(a, b), haversine_m(b, a), epsilon = 1e-9);
        assert_eq!(haversine_m(a, a), 0.0);
    }

    #[test]
    fn degree_offsets_floor_cosine_near_pole() {
        let (dlat, dlon) = degree_offsets(89.99, 1000.0);
        assert_relative_eq!(dlat, 1000.0 / METRES_PER_DEGREE);
        assert_relative_eq!(dlon, 1000.0 / (METRES_PER_DEGREE * 0.1));
    }

    #[test]
    fn offset_then_distance_matches() {
        let seed = LatLon::new(45.0, 7.0);
        let moved = seed.offset_m(100.0, 0.0);
        assert!((seed.distance_m(moved) - 100.0).abs() < 1.0);
    }

    #[test]
    fn validity_rejects_out_of_range() {
        assert!(LatLon::new(10.0, 20.0).is_valid());
        assert!(!LatLon::new(91.0, 0.0).is_valid());
        assert!(!LatLon::new(f64::NAN, 0.0).is_valid());
    }
}
