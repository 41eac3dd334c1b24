/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const ORIGIN: GeoPoint = GeoPoint {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside `[-90, 90] x [-180, 180]`.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Great-circle distance in kilometers.
///
/// Callers validate the points first; this function does not check for
/// missing or non-finite input.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    // abs() keeps the result bit-identical when the arguments are swapped.
    let d_lat = (b.latitude - a.latitude).abs().to_radians();
    let d_lon = (b.longitude - a.longitude).abs().to_radians();

    let cos_product = a.latitude.to_radians().cos() * b.latitude.to_radians().cos();
    let h = (d_lat / 2.0).sin().powi(2) + cos_product * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_apart() {
        let p = GeoPoint::new(-33.45, -70.65);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (GeoPoint::new(-33.45, -70.65), GeoPoint::new(-33.46, -70.66)),
            (GeoPoint::new(51.5, -0.12), GeoPoint::new(40.71, -74.0)),
            (GeoPoint::new(89.9, 179.9), GeoPoint::new(-89.9, -179.9)),
        ];

        for (a, b) in pairs {
            assert_eq!(haversine_km(a, b), haversine_km(b, a));
        }
    }

    #[test]
    fn one_degree_of_longitude_on_the_equator() {
        let d = haversine_km(GeoPoint::ORIGIN, GeoPoint::new(0.0, 1.0));
        assert!((d - 111.194_926).abs() < 1e-3, "got {d}");
    }

    #[test]
    fn santiago_neighbours() {
        let d = haversine_km(GeoPoint::new(-33.45, -70.65), GeoPoint::new(-33.46, -70.66));
        assert!((d - 1.448_135).abs() < 1e-4, "got {d}");
    }

    #[test]
    fn antipodes_do_not_overflow_asin() {
        let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn validity_bounds() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }
}
