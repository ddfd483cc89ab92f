// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances, in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other`, in metres (haversine formula).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Length of a polyline through the given points, in metres.
    pub fn route_length_m(route: &[GeoPoint]) -> f64 {
        route.windows(2).map(|w| w[0].distance_m(&w[1])).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_route_length() {
        // One degree of latitude is ~111.2 km.
        let a = GeoPoint::new(45.0, 5.0);
        let b = GeoPoint::new(46.0, 5.0);
        assert_relative_eq!(a.distance_m(&b), 111_195.0, max_relative = 1e-3);

        let route = [a, GeoPoint::new(45.5, 5.0), b];
        assert_relative_eq!(
            GeoPoint::route_length_m(&route),
            a.distance_m(&b),
            max_relative = 1e-9
        );
        assert_eq!(GeoPoint::route_length_m(&[a]), 0.0);
    }
}
