use crate::models::courier::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * central_angle
}

/// Latitude in [-90, 90], longitude in [-180, 180], both finite.
pub fn is_valid(point: &GeoPoint) -> bool {
    point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng)
}

#[cfg(test)]
mod tests {
    use super::{haversine_m, is_valid};
    use crate::models::courier::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(79.86, 6.93);
        let distance = haversine_m(&p, &p);
        assert!(distance < 1e-6);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint::new(-0.1278, 51.5074);
        let paris = GeoPoint::new(2.3522, 48.8566);
        let distance = haversine_m(&london, &paris);
        assert!((distance - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn small_offsets_resolve_to_meters() {
        let pickup = GeoPoint::new(79.86, 6.93);
        // ~0.0018 degrees of latitude is ~200m
        let nearby = GeoPoint::new(79.86, 6.9318);
        let distance = haversine_m(&pickup, &nearby);
        assert!((distance - 200.0).abs() < 5.0);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(is_valid(&GeoPoint::new(179.9, -89.9)));
        assert!(!is_valid(&GeoPoint::new(181.0, 0.0)));
        assert!(!is_valid(&GeoPoint::new(0.0, 91.0)));
        assert!(!is_valid(&GeoPoint::new(f64::NAN, 0.0)));
    }
}
