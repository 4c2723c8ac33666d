use crate::models::ping::{GeoPoint, LocationPing};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Length of the path traced by `pings` in the order given.
/// Pings without coordinates are skipped.
pub fn path_length_km<'a>(pings: impl IntoIterator<Item = &'a LocationPing>) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<GeoPoint> = None;

    for point in pings.into_iter().filter_map(LocationPing::point) {
        if let Some(prev) = &previous {
            total += haversine_km(prev, &point);
        }
        previous = Some(point);
    }

    total
}
