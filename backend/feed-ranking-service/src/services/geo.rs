//! Coordinate selection and great-circle distances.

use crate::config::RegionalDistances;
use crate::models::{LocationAction, LocationPermission, TimedCoordinate, UserLocation};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// IUGG mean Earth radius
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

const PRECISE_FRESH_HOURS: i64 = 48;
const APPROXIMATE_FRESH_HOURS: i64 = 12;
/// Window in which a browser coordinate is good enough to skip prompting
const PROMPT_FRESH_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    Precise,
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub source: CoordinateSource,
}

fn usable(coordinate: &Option<TimedCoordinate>) -> Option<&TimedCoordinate> {
    coordinate.as_ref().filter(|c| c.is_valid())
}

fn younger_than(coordinate: &TimedCoordinate, now: DateTime<Utc>, hours: i64) -> bool {
    now.signed_duration_since(coordinate.updated_at) < Duration::hours(hours)
}

/// Pick the coordinate to rank with: fresh precise, fresh approximate,
/// stale precise, stale approximate, in that order
pub fn resolve_coordinate(location: &UserLocation, now: DateTime<Utc>) -> Option<ResolvedCoordinate> {
    let precise = usable(&location.precise);
    let approximate = usable(&location.approximate);

    let pick = |c: &TimedCoordinate, source| ResolvedCoordinate {
        latitude: c.latitude,
        longitude: c.longitude,
        source,
    };

    if let Some(c) = precise.filter(|c| younger_than(c, now, PRECISE_FRESH_HOURS)) {
        return Some(pick(c, CoordinateSource::Precise));
    }
    if let Some(c) = approximate.filter(|c| younger_than(c, now, APPROXIMATE_FRESH_HOURS)) {
        return Some(pick(c, CoordinateSource::Approximate));
    }
    precise
        .map(|c| pick(c, CoordinateSource::Precise))
        .or_else(|| approximate.map(|c| pick(c, CoordinateSource::Approximate)))
}

/// Haversine distance in kilometers
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards asin against rounding just above 1 at antipodes
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

fn same_field(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref().map(str::trim), b.as_deref().map(str::trim)) {
        (Some(x), Some(y)) => !x.is_empty() && x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Assumed distance when only region membership is known
pub fn regional_distance(
    viewer: &UserLocation,
    author: &UserLocation,
    distances: &RegionalDistances,
) -> Option<f64> {
    if same_field(&viewer.city, &author.city) {
        Some(distances.same_city_km)
    } else if same_field(&viewer.state, &author.state) {
        Some(distances.same_state_km)
    } else if same_field(&viewer.country, &author.country) {
        Some(distances.same_country_km)
    } else {
        None
    }
}

/// Geolocation state reported to the client so it can decide whether to prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationStatus {
    pub has_location: bool,
    pub is_fresh: bool,
    pub is_stale: bool,
    pub permission: LocationPermission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub recommended_action: LocationAction,
}

pub fn location_status(location: &UserLocation, now: DateTime<Utc>) -> LocationStatus {
    let precise = usable(&location.precise);
    let is_fresh = precise
        .map(|c| younger_than(c, now, PROMPT_FRESH_HOURS))
        .unwrap_or(false);
    let has_location = precise.is_some();

    let recommended_action = if is_fresh {
        LocationAction::UseLocation
    } else if location.permission == LocationPermission::Denied {
        // Permission may have been changed in the browser since
        LocationAction::RetryRequestLocation
    } else {
        LocationAction::RequestLocation
    };

    LocationStatus {
        has_location,
        is_fresh,
        is_stale: has_location && !is_fresh,
        permission: location.permission,
        latitude: precise.map(|c| c.latitude),
        longitude: precise.map(|c| c.longitude),
        updated_at: precise.map(|c| c.updated_at),
        recommended_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64, hours_ago: i64) -> Option<TimedCoordinate> {
        Some(TimedCoordinate::new(lat, lon, Utc::now() - Duration::hours(hours_ago)))
    }

    #[test]
    fn test_distance_identity_and_symmetry() {
        assert_eq!(distance_km(12.97, 77.59, 12.97, 77.59), 0.0);
        let ab = distance_km(12.97, 77.59, 19.07, 72.87);
        let ba = distance_km(19.07, 72.87, 12.97, 77.59);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_distance_triangle_inequality() {
        let points = [(0.0, 0.0), (10.0, 20.0), (-33.9, 151.2), (51.5, -0.12), (89.9, 45.0)];
        for a in points {
            for b in points {
                for c in points {
                    let ab = distance_km(a.0, a.1, b.0, b.1);
                    let bc = distance_km(b.0, b.1, c.0, c.1);
                    let ac = distance_km(a.0, a.1, c.0, c.1);
                    assert!(ac <= ab + bc + 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_distance_known_values() {
        let small = distance_km(0.0, 0.0, 0.01, 0.0);
        assert!((small - 1.112).abs() < 0.01, "got {}", small);

        let degree = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((degree - 111.19).abs() < 0.1, "got {}", degree);

        let antipodes = distance_km(0.0, 0.0, 0.0, 180.0);
        assert!((antipodes - 20015.1).abs() < 1.0, "got {}", antipodes);
    }

    #[test]
    fn test_resolve_prefers_fresh_precise() {
        let location = UserLocation {
            precise: coord(1.0, 1.0, 2),
            approximate: coord(2.0, 2.0, 1),
            ..Default::default()
        };
        let resolved = resolve_coordinate(&location, Utc::now()).unwrap();
        assert_eq!(resolved.source, CoordinateSource::Precise);
    }

    #[test]
    fn test_resolve_falls_back_to_fresh_approximate() {
        let location = UserLocation {
            precise: coord(1.0, 1.0, 72),
            approximate: coord(2.0, 2.0, 3),
            ..Default::default()
        };
        let resolved = resolve_coordinate(&location, Utc::now()).unwrap();
        assert_eq!(resolved.source, CoordinateSource::Approximate);
        assert_eq!(resolved.latitude, 2.0);
    }

    #[test]
    fn test_resolve_uses_stale_precise_before_stale_approximate() {
        let location = UserLocation {
            precise: coord(1.0, 1.0, 72),
            approximate: coord(2.0, 2.0, 30),
            ..Default::default()
        };
        let resolved = resolve_coordinate(&location, Utc::now()).unwrap();
        assert_eq!(resolved.source, CoordinateSource::Precise);

        let only_approx = UserLocation {
            approximate: coord(2.0, 2.0, 300),
            ..Default::default()
        };
        assert_eq!(
            resolve_coordinate(&only_approx, Utc::now()).unwrap().source,
            CoordinateSource::Approximate
        );
        assert!(resolve_coordinate(&UserLocation::default(), Utc::now()).is_none());
    }

    #[test]
    fn test_resolve_ignores_out_of_range_coordinates() {
        let location = UserLocation {
            precise: coord(120.0, 0.0, 1),
            ..Default::default()
        };
        assert!(resolve_coordinate(&location, Utc::now()).is_none());
    }

    #[test]
    fn test_regional_distance_tiers() {
        let distances = RegionalDistances {
            same_city_km: 10.0,
            same_state_km: 50.0,
            same_country_km: 150.0,
        };
        let viewer = UserLocation {
            city: Some("Pune".into()),
            state: Some("Maharashtra".into()),
            country: Some("India".into()),
            ..Default::default()
        };
        let neighbour = UserLocation {
            city: Some(" pune ".into()),
            ..Default::default()
        };
        let compatriot = UserLocation {
            city: Some("Delhi".into()),
            country: Some("INDIA".into()),
            ..Default::default()
        };
        assert_eq!(regional_distance(&viewer, &neighbour, &distances), Some(10.0));
        assert_eq!(regional_distance(&viewer, &compatriot, &distances), Some(150.0));
        assert_eq!(regional_distance(&viewer, &UserLocation::default(), &distances), None);
    }

    #[test]
    fn test_location_status_actions() {
        let now = Utc::now();
        let fresh = UserLocation {
            precise: coord(1.0, 1.0, 1),
            ..Default::default()
        };
        assert_eq!(location_status(&fresh, now).recommended_action, LocationAction::UseLocation);

        let denied = UserLocation {
            permission: LocationPermission::Denied,
            ..Default::default()
        };
        assert_eq!(
            location_status(&denied, now).recommended_action,
            LocationAction::RetryRequestLocation
        );

        let stale = UserLocation {
            precise: coord(1.0, 1.0, 30),
            ..Default::default()
        };
        let status = location_status(&stale, now);
        assert!(status.is_stale);
        assert_eq!(status.recommended_action, LocationAction::RequestLocation);
    }
}
