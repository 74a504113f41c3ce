use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::courier::{CourierLocation, GeoPoint};

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

#[derive(Debug, Clone)]
pub struct Candidate {
    pub courier_id: Uuid,
    pub distance_km: f64,
    pub last_seen: DateTime<Utc>,
}

// last-known courier positions; each row is owned by its courier's heartbeat
// feed, so writes are last-writer-wins with no cross-courier locking
pub struct GeoIndex {
    entries: DashMap<Uuid, CourierLocation>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn heartbeat(&self, courier_id: Uuid, position: GeoPoint, available: bool) -> CourierLocation {
        let entry = CourierLocation {
            courier_id,
            position,
            available,
            updated_at: Utc::now(),
        };
        self.entries.insert(courier_id, entry.clone());
        entry
    }

    pub fn get(&self, courier_id: Uuid) -> Option<CourierLocation> {
        self.entries.get(&courier_id).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<CourierLocation> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ranked by distance from pickup; ties go to the courier seen earlier,
    // i.e. the one that has been waiting longest
    pub fn candidates(
        &self,
        pickup: &GeoPoint,
        staleness: chrono::Duration,
        excluded: &HashSet<Uuid>,
    ) -> Vec<Candidate> {
        let cutoff = Utc::now() - staleness;

        let mut out: Vec<Candidate> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let loc = entry.value();
                if !loc.available || loc.updated_at < cutoff || excluded.contains(&loc.courier_id) {
                    return None;
                }
                Some(Candidate {
                    courier_id: loc.courier_id,
                    distance_km: haversine_km(&loc.position, pickup),
                    last_seen: loc.updated_at,
                })
            })
            .collect();

        out.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.last_seen.cmp(&b.last_seen))
        });
        out
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;
    use uuid::Uuid;

    use super::{GeoIndex, haversine_km};
    use crate::models::courier::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 30.0,
            lng: 31.0,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn nearest_candidate_ranks_first() {
        let index = GeoIndex::new();
        let pickup = GeoPoint {
            lat: 30.0,
            lng: 31.0,
        };
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.heartbeat(far, GeoPoint { lat: 30.045, lng: 31.0 }, true);
        index.heartbeat(near, GeoPoint { lat: 30.009, lng: 31.0 }, true);

        let ranked = index.candidates(&pickup, Duration::seconds(90), &HashSet::new());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].courier_id, near);
        assert!(ranked[0].distance_km < ranked[1].distance_km);
    }

    #[test]
    fn unavailable_and_excluded_couriers_are_skipped() {
        let index = GeoIndex::new();
        let pickup = GeoPoint {
            lat: 30.0,
            lng: 31.0,
        };
        let offline = Uuid::new_v4();
        let banned = Uuid::new_v4();
        let ok = Uuid::new_v4();
        index.heartbeat(offline, GeoPoint { lat: 30.001, lng: 31.0 }, false);
        index.heartbeat(banned, GeoPoint { lat: 30.002, lng: 31.0 }, true);
        index.heartbeat(ok, GeoPoint { lat: 30.02, lng: 31.0 }, true);

        let excluded: HashSet<Uuid> = [banned].into_iter().collect();
        let ranked = index.candidates(&pickup, Duration::seconds(90), &excluded);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].courier_id, ok);
    }

    #[test]
    fn stale_locations_are_invisible() {
        let index = GeoIndex::new();
        let pickup = GeoPoint {
            lat: 30.0,
            lng: 31.0,
        };
        index.heartbeat(Uuid::new_v4(), GeoPoint { lat: 30.001, lng: 31.0 }, true);

        // a zero staleness budget makes every heartbeat too old
        let ranked = index.candidates(&pickup, Duration::zero(), &HashSet::new());
        assert!(ranked.is_empty());
    }

    #[test]
    fn distance_tie_goes_to_longest_waiting_courier() {
        let index = GeoIndex::new();
        let pickup = GeoPoint {
            lat: 30.0,
            lng: 31.0,
        };
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let spot = GeoPoint {
            lat: 30.005,
            lng: 31.0,
        };
        index.heartbeat(first, spot, true);
        index.heartbeat(second, spot, true);

        let ranked = index.candidates(&pickup, Duration::seconds(90), &HashSet::new());
        assert_eq!(ranked[0].courier_id, first);
    }
}
