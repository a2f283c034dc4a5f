use crate::engine::pricing::round_dp;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::driver::{DriverListing, RosterDriver};
use crate::store::roster::DriverRoster;

/// Available roster drivers ranked by distance from `client`, nearest first.
/// Equal distances keep roster order. Without a client position every
/// distance is zero.
pub fn find_drivers(roster: &DriverRoster, client: Option<&GeoPoint>) -> Vec<DriverListing> {
    let mut listings: Vec<DriverListing> = roster
        .available()
        .map(|driver| {
            let distance_km = client.map_or(0.0, |client| haversine_km(client, &driver.point()));
            listing(driver, distance_km)
        })
        .collect();

    listings.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    listings
}

pub fn eta_minutes(distance_km: f64) -> u32 {
    (distance_km.max(0.0) * 2.0).floor() as u32 + 2
}

fn listing(driver: &RosterDriver, distance_km: f64) -> DriverListing {
    DriverListing {
        id: driver.id.clone(),
        name: driver.name.clone(),
        phone: driver.phone.clone(),
        rating: driver.rating,
        vehicle: driver.vehicle.clone(),
        license: driver.license.clone(),
        location: driver.point(),
        distance_km: round_dp(distance_km, 1),
        eta_minutes: eta_minutes(distance_km),
        price_multiplier: driver.price_multiplier,
    }
}
