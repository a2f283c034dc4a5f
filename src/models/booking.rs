use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::account::Account;
use crate::models::driver::DriverListing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fare {
    pub base_price: f64,
    pub distance_price: f64,
    pub total: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub address: String,
    pub coordinates: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub ride_id: String,
    pub driver: DriverListing,
    pub rider: Account,
    pub pickup: Pickup,
    pub destination: Destination,
    pub fare: Fare,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
}
