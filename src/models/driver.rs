use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    pub year: String,
    pub color: String,
    pub license_plate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterDriver {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub rating: f64,
    pub vehicle: Vehicle,
    pub license: String,
    pub available: bool,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_price_multiplier")]
    pub price_multiplier: f64,
}

fn default_price_multiplier() -> f64 {
    1.0
}

impl RosterDriver {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverListing {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub rating: f64,
    pub vehicle: Vehicle,
    pub license: String,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub price_multiplier: f64,
}
