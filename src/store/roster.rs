use tracing::info;

use crate::error::AppError;
use crate::models::driver::RosterDriver;
use crate::store::read_fixture;

const EMBEDDED_DRIVERS: &str = include_str!("../../data/drivers.json");

#[derive(Debug, Clone, Default)]
pub struct DriverRoster {
    drivers: Vec<RosterDriver>,
}

impl DriverRoster {
    pub fn new(drivers: Vec<RosterDriver>) -> Self {
        Self { drivers }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let drivers: Vec<RosterDriver> = serde_json::from_str(raw)
            .map_err(|err| AppError::Internal(format!("invalid drivers fixture: {err}")))?;
        Ok(Self::new(drivers))
    }

    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let roster = Self::from_json(&read_fixture(path, EMBEDDED_DRIVERS)?)?;
        info!(
            drivers = roster.drivers.len(),
            available = roster.available().count(),
            "driver roster loaded"
        );
        Ok(roster)
    }

    pub fn drivers(&self) -> &[RosterDriver] {
        &self.drivers
    }

    pub fn available(&self) -> impl Iterator<Item = &RosterDriver> {
        self.drivers.iter().filter(|driver| driver.available)
    }
}

#[cfg(test)]
mod tests {
    use super::DriverRoster;

    #[test]
    fn embedded_roster_has_unavailable_drivers_filtered() {
        let roster = DriverRoster::load(None).unwrap();
        assert!(roster.drivers().len() > roster.available().count());
        assert!(roster.available().all(|driver| driver.available));
    }

    #[test]
    fn price_multiplier_defaults_to_one() {
        let roster = DriverRoster::from_json(
            r#"[{
                "id": "D1", "name": "N", "phone": "1", "rating": 4.0,
                "vehicle": {"make": "M", "model": "X", "year": "2020", "color": "Red", "licensePlate": "P"},
                "license": "L", "available": true, "latitude": 0.0, "longitude": 0.0
            }]"#,
        )
        .unwrap();
        assert_eq!(roster.drivers()[0].price_multiplier, 1.0);
    }

    #[test]
    fn malformed_fixture_is_an_error() {
        assert!(DriverRoster::from_json("[{\"id\": 1}]").is_err());
    }
}
