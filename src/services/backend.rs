use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::debug;

use crate::engine::matching;
use crate::engine::payment::Authorization;
use crate::engine::pricing::{estimated_duration_minutes, price};
use crate::error::AppError;
use crate::models::account::Account;
use crate::models::booking::{Booking, BookingStatus, Destination, Pickup};
use crate::models::driver::DriverListing;
use crate::models::location::Location;
use crate::models::payment::{PaymentReceipt, PaymentStatus};
use crate::store::roster::DriverRoster;

/// Reference point that simulated locations scatter around (Tunis).
pub const REFERENCE_LAT: f64 = 36.8065;
pub const REFERENCE_LNG: f64 = 10.1815;
const SCATTER_DEGREES: f64 = 0.1;
const DEFAULT_ADDRESS: &str = "123 Main Street, Sfax";

pub const OP_LOCATE: &str = "location";
pub const OP_FIND_DRIVERS: &str = "driver search";
pub const OP_BOOK_RIDE: &str = "booking";
pub const OP_PROCESS_PAYMENT: &str = "payment";

#[derive(Debug, Clone, Copy)]
pub struct BookingRequest<'a> {
    pub driver: &'a DriverListing,
    pub rider: &'a Account,
    pub pickup: &'a str,
    pub destination: &'a str,
    pub location: &'a Location,
}

pub trait RideBackend: Send + Sync + 'static {
    fn locate(&self, pickup: &str) -> impl Future<Output = Result<Location, AppError>> + Send;

    fn find_drivers(
        &self,
        location: Option<&Location>,
    ) -> impl Future<Output = Result<Vec<DriverListing>, AppError>> + Send;

    fn book_ride(
        &self,
        request: BookingRequest<'_>,
    ) -> impl Future<Output = Result<Booking, AppError>> + Send;

    fn process_payment(
        &self,
        booking: &Booking,
        authorization: &Authorization,
    ) -> impl Future<Output = Result<PaymentReceipt, AppError>> + Send;
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub latency: Duration,
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

impl SimulationSettings {
    pub fn instant(seed: u64) -> Self {
        Self {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: Some(seed),
        }
    }
}

#[derive(Debug)]
pub struct SimulatedBackend {
    roster: Arc<DriverRoster>,
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
    sequence: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(roster: Arc<DriverRoster>, settings: SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            roster,
            latency: settings.latency,
            failure_rate: settings.failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn roster(&self) -> &DriverRoster {
        &self.roster
    }

    async fn round_trip(&self, operation: &'static str) -> Result<(), AppError> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        if self.roll_failure() {
            debug!(operation, "simulated call rejected");
            return Err(AppError::CollaboratorUnavailable { operation });
        }
        Ok(())
    }

    fn roll_failure(&self) -> bool {
        self.failure_rate > 0.0 && self.with_rng(|rng| rng.gen_bool(self.failure_rate))
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    fn next_id(&self, prefix: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{}-{sequence:04}", Utc::now().timestamp_millis())
    }

    fn resolve_location(&self, pickup: &str) -> Location {
        let (lat_jitter, lng_jitter, accuracy) = self.with_rng(|rng| {
            (
                rng.gen_range(-0.5..0.5_f64),
                rng.gen_range(-0.5..0.5_f64),
                rng.gen_range(5..25u32),
            )
        });

        let address = if pickup.trim().is_empty() {
            DEFAULT_ADDRESS.to_string()
        } else {
            pickup.to_string()
        };

        Location {
            latitude: REFERENCE_LAT + lat_jitter * SCATTER_DEGREES,
            longitude: REFERENCE_LNG + lng_jitter * SCATTER_DEGREES,
            address,
            accuracy,
            timestamp: Utc::now(),
        }
    }
}

impl RideBackend for SimulatedBackend {
    async fn locate(&self, pickup: &str) -> Result<Location, AppError> {
        self.round_trip(OP_LOCATE).await?;
        Ok(self.resolve_location(pickup))
    }

    async fn find_drivers(&self, location: Option<&Location>) -> Result<Vec<DriverListing>, AppError> {
        self.round_trip(OP_FIND_DRIVERS).await?;
        let client = location.map(Location::point);
        Ok(matching::find_drivers(&self.roster, client.as_ref()))
    }

    async fn book_ride(&self, request: BookingRequest<'_>) -> Result<Booking, AppError> {
        self.round_trip(OP_BOOK_RIDE).await?;

        let distance_km = request.driver.distance_km;
        Ok(Booking {
            ride_id: self.next_id("RIDE"),
            driver: request.driver.clone(),
            rider: request.rider.clone(),
            pickup: Pickup {
                address: request.pickup.to_string(),
                coordinates: request.location.point(),
            },
            destination: Destination {
                address: request.destination.to_string(),
                estimated: true,
            },
            fare: price(distance_km, request.driver.price_multiplier),
            distance_km,
            duration_minutes: estimated_duration_minutes(distance_km),
            status: BookingStatus::Confirmed,
            booked_at: Utc::now(),
        })
    }

    async fn process_payment(
        &self,
        booking: &Booking,
        authorization: &Authorization,
    ) -> Result<PaymentReceipt, AppError> {
        self.round_trip(OP_PROCESS_PAYMENT).await?;

        Ok(PaymentReceipt {
            transaction_id: self.next_id("TXN"),
            amount: booking.fare.total,
            currency: booking.fare.currency.clone(),
            method: authorization.method,
            method_name: authorization.method.display_name().to_string(),
            instrument_last4: authorization.instrument_last4.clone(),
            status: PaymentStatus::Success,
            timestamp: Utc::now(),
            ride_id: booking.ride_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::{
        BookingRequest, RideBackend, SimulatedBackend, SimulationSettings, REFERENCE_LAT,
        REFERENCE_LNG,
    };
    use crate::engine::payment::Authorization;
    use crate::engine::pricing::price;
    use crate::error::AppError;
    use crate::models::account::{Account, Role};
    use crate::models::payment::{PaymentMethod, PaymentStatus};
    use crate::store::roster::DriverRoster;

    fn backend(failure_rate: f64) -> SimulatedBackend {
        let roster = Arc::new(DriverRoster::load(None).unwrap());
        SimulatedBackend::new(
            roster,
            SimulationSettings {
                failure_rate,
                ..SimulationSettings::instant(42)
            },
        )
    }

    fn rider() -> Account {
        Account {
            id: "RDR001".to_string(),
            full_name: "Rider".to_string(),
            email: "rider@x.tn".to_string(),
            password: "secret".to_string(),
            phone: "22334455".to_string(),
            role: Role::Rider,
            driver_info: None,
        }
    }

    #[tokio::test]
    async fn locations_scatter_around_reference_point() {
        let backend = backend(0.0);
        for _ in 0..50 {
            let location = backend.locate("Avenue Habib Bourguiba").await.unwrap();
            assert!((location.latitude - REFERENCE_LAT).abs() <= 0.050_001);
            assert!((location.longitude - REFERENCE_LNG).abs() <= 0.050_001);
            assert!((5..25).contains(&location.accuracy));
            assert_eq!(location.address, "Avenue Habib Bourguiba");
        }
    }

    #[tokio::test]
    async fn blank_pickup_gets_default_address() {
        let location = backend(0.0).locate("  ").await.unwrap();
        assert_eq!(location.address, "123 Main Street, Sfax");
    }

    #[tokio::test]
    async fn same_seed_same_location() {
        let a = backend(0.0).locate("A").await.unwrap();
        let b = backend(0.0).locate("A").await.unwrap();
        assert_eq!(a.latitude, b.latitude);
        assert_eq!(a.longitude, b.longitude);
    }

    #[tokio::test]
    async fn full_failure_rate_rejects_every_call() {
        let backend = backend(1.0);
        assert_eq!(
            backend.locate("A").await.unwrap_err(),
            AppError::CollaboratorUnavailable {
                operation: super::OP_LOCATE
            }
        );
        assert!(backend.find_drivers(None).await.is_err());
    }

    #[tokio::test]
    async fn booking_prices_listing_and_payment_settles_total() {
        let backend = backend(0.0);
        let location = backend.locate("A").await.unwrap();
        let drivers = backend.find_drivers(Some(&location)).await.unwrap();
        let driver = &drivers[0];
        let rider = rider();

        let booking = backend
            .book_ride(BookingRequest {
                driver,
                rider: &rider,
                pickup: "A",
                destination: "B",
                location: &location,
            })
            .await
            .unwrap();

        assert_eq!(booking.fare, price(driver.distance_km, driver.price_multiplier));
        assert_eq!(booking.pickup.coordinates, location.point());
        assert!(booking.destination.estimated);
        assert!(booking.ride_id.starts_with("RIDE-"));

        let receipt = backend
            .process_payment(
                &booking,
                &Authorization {
                    method: PaymentMethod::Laposte,
                    instrument_last4: "3333".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.status, PaymentStatus::Success);
        assert_eq!(receipt.amount, booking.fare.total);
        assert_eq!(receipt.ride_id, booking.ride_id);
        assert_eq!(receipt.method_name, "La Poste Card");
    }

    #[tokio::test]
    async fn transaction_ids_are_unique() {
        let backend = backend(0.0);
        let ids: HashSet<String> = (0..100).map(|_| backend.next_id("TXN")).collect();
        assert_eq!(ids.len(), 100);
    }
}
