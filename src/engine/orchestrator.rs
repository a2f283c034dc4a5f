use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::payment::{Authorization, PaymentAuthorizer, Submission};
use crate::error::AppError;
use crate::models::account::{Account, Role, SignupFields};
use crate::models::booking::Booking;
use crate::models::driver::DriverListing;
use crate::models::location::Location;
use crate::models::payment::{PaymentForm, PaymentMethod, PaymentReceipt};
use crate::models::session::{SessionSnapshot, Stage};
use crate::services::backend::{BookingRequest, RideBackend};
use crate::services::notifier::Notifier;
use crate::store::accounts::AccountRepository;

struct RideSession {
    stage: Stage,
    busy: bool,
    last_error: Option<String>,
    account: Option<Account>,
    pickup: Option<String>,
    destination: Option<String>,
    location: Option<Location>,
    drivers: Option<Vec<DriverListing>>,
    booking: Option<Booking>,
    receipt: Option<PaymentReceipt>,
    payment: PaymentAuthorizer,
}

impl RideSession {
    fn clear_ride(&mut self) {
        self.stage = Stage::Location;
        self.last_error = None;
        self.pickup = None;
        self.destination = None;
        self.location = None;
        self.drivers = None;
        self.booking = None;
        self.receipt = None;
        self.payment.reset();
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            stage_number: self.stage.number(),
            busy: self.busy,
            last_error: self.last_error.clone(),
            account: self.account.clone(),
            pickup: self.pickup.clone(),
            destination: self.destination.clone(),
            location: self.location.clone(),
            drivers: self.drivers.clone(),
            booking: self.booking.clone(),
            payment: self.payment.phase(),
            receipt: self.receipt.clone(),
        }
    }
}

/// Clears the in-flight flag if the calling future is dropped mid-flight.
/// A completed call hands the guard to `settle`, which disarms it under the
/// same lock that commits the result.
struct BusyGuard<'a> {
    session: &'a Mutex<RideSession>,
}

impl BusyGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock(self.session).busy = false;
    }
}

fn lock(session: &Mutex<RideSession>) -> MutexGuard<'_, RideSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BookingInputs {
    driver: DriverListing,
    rider: Account,
    pickup: String,
    destination: String,
    location: Location,
}

/// One rider session. Every failed operation leaves the stage where it was,
/// records the message as `last_error` and may be retried.
pub struct RideOrchestrator<B> {
    session_id: Uuid,
    accounts: Arc<dyn AccountRepository>,
    backend: Arc<B>,
    session: Mutex<RideSession>,
}

impl<B: RideBackend> RideOrchestrator<B> {
    pub fn new(
        session_id: Uuid,
        accounts: Arc<dyn AccountRepository>,
        backend: Arc<B>,
        notifier: Arc<dyn Notifier>,
        rng: StdRng,
    ) -> Self {
        Self {
            session_id,
            accounts,
            backend,
            session: Mutex::new(RideSession {
                stage: Stage::Location,
                busy: false,
                last_error: None,
                account: None,
                pickup: None,
                destination: None,
                location: None,
                drivers: None,
                booking: None,
                receipt: None,
                payment: PaymentAuthorizer::new(session_id, notifier, rng),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.session).snapshot()
    }

    pub fn login(&self, email: &str, password: &str, role: Role) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        let outcome = self.ensure_idle(&session).and_then(|()| {
            if email.is_empty() {
                return Err(AppError::validation("email", "Please enter email and password"));
            }
            if password.is_empty() {
                return Err(AppError::validation("password", "Please enter email and password"));
            }
            self.accounts
                .find_account(email, password, role)
                .ok_or_else(|| AppError::Authentication(format!("invalid {role} email or password")))
        });

        match outcome {
            Ok(account) => {
                info!(session_id = %self.session_id, account_id = %account.id, %role, "logged in");
                session.account = Some(account);
                session.clear_ride();
                Ok(session.snapshot())
            }
            Err(err) => Err(self.reject(&mut session, "login", err)),
        }
    }

    pub fn signup(&self, fields: &SignupFields, role: Role) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        let outcome = self
            .ensure_idle(&session)
            .and_then(|()| self.accounts.create_account(fields, role));

        match outcome {
            Ok(account) => {
                info!(session_id = %self.session_id, account_id = %account.id, %role, "signed up");
                session.account = Some(account);
                session.clear_ride();
                Ok(session.snapshot())
            }
            Err(err) => Err(self.reject(&mut session, "signup", err)),
        }
    }

    pub fn logout(&self) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        if let Err(err) = self.ensure_idle(&session) {
            return Err(self.reject(&mut session, "logout", err));
        }

        session.account = None;
        session.clear_ride();
        info!(session_id = %self.session_id, "logged out");
        Ok(session.snapshot())
    }

    pub fn reset(&self) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        if let Err(err) = self.ensure_idle(&session) {
            return Err(self.reject(&mut session, "reset", err));
        }

        session.clear_ride();
        info!(session_id = %self.session_id, "ride reset");
        Ok(session.snapshot())
    }

    pub async fn submit_location(
        &self,
        pickup: &str,
        destination: &str,
    ) -> Result<SessionSnapshot, AppError> {
        const OPERATION: &str = "submit_location";
        let (busy, ()) = self.enter(Stage::Location, OPERATION, |_| Ok(()))?;

        let result = self.backend.locate(pickup).await;
        self.settle(busy, OPERATION, result, |session, location| {
            session.pickup = Some(pickup.to_string());
            session.destination = Some(destination.to_string());
            session.location = Some(location);
            session.stage = Stage::DriverSearch;
        })
    }

    pub async fn search_drivers(&self) -> Result<SessionSnapshot, AppError> {
        const OPERATION: &str = "search_drivers";
        let (busy, location) =
            self.enter(Stage::DriverSearch, OPERATION, |session| Ok(session.location.clone()))?;

        let result = self.backend.find_drivers(location.as_ref()).await;
        self.settle(busy, OPERATION, result, |session, drivers| {
            debug!(session_id = %self.session_id, drivers = drivers.len(), "drivers ranked");
            session.drivers = Some(drivers);
            session.stage = Stage::Booking;
        })
    }

    pub async fn select_driver(&self, driver_id: &str) -> Result<SessionSnapshot, AppError> {
        const OPERATION: &str = "select_driver";
        let (busy, inputs) = self.enter(Stage::Booking, OPERATION, |session| {
            booking_inputs(session, driver_id)
        })?;

        let result = self
            .backend
            .book_ride(BookingRequest {
                driver: &inputs.driver,
                rider: &inputs.rider,
                pickup: &inputs.pickup,
                destination: &inputs.destination,
                location: &inputs.location,
            })
            .await;

        self.settle(busy, OPERATION, result, |session, booking| {
            info!(session_id = %self.session_id, ride_id = %booking.ride_id, "ride booked");
            session.booking = Some(booking);
            session.stage = Stage::Payment;
        })
    }

    pub fn select_payment_method(&self, method: PaymentMethod) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        let outcome = self
            .ensure_idle(&session)
            .and_then(|()| self.check_stage(&session, Stage::Payment))
            .and_then(|()| session.payment.select_method(method));

        match outcome {
            Ok(()) => {
                session.last_error = None;
                Ok(session.snapshot())
            }
            Err(err) => Err(self.reject(&mut session, "select_payment_method", err)),
        }
    }

    pub async fn submit_payment_details(
        &self,
        form: &PaymentForm,
    ) -> Result<SessionSnapshot, AppError> {
        const OPERATION: &str = "submit_payment_details";
        let (busy, (booking, submission)) = self.enter(Stage::Payment, OPERATION, |session| {
            let booking = pending_booking(session)?;
            let submission = session.payment.submit_details(form)?;
            Ok((booking, submission))
        })?;

        match submission {
            Submission::CodeSent { .. } => self.settle(busy, OPERATION, Ok(()), |_, ()| {}),
            Submission::Approved(authorization) => {
                self.settle_payment(busy, OPERATION, &booking, authorization).await
            }
        }
    }

    pub async fn submit_verification_code(&self, code: &str) -> Result<SessionSnapshot, AppError> {
        const OPERATION: &str = "submit_verification_code";
        let (busy, (booking, authorization)) =
            self.enter(Stage::Payment, OPERATION, |session| {
                let booking = pending_booking(session)?;
                let authorization = session.payment.verify_code(code)?;
                Ok((booking, authorization))
            })?;

        self.settle_payment(busy, OPERATION, &booking, authorization).await
    }

    async fn settle_payment(
        &self,
        busy: BusyGuard<'_>,
        operation: &'static str,
        booking: &Booking,
        authorization: Authorization,
    ) -> Result<SessionSnapshot, AppError> {
        let result = self.backend.process_payment(booking, &authorization).await;
        self.settle(busy, operation, result, |session, receipt| {
            info!(
                session_id = %self.session_id,
                transaction_id = %receipt.transaction_id,
                amount = receipt.amount,
                "payment settled"
            );
            session.payment.mark_authorized(authorization);
            session.receipt = Some(receipt);
            session.stage = Stage::Confirmation;
        })
    }

    fn enter<P>(
        &self,
        stage: Stage,
        operation: &'static str,
        prepare: impl FnOnce(&mut RideSession) -> Result<P, AppError>,
    ) -> Result<(BusyGuard<'_>, P), AppError> {
        let mut session = lock(&self.session);
        let outcome = self
            .ensure_idle(&session)
            .and_then(|()| self.check_stage(&session, stage))
            .and_then(|()| prepare(&mut *session));

        match outcome {
            Ok(prepared) => {
                session.busy = true;
                session.last_error = None;
                Ok((
                    BusyGuard {
                        session: &self.session,
                    },
                    prepared,
                ))
            }
            Err(err) => Err(self.reject(&mut session, operation, err)),
        }
    }

    fn settle<T>(
        &self,
        busy: BusyGuard<'_>,
        operation: &'static str,
        result: Result<T, AppError>,
        commit: impl FnOnce(&mut RideSession, T),
    ) -> Result<SessionSnapshot, AppError> {
        let mut session = lock(&self.session);
        busy.disarm();
        session.busy = false;

        match result {
            Ok(value) => {
                commit(&mut *session, value);
                session.last_error = None;
                debug!(session_id = %self.session_id, operation, stage = %session.stage, "stage call completed");
                Ok(session.snapshot())
            }
            Err(err) => Err(self.reject(&mut session, operation, err)),
        }
    }

    fn ensure_idle(&self, session: &RideSession) -> Result<(), AppError> {
        if session.busy {
            return Err(AppError::Busy);
        }
        Ok(())
    }

    fn check_stage(&self, session: &RideSession, expected: Stage) -> Result<(), AppError> {
        if session.account.is_none() {
            return Err(AppError::Unauthenticated);
        }
        if session.stage != expected {
            return Err(AppError::InvalidStage {
                expected,
                actual: session.stage,
            });
        }
        Ok(())
    }

    fn reject(&self, session: &mut RideSession, operation: &'static str, err: AppError) -> AppError {
        match &err {
            AppError::CollaboratorUnavailable { .. } | AppError::Internal(_) => {
                warn!(session_id = %self.session_id, operation, stage = %session.stage, error = %err, "stage call failed");
            }
            _ => {
                debug!(session_id = %self.session_id, operation, error = %err, "request rejected");
            }
        }
        session.last_error = Some(err.to_string());
        err
    }
}

fn pending_booking(session: &RideSession) -> Result<Booking, AppError> {
    session
        .booking
        .clone()
        .ok_or_else(|| AppError::Internal("payment stage without a booking".to_string()))
}

fn booking_inputs(session: &RideSession, driver_id: &str) -> Result<BookingInputs, AppError> {
    let driver = session
        .drivers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|driver| driver.id == driver_id)
        .cloned()
        .ok_or_else(|| {
            AppError::validation(
                "driverId",
                format!("driver {driver_id} is not in the current listing"),
            )
        })?;

    let missing = |what: &str| AppError::Internal(format!("booking stage without {what}"));
    Ok(BookingInputs {
        driver,
        rider: session.account.clone().ok_or(AppError::Unauthenticated)?,
        pickup: session.pickup.clone().ok_or_else(|| missing("pickup"))?,
        destination: session.destination.clone().ok_or_else(|| missing("destination"))?,
        location: session.location.clone().ok_or_else(|| missing("location"))?,
    })
}
