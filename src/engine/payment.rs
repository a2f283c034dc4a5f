use std::sync::{Arc, OnceLock};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::{PaymentForm, PaymentMethod};
use crate::models::session::PaymentPhase;
use crate::services::notifier::{Notifier, VerificationNotice};

pub const DEMO_MASTERCARD_NUMBER: &str = "5555555555554444";
pub const DEMO_LAPOSTE_NUMBER: &str = "9000111122223333";
pub const DEMO_WALLET_PHONE: &str = "22334455";

static MASTERCARD_RE: OnceLock<Regex> = OnceLock::new();
static LAPOSTE_RE: OnceLock<Regex> = OnceLock::new();
static CVV_RE: OnceLock<Regex> = OnceLock::new();
static PHONE_RE: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(pattern)
            .unwrap_or_else(|error| panic!("payment pattern {pattern} failed to compile: {error}"))
    })
}

pub fn clean_card_number(number: &str) -> String {
    number.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn validate_card_number(number: &str, method: PaymentMethod) -> bool {
    let cleaned = clean_card_number(number);
    match method {
        PaymentMethod::Mastercard => {
            pattern(&MASTERCARD_RE, r"^5[1-5][0-9]{14}$").is_match(&cleaned)
                || cleaned == DEMO_MASTERCARD_NUMBER
        }
        PaymentMethod::Laposte => {
            pattern(&LAPOSTE_RE, r"^9[0-9]{15}$").is_match(&cleaned)
                || cleaned == DEMO_LAPOSTE_NUMBER
        }
        PaymentMethod::D17 => false,
    }
}

pub fn validate_cvv(cvv: &str) -> bool {
    pattern(&CVV_RE, r"^[0-9]{3,4}$").is_match(cvv)
}

pub fn validate_phone(phone: &str) -> bool {
    pattern(&PHONE_RE, r"^[0-9]{8}$").is_match(phone) || phone == DEMO_WALLET_PHONE
}

pub fn generate_code(rng: &mut impl Rng) -> String {
    rng.gen_range(100_000..=999_999u32).to_string()
}

fn last4(value: &str) -> String {
    let len = value.chars().count();
    value.chars().skip(len.saturating_sub(4)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    pub method: PaymentMethod,
    pub instrument_last4: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Approved(Authorization),
    CodeSent { phone: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
enum AuthorizationState {
    #[default]
    Idle,
    AwaitingInstrument {
        method: PaymentMethod,
    },
    AwaitingCode {
        method: PaymentMethod,
        phone: String,
        code: String,
    },
    Authorized(Authorization),
}

/// Per-session authorization state machine. The wallet code only travels
/// through the [`Notifier`] and is never part of a return value.
///
/// `Validating` and `Verifying` are not stored: they last for the duration of
/// [`PaymentAuthorizer::submit_details`] and [`PaymentAuthorizer::verify_code`].
/// Neither call moves the machine to `Authorized`; the orchestrator does that
/// with [`PaymentAuthorizer::mark_authorized`] once the gateway has settled.
pub struct PaymentAuthorizer {
    session_id: Uuid,
    notifier: Arc<dyn Notifier>,
    rng: StdRng,
    state: AuthorizationState,
}

impl PaymentAuthorizer {
    pub fn new(session_id: Uuid, notifier: Arc<dyn Notifier>, rng: StdRng) -> Self {
        Self {
            session_id,
            notifier,
            rng,
            state: AuthorizationState::Idle,
        }
    }

    pub fn phase(&self) -> PaymentPhase {
        match &self.state {
            AuthorizationState::Idle => PaymentPhase::Idle,
            AuthorizationState::AwaitingInstrument { method } => {
                PaymentPhase::AwaitingInstrument { method: *method }
            }
            AuthorizationState::AwaitingCode { method, phone, .. } => PaymentPhase::AwaitingCode {
                method: *method,
                phone: phone.clone(),
            },
            AuthorizationState::Authorized(authorization) => PaymentPhase::Authorized {
                method: authorization.method,
            },
        }
    }

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), AppError> {
        if let AuthorizationState::Authorized(_) = self.state {
            return Err(AppError::validation("method", "payment already authorized"));
        }
        self.state = AuthorizationState::AwaitingInstrument { method };
        Ok(())
    }

    pub fn submit_details(&mut self, form: &PaymentForm) -> Result<Submission, AppError> {
        let method = match &self.state {
            AuthorizationState::AwaitingInstrument { method } => *method,
            AuthorizationState::Idle => {
                return Err(AppError::validation("method", "select a payment method first"));
            }
            AuthorizationState::AwaitingCode { .. } => {
                return Err(AppError::validation(
                    "verificationCode",
                    "a verification code is pending, submit it or choose another method",
                ));
            }
            AuthorizationState::Authorized(_) => {
                return Err(AppError::validation("method", "payment already authorized"));
            }
        };

        if method.is_wallet() {
            return self.send_code(method, &form.phone_number);
        }

        if !validate_card_number(&form.card_number, method) {
            let brand = match method {
                PaymentMethod::Mastercard => "Mastercard",
                _ => "La Poste",
            };
            return Err(AppError::validation(
                "cardNumber",
                format!("Invalid {brand} card number"),
            ));
        }
        if !validate_cvv(&form.cvv) {
            return Err(AppError::validation("cvv", "Invalid CVV code"));
        }

        Ok(Submission::Approved(Authorization {
            method,
            instrument_last4: last4(&clean_card_number(&form.card_number)),
        }))
    }

    fn send_code(&mut self, method: PaymentMethod, phone: &str) -> Result<Submission, AppError> {
        if !validate_phone(phone) {
            return Err(AppError::validation(
                "phoneNumber",
                "Invalid phone number (8 digits required)",
            ));
        }

        let code = generate_code(&mut self.rng);
        self.notifier.send_code(VerificationNotice {
            session_id: self.session_id,
            phone: phone.to_string(),
            code: code.clone(),
            sent_at: Utc::now(),
        });
        info!(session_id = %self.session_id, "verification code sent");

        self.state = AuthorizationState::AwaitingCode {
            method,
            phone: phone.to_string(),
            code,
        };

        Ok(Submission::CodeSent {
            phone: phone.to_string(),
        })
    }

    /// Exact match against the pending code. A mismatch keeps the same code
    /// pending; there is no retry limit and no expiry.
    pub fn verify_code(&self, submitted: &str) -> Result<Authorization, AppError> {
        match &self.state {
            AuthorizationState::AwaitingCode {
                method,
                phone,
                code,
            } => {
                if submitted == code {
                    Ok(Authorization {
                        method: *method,
                        instrument_last4: last4(phone),
                    })
                } else {
                    Err(AppError::CodeMismatch)
                }
            }
            _ => Err(AppError::validation(
                "verificationCode",
                "no verification code is pending",
            )),
        }
    }

    pub fn mark_authorized(&mut self, authorization: Authorization) {
        self.state = AuthorizationState::Authorized(authorization);
    }

    pub fn reset(&mut self) {
        self.state = AuthorizationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    use super::{
        generate_code, validate_card_number, validate_cvv, validate_phone, PaymentAuthorizer,
        Submission, DEMO_LAPOSTE_NUMBER, DEMO_MASTERCARD_NUMBER,
    };
    use crate::error::AppError;
    use crate::models::payment::{PaymentForm, PaymentMethod};
    use crate::models::session::PaymentPhase;
    use crate::services::notifier::recording::RecordingNotifier;

    fn authorizer() -> (PaymentAuthorizer, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let authorizer =
            PaymentAuthorizer::new(Uuid::new_v4(), notifier.clone(), StdRng::seed_from_u64(7));
        (authorizer, notifier)
    }

    fn card(number: &str, cvv: &str) -> PaymentForm {
        PaymentForm {
            card_number: number.to_string(),
            cvv: cvv.to_string(),
            ..PaymentForm::default()
        }
    }

    fn wallet(phone: &str) -> PaymentForm {
        PaymentForm {
            phone_number: phone.to_string(),
            ..PaymentForm::default()
        }
    }

    #[test]
    fn card_patterns_per_brand() {
        assert!(validate_card_number("5212345678901234", PaymentMethod::Mastercard));
        assert!(validate_card_number("5212 3456 7890 1234", PaymentMethod::Mastercard));
        assert!(!validate_card_number("5612345678901234", PaymentMethod::Mastercard));
        assert!(!validate_card_number("521234567890123", PaymentMethod::Mastercard));
        assert!(validate_card_number(DEMO_MASTERCARD_NUMBER, PaymentMethod::Mastercard));

        assert!(validate_card_number("9123456789012345", PaymentMethod::Laposte));
        assert!(validate_card_number(DEMO_LAPOSTE_NUMBER, PaymentMethod::Laposte));
        assert!(!validate_card_number("5212345678901234", PaymentMethod::Laposte));

        assert!(!validate_card_number("5212345678901234", PaymentMethod::D17));
    }

    #[test]
    fn cvv_and_phone_patterns() {
        assert!(validate_cvv("123"));
        assert!(validate_cvv("1234"));
        assert!(!validate_cvv("12"));
        assert!(!validate_cvv("12a"));

        assert!(validate_phone("98765432"));
        assert!(validate_phone("22334455"));
        assert!(!validate_phone("9876543"));
        assert!(!validate_phone("+21698765432"));
    }

    #[test]
    fn codes_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let code = generate_code(&mut rng);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn details_require_a_method() {
        let (mut authorizer, _) = authorizer();
        let err = authorizer
            .submit_details(&card(DEMO_MASTERCARD_NUMBER, "123"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "method", .. }));
    }

    #[test]
    fn short_cvv_is_rejected_and_resubmission_allowed() {
        let (mut authorizer, _) = authorizer();
        authorizer.select_method(PaymentMethod::Mastercard).unwrap();

        let err = authorizer
            .submit_details(&card(DEMO_MASTERCARD_NUMBER, "12"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "cvv", .. }));
        assert_eq!(
            authorizer.phase(),
            PaymentPhase::AwaitingInstrument {
                method: PaymentMethod::Mastercard
            }
        );

        let submission = authorizer
            .submit_details(&card("5555 5555 5555 4444", "123"))
            .unwrap();
        match submission {
            Submission::Approved(authorization) => {
                assert_eq!(authorization.instrument_last4, "4444");
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn bad_card_number_names_the_brand() {
        let (mut authorizer, _) = authorizer();
        authorizer.select_method(PaymentMethod::Laposte).unwrap();

        let err = authorizer
            .submit_details(&card("1234567890123456", "123"))
            .unwrap_err();
        assert_eq!(
            err,
            AppError::validation("cardNumber", "Invalid La Poste card number")
        );
    }

    #[test]
    fn wallet_code_goes_out_of_band_only() {
        let (mut authorizer, notifier) = authorizer();
        authorizer.select_method(PaymentMethod::D17).unwrap();

        let submission = authorizer.submit_details(&wallet("22334455")).unwrap();
        assert_eq!(
            submission,
            Submission::CodeSent {
                phone: "22334455".to_string()
            }
        );

        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].phone, "22334455");
        assert_eq!(notices[0].code.len(), 6);
        assert!(matches!(authorizer.phase(), PaymentPhase::AwaitingCode { .. }));
    }

    #[test]
    fn wrong_code_keeps_same_code_pending() {
        let (mut authorizer, notifier) = authorizer();
        authorizer.select_method(PaymentMethod::D17).unwrap();
        authorizer.submit_details(&wallet("98765432")).unwrap();
        let code = notifier.last_code().unwrap();
        let wrong = if code == "111111" { "222222" } else { "111111" };

        assert_eq!(authorizer.verify_code(wrong), Err(AppError::CodeMismatch));
        assert_eq!(authorizer.verify_code(wrong), Err(AppError::CodeMismatch));
        assert!(matches!(authorizer.phase(), PaymentPhase::AwaitingCode { .. }));
        assert_eq!(notifier.notices().len(), 1);

        let authorization = authorizer.verify_code(&code).unwrap();
        assert_eq!(authorization.method, PaymentMethod::D17);
        assert_eq!(authorization.instrument_last4, "5432");

        authorizer.mark_authorized(authorization);
        assert_eq!(
            authorizer.phase(),
            PaymentPhase::Authorized {
                method: PaymentMethod::D17
            }
        );
    }

    #[test]
    fn invalid_phone_sends_nothing() {
        let (mut authorizer, notifier) = authorizer();
        authorizer.select_method(PaymentMethod::D17).unwrap();

        let err = authorizer.submit_details(&wallet("1234")).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "phoneNumber", .. }));
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn switching_method_discards_pending_code() {
        let (mut authorizer, _) = authorizer();
        authorizer.select_method(PaymentMethod::D17).unwrap();
        authorizer.submit_details(&wallet("22334455")).unwrap();

        authorizer.select_method(PaymentMethod::Mastercard).unwrap();
        assert!(authorizer.verify_code("123456").is_err());
        assert_eq!(
            authorizer.phase(),
            PaymentPhase::AwaitingInstrument {
                method: PaymentMethod::Mastercard
            }
        );
    }
}
