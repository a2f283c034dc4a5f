use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mastercard,
    Laposte,
    D17,
}

impl PaymentMethod {
    pub fn is_wallet(self) -> bool {
        matches!(self, PaymentMethod::D17)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PaymentMethod::Mastercard => "Mastercard",
            PaymentMethod::Laposte => "La Poste Card",
            PaymentMethod::D17 => "D17 Mobile Payment",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentForm {
    pub card_number: String,
    pub cvv: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub method_name: String,
    pub instrument_last4: String,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
    pub ride_id: String,
}
