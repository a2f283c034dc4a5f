use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::account::Account;
use crate::models::booking::Booking;
use crate::models::driver::DriverListing;
use crate::models::location::Location;
use crate::models::payment::{PaymentMethod, PaymentReceipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Location,
    DriverSearch,
    Booking,
    Payment,
    Confirmation,
}

impl Stage {
    pub fn number(self) -> u8 {
        match self {
            Stage::Location => 1,
            Stage::DriverSearch => 2,
            Stage::Booking => 3,
            Stage::Payment => 4,
            Stage::Confirmation => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Location => "location",
            Stage::DriverSearch => "driver_search",
            Stage::Booking => "booking",
            Stage::Payment => "payment",
            Stage::Confirmation => "confirmation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PaymentPhase {
    Idle,
    AwaitingInstrument { method: PaymentMethod },
    AwaitingCode { method: PaymentMethod, phone: String },
    Authorized { method: PaymentMethod },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub stage_number: u8,
    pub busy: bool,
    pub last_error: Option<String>,
    pub account: Option<Account>,
    pub pickup: Option<String>,
    pub destination: Option<String>,
    pub location: Option<Location>,
    pub drivers: Option<Vec<DriverListing>>,
    pub booking: Option<Booking>,
    pub payment: PaymentPhase,
    pub receipt: Option<PaymentReceipt>,
}
