use crate::models::booking::Fare;

pub const BASE_PRICE: f64 = 5.0;

pub const PER_KM_RATE: f64 = 2.0;

pub const CURRENCY: &str = "TND";

/// Price a trip: `total = (BASE_PRICE + distance_km * PER_KM_RATE) * price_multiplier`,
/// with the distance component and the total rounded half-up to cents.
pub fn price(distance_km: f64, price_multiplier: f64) -> Fare {
    let distance_price = distance_km * PER_KM_RATE;
    let total = (BASE_PRICE + distance_price) * price_multiplier;

    Fare {
        base_price: BASE_PRICE,
        distance_price: round_dp(distance_price, 2),
        total: round_dp(total, 2),
        currency: CURRENCY.to_string(),
    }
}

pub fn estimated_duration_minutes(distance_km: f64) -> u32 {
    (distance_km.max(0.0) * 2.5).floor() as u32
}

pub(crate) fn round_dp(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
