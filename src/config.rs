use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub sim_latency_ms: u64,
    pub sim_failure_rate: f64,
    pub sim_seed: Option<u64>,
    pub accounts_file: Option<String>,
    pub drivers_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let sim_failure_rate: f64 = parse_or_default("SIM_FAILURE_RATE", 0.0)?;
        if !(0.0..=1.0).contains(&sim_failure_rate) {
            return Err(AppError::Internal(format!(
                "invalid SIM_FAILURE_RATE: {sim_failure_rate} is outside 0..=1"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 256)?,
            sim_latency_ms: parse_or_default("SIM_LATENCY_MS", 1500)?,
            sim_failure_rate,
            sim_seed: parse_optional("SIM_SEED")?,
            accounts_file: env::var("ACCOUNTS_FILE").ok(),
            drivers_file: env::var("DRIVERS_FILE").ok(),
        })
    }

    pub fn sim_latency(&self) -> Duration {
        Duration::from_millis(self.sim_latency_ms)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
