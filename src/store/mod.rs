pub mod accounts;
pub mod roster;

use std::fs;

use crate::error::AppError;

pub(crate) fn read_fixture(path: Option<&str>, embedded: &'static str) -> Result<String, AppError> {
    match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| AppError::Internal(format!("failed to read {path}: {err}"))),
        None => Ok(embedded.to_string()),
    }
}
