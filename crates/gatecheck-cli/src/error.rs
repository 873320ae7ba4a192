use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] gatecheck_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Ticket identifier cannot be empty")]
    EmptyIdentifier,
    #[error("Check-in ID is not valid: {0}")]
    InvalidCheckInId(String),
    #[error("Scan record ID is not valid: {0}")]
    InvalidScanId(String),
}
