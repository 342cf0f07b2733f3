//! ---
//! ems_section: "02-device-telemetry"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy for decoding and polling a meter."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeterError>;

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("ERR_DATA_INVALID: expected a register byte buffer")]
    DataInvalid,
    #[error("ERR_DATA_INSUFFICIENT: expected {expected} bytes but received {actual}")]
    DataInsufficient { expected: usize, actual: usize },
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("ERR_NO_CLIENT: power meter requires a client factory")]
    NoClient,
    #[error("sample interval must be non-zero")]
    InvalidSampleInterval,
}

/// Failures raised by the byte source. The meter propagates these unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("register read timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("device exception: {0}")]
    Exception(String),
    #[error("client closed")]
    Closed,
}
