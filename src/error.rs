//! Error taxonomy for the hub driver.

use crate::models::SessionState;
use thiserror::Error;

/// Errors produced while resolving symbols or encoding command frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown port symbol {0:?} (expected A, B, AB, C or D)")]
    UnknownPort(String),

    #[error("unknown LED color {0:?}")]
    UnknownColor(String),

    #[error("duty cycle {0} outside -100..=100")]
    InvalidDutyCycle(i8),
}

/// Failures of the underlying BLE transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("no bluetooth adapter available")]
    AdapterUnavailable,

    #[error("characteristic {0} not available on this peripheral")]
    CharacteristicUnavailable(uuid::Uuid),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Top-level error type of the session and scanner APIs.
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The hub exposed no control characteristic during enumeration.
    #[error("control characteristic not present on this hub")]
    ControlCharacteristicMissing,

    /// An operation was issued in a state that does not permit it.
    /// No transport call is made in this case.
    #[error("invalid session state: expected {expected}, was {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },
}
