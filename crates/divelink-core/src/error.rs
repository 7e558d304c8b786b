//! Device level error type.

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Insufficient memory")]
    NoMemory,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DeviceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Transport(TransportError::Timeout { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_pass_through() {
        let err: DeviceError = TransportError::Timeout { timeout_ms: 3000 }.into();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout after 3000ms");

        let err: DeviceError = TransportError::Disconnected.into();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Device disconnected");
    }

    #[test]
    fn test_error_display() {
        let err = DeviceError::Protocol("Unexpected answer header".into());
        assert_eq!(err.to_string(), "Protocol error: Unexpected answer header");

        let err = DeviceError::Unsupported {
            operation: "timesync",
        };
        assert_eq!(err.to_string(), "Operation not supported: timesync");
    }
}
