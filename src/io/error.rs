// src/io/error.rs
//
// Error type for data sources. Display strings are what consumers see through
// `DataSink::on_error`, so they read as user-facing messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// The host has no serial support at all
    #[error("Serial access is not supported on this platform.")]
    Unsupported,

    /// `connect` while a connection is already up or being set up
    #[error("Already connected.")]
    AlreadyConnected,

    /// No open connection to act on
    #[error("Not connected.")]
    NotConnected,

    /// Port enumeration failed
    #[error("Failed to enumerate ports: {0}")]
    Enumerate(String),

    /// Selected port could not be opened (permission, busy, gone)
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// The device went away while streaming
    #[error("Device disconnected.")]
    DeviceDisconnected,

    /// Any other failure in the read loop
    #[error("Error reading from serial port: {0}")]
    Read(#[source] std::io::Error),

    /// Write to the device failed or timed out
    #[error("Transmit failed: {0}")]
    Transmit(String),
}

impl IoError {
    /// Classify a read-loop failure. Errors that mean the device vanished are
    /// reported as a disconnect, everything else as a read error.
    pub fn from_read_error(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::UnexpectedEof => IoError::DeviceDisconnected,
            _ => IoError::Read(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_read_error_classification() {
        assert!(matches!(
            IoError::from_read_error(Error::from(ErrorKind::BrokenPipe)),
            IoError::DeviceDisconnected
        ));
        assert!(matches!(
            IoError::from_read_error(Error::from(ErrorKind::NotConnected)),
            IoError::DeviceDisconnected
        ));
        let err = IoError::from_read_error(Error::new(ErrorKind::Other, "framing error"));
        assert_eq!(err.to_string(), "Error reading from serial port: framing error");
    }

    #[test]
    fn test_messages() {
        assert_eq!(IoError::DeviceDisconnected.to_string(), "Device disconnected.");
        let err = IoError::Open {
            port: "/dev/ttyACM0".to_string(),
            reason: "Permission denied".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open /dev/ttyACM0: Permission denied");
    }
}
