// src/io/error.rs
//
// Error type for the gate link. Protocol noise never becomes an error; only
// transport failures, caller misuse, and settings problems do.

use thiserror::Error;

/// Errors surfaced by discovery, connection, transmit, and settings handling.
#[derive(Debug, Error)]
pub enum GateError {
    /// Enumeration found nothing the probe tables accept.
    #[error("no compatible gate controller found")]
    NoCompatibleDevice,

    /// Enumerating attached devices failed outright.
    #[error("failed to enumerate devices: {0}")]
    Enumerate(String),

    /// Access has not been granted yet; a request has been issued.
    #[error("{device}: permission required, request issued")]
    PermissionRequired { device: String },

    /// Access is still denied after the caller retried.
    #[error("{device}: permission denied")]
    PermissionDenied { device: String },

    /// The chosen device no longer exposes its communication endpoint.
    #[error("{device}: communication endpoint missing")]
    MissingEndpoint { device: String },

    #[error("{device}: open failed: {reason}")]
    Open { device: String, reason: String },

    /// Setting baud rate, data bits, stop bits, or parity failed.
    #[error("{device}: line configuration failed: {reason}")]
    Configure { device: String, reason: String },

    #[error("write timed out after {timeout_ms} ms")]
    WriteTimeout { timeout_ms: u64 },

    #[error("write failed: {0}")]
    Write(String),

    #[error("read failed: {0}")]
    Read(String),

    /// A command was submitted with no live session.
    #[error("not connected")]
    NotConnected,

    /// The line framer residual grew past its cap under the `Fail` policy.
    #[error("pending line exceeded {limit} bytes")]
    FramerOverflow { limit: usize },

    #[error("settings: {0}")]
    Settings(String),

    #[error("log file: {0}")]
    LogFile(#[from] std::io::Error),
}

impl GateError {
    pub fn open(device: impl Into<String>, reason: impl ToString) -> Self {
        GateError::Open {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn configure(device: impl Into<String>, reason: impl ToString) -> Self {
        GateError::Configure {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn settings(reason: impl ToString) -> Self {
        GateError::Settings(reason.to_string())
    }

    /// Transport errors end or prevent a session; misuse errors do not.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            GateError::NotConnected | GateError::Settings(_) | GateError::LogFile(_)
        )
    }
}

impl From<GateError> for String {
    fn from(e: GateError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_device() {
        let e = GateError::open("/dev/ttyUSB0", "busy");
        assert_eq!(e.to_string(), "/dev/ttyUSB0: open failed: busy");
    }

    #[test]
    fn test_misuse_is_not_transport() {
        assert!(!GateError::NotConnected.is_transport());
        assert!(GateError::WriteTimeout { timeout_ms: 500 }.is_transport());
        assert!(GateError::NoCompatibleDevice.is_transport());
    }

    #[test]
    fn test_into_string() {
        let s: String = GateError::NotConnected.into();
        assert_eq!(s, "not connected");
    }
}
