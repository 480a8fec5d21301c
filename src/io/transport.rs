// src/io/transport.rs
//
// The two seams between the connection manager and the host platform:
// a `DevicePlatform` that enumerates, authorises, and opens attachments, and
// the `Transport` it hands back for one session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::discovery::DriverKind;
use super::serial::LineSettings;
use super::GateError;

// ============================================================================
// Devices
// ============================================================================

/// A physical attachment as enumerated, before probing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDevice {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Communication endpoints (serial port paths) exposed by the device.
    pub endpoints: Vec<String>,
}

/// A probed device plus the one endpoint a session will use.
///
/// Valid for a single connection attempt; discovery produces fresh handles
/// each time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub endpoint: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub product: Option<String>,
    pub driver: DriverKind,
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:04x}:{:04x})", self.endpoint, self.vid, self.pid)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// An open, exclusively owned byte stream to the board.
///
/// `read` must return within the timeout the transport was opened with,
/// reporting `ErrorKind::TimedOut` (or `WouldBlock`) when nothing arrived.
/// `Ok(0)` means the device went away.
pub trait Transport: Send {
    fn configure(&mut self, line: &LineSettings) -> Result<(), String>;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write a whole frame and flush it.
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

/// Host-side access to attached hardware.
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    fn enumerate(&self) -> Result<Vec<AttachedDevice>, GateError>;

    /// Whether `endpoint` is still present on the host.
    fn endpoint_present(&self, endpoint: &str) -> bool;

    fn has_permission(&self, device: &DeviceHandle) -> bool;

    /// Ask the platform for access. Resolves with the outcome once known;
    /// callers publish it out-of-band.
    async fn request_permission(&self, device: &DeviceHandle) -> bool;

    fn open(
        &self,
        device: &DeviceHandle,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, String>;
}
