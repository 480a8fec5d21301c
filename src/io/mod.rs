// src/io/mod.rs
//
// Device access for the gate link: discovery, the transport seam, the serial
// implementation, and a scripted stand-in for tests and demos.

pub mod discovery;
mod error;
pub mod scripted;
pub mod serial;
mod transport;

pub use discovery::{DriverKind, ProbeTable, UsbOverride};
pub use error::GateError;
pub use transport::{AttachedDevice, DeviceHandle, DevicePlatform, Transport};
