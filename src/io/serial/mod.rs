// src/io/serial/mod.rs
//
// Serial side of the gate link: line framing, line parameters, and the
// serialport-backed platform on desktop targets.

pub mod framer;
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub mod port;
pub(crate) mod utils;

pub use framer::{LineFramer, Overflow, OverflowPolicy, DEFAULT_MAX_PENDING};
pub use utils::{LineSettings, GATE_LINE};

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use port::{SerialPlatform, SerialTransport};
