// src/lib.rs
//
// gatelink: host-side link to a gate-controller board over USB serial.
//
// The board speaks a line-oriented ASCII protocol. This crate frames inbound
// bytes into lines, folds each line into an immutable `DeviceState` snapshot,
// fans snapshots out to subscribers, and encodes outbound commands. The
// connection manager owns discovery, permission, open/close, and the
// per-session read loop.

#[macro_use]
mod logging;

pub mod connection;
pub mod io;
mod link;
pub mod notice;
pub mod protocol;
pub mod settings;
pub mod store;

pub use connection::ConnectionState;
pub use io::{DeviceHandle, DevicePlatform, GateError};
pub use link::GateLink;
pub use logging::{init_file_logging, stop_file_logging};
pub use notice::{FactoryResetOutcome, Notice};
pub use protocol::{Command, DeviceState};
pub use settings::GateSettings;
pub use store::StateSubscription;
