// src/protocol/mod.rs
//
// Line-oriented ASCII protocol spoken by the gate controller board.
//
//   host -> board:  KEY\r\n  or  KEY=VALUE\r\n
//   board -> host:  KEY=VALUE\n  (optional \r before \n); lines without '=' are acks

pub mod catalog;
pub mod command;
pub mod parser;
pub mod state;

pub use catalog::{catalog, keys, Catalog, CatalogEntry, Decoder};
pub use command::{encode, encode_frame, Command};
pub use parser::{apply, interpret, Interpretation};
pub use state::{
    BoardTest, Configuration, DeviceState, GatePosition, LedColor, Monitoring, OnOff,
    TriggerPosition, Usage, WireToken,
};
