// src/notice.rs
//
// One-shot events that are not part of the steady-state snapshot.

use serde::{Deserialize, Serialize};

use crate::io::DeviceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactoryResetOutcome {
    Completed,
    Failed,
}

/// Delivered at most once per occurrence; late subscribers never see past notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    FactoryReset { outcome: FactoryResetOutcome },
    /// Answer to a permission request issued for `device`.
    PermissionResult { device: DeviceHandle, granted: bool },
    /// The session ended without a disconnect call (read error or EOF).
    ConnectionLost { device: DeviceHandle, reason: String },
}
