// src/io/serial/utils.rs
//
// Line parameters for the gate controller and conversions to the serialport
// crate's types. The board only speaks 115200 8N1, so parity is always off
// and is not a setting.

use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Serial line parameters applied after the port is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
}

/// Fixed line parameters of the controller protocol.
pub const GATE_LINE: LineSettings = LineSettings {
    baud_rate: 115_200,
    data_bits: 8,
    stop_bits: 1,
};

impl std::fmt::Display for LineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} baud ({}-N-{})",
            self.baud_rate, self.data_bits, self.stop_bits
        )
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use conversions::*;

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
mod conversions {
    use serialport::{DataBits, StopBits};

    /// Convert data bits count to serialport crate's DataBits type
    pub fn to_serialport_data_bits(bits: u8) -> DataBits {
        match bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    /// Convert stop bits count to serialport crate's StopBits type
    pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
        match bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_line_is_8n1_115200() {
        assert_eq!(GATE_LINE.baud_rate, 115_200);
        assert_eq!(GATE_LINE.data_bits, 8);
        assert_eq!(GATE_LINE.stop_bits, 1);
        assert_eq!(GATE_LINE.to_string(), "115200 baud (8-N-1)");
    }

    #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
    #[test]
    fn test_to_serialport_types() {
        use serialport::{DataBits, StopBits};

        assert!(matches!(to_serialport_data_bits(8), DataBits::Eight));
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(9), DataBits::Eight)); // default
        assert!(matches!(to_serialport_stop_bits(1), StopBits::One));
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
    }
}
