// src/protocol/state.rs
//
// Aggregated device snapshot. Three zones (monitoring, configuration, board
// test) are updated independently by different wire keys but travel together
// as one immutable value.

use serde::{Deserialize, Serialize};

// ============================================================================
// Wire Tokens
// ============================================================================

/// Enumerated value carried as a symbolic token on the wire.
pub trait WireToken: Sized + Copy {
    /// Match an already-normalised token (trimmed, spaces replaced by `_`).
    /// Matching is case-insensitive.
    fn from_wire(token: &str) -> Option<Self>;

    /// Canonical symbol sent by the host.
    fn as_wire(self) -> &'static str;
}

/// Normalise and decode a token. Unknown symbols yield `None`.
pub fn decode_token<T: WireToken>(raw: &str) -> Option<T> {
    let normalised = raw.trim().replace(' ', "_");
    T::from_wire(&normalised)
}

/// Declares a token enum together with its wire symbols. The first symbol of
/// each variant is canonical; any further ones are accepted aliases.
macro_rules! wire_token {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $($variant:ident => $sym:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl WireToken for $name {
            fn from_wire(token: &str) -> Option<Self> {
                $(
                    if token.eq_ignore_ascii_case($sym) $(|| token.eq_ignore_ascii_case($alias))* {
                        return Some($name::$variant);
                    }
                )+
                None
            }

            fn as_wire(self) -> &'static str {
                match self {
                    $($name::$variant => $sym),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_wire())
            }
        }
    };
}

wire_token! {
    /// Binary output or sensor state.
    OnOff, default = Off {
        On => "ON" | "1",
        Off => "OFF" | "0",
    }
}

wire_token! {
    /// Gate travel state as reported by the controller.
    GatePosition, default = Unknown {
        Unknown => "UNKNOWN",
        Open => "OPEN" | "OPENED",
        Opening => "OPENING",
        Closed => "CLOSE" | "CLOSED",
        Closing => "CLOSING",
        Stopped => "STOP" | "STOPPED",
    }
}

wire_token! {
    /// Whether an optional peripheral is enabled in configuration.
    Usage, default = NotUse {
        Use => "USE",
        NotUse => "NOT_USE" | "UNUSE",
    }
}

wire_token! {
    /// Point in the travel cycle at which an output switches.
    TriggerPosition, default = OpenStart {
        OpenStart => "OPEN_START",
        OpenEnd => "OPEN_END",
        CloseStart => "CLOSE_START",
        CloseEnd => "CLOSE_END",
    }
}

wire_token! {
    LedColor, default = Off {
        Off => "OFF",
        Red => "RED",
        Green => "GREEN",
        Blue => "BLUE",
        Yellow => "YELLOW",
        Cyan => "CYAN",
        Magenta => "MAGENTA",
        White => "WHITE",
    }
}

impl OnOff {
    pub fn is_on(self) -> bool {
        self == OnOff::On
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Live status echoed by the controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitoring {
    pub gate: GatePosition,
    pub lamp: OnOff,
    pub led: OnOff,
    pub relay1: OnOff,
    pub relay2: OnOff,
    pub photo1: OnOff,
    pub photo2: OnOff,
    pub open1: OnOff,
    pub open2: OnOff,
    pub open3: OnOff,
    pub close1: OnOff,
    pub close2: OnOff,
    pub close3: OnOff,
    pub loop_a: OnOff,
    pub loop_b: OnOff,
    /// Free text, e.g. "24.1V"
    pub main_power: String,
    pub test_count: String,
    pub delay_time: String,
    pub test_running: bool,
}

/// Persistent board configuration as last read back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub version: String,
    pub open_level: i32,
    pub close_level: i32,
    pub lamp_usage: Usage,
    pub buzzer_usage: Usage,
    pub lamp_on_position: TriggerPosition,
    pub lamp_off_position: TriggerPosition,
    pub led_open_color: LedColor,
    pub led_open_position: TriggerPosition,
    pub led_close_color: LedColor,
    pub led_close_position: TriggerPosition,
    pub loop_a_usage: Usage,
    pub loop_b_usage: Usage,
    /// Seconds
    pub delay_time: i32,
    pub relay1_mode: i32,
    pub relay2_mode: i32,
}

/// Board self-test: outputs commanded by the host and inputs sensed by the board.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardTest {
    pub lamp: OnOff,
    pub relay1: OnOff,
    pub relay2: OnOff,
    pub led: LedColor,
    pub position: GatePosition,
    pub photo1: OnOff,
    pub photo2: OnOff,
    pub loop_a: OnOff,
    pub loop_b: OnOff,
    pub open1: OnOff,
    pub open2: OnOff,
    pub open3: OnOff,
    pub close1: OnOff,
    pub close2: OnOff,
    pub close3: OnOff,
    pub switch_open: OnOff,
    pub switch_close: OnOff,
    pub gate: GatePosition,
}

/// One immutable snapshot of everything known about the board.
///
/// A new snapshot is only ever derived from a prior one by applying a single
/// decoded key/value pair; every field not addressed by that key is carried
/// over unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub monitor: Monitoring,
    pub config: Configuration,
    pub board_test: BoardTest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_case_insensitive() {
        assert_eq!(decode_token::<OnOff>("on"), Some(OnOff::On));
        assert_eq!(decode_token::<OnOff>("Off"), Some(OnOff::Off));
        assert_eq!(decode_token::<OnOff>("1"), Some(OnOff::On));
    }

    #[test]
    fn test_token_spaces_normalised() {
        assert_eq!(decode_token::<Usage>("not use"), Some(Usage::NotUse));
        assert_eq!(
            decode_token::<TriggerPosition>(" close end "),
            Some(TriggerPosition::CloseEnd)
        );
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(decode_token::<OnOff>("BOGUS"), None);
        assert_eq!(decode_token::<LedColor>(""), None);
    }

    #[test]
    fn test_alias_decodes_to_canonical() {
        let pos = decode_token::<GatePosition>("closed").unwrap();
        assert_eq!(pos, GatePosition::Closed);
        assert_eq!(pos.as_wire(), "CLOSE");
    }

    #[test]
    fn test_defaults() {
        let state = DeviceState::default();
        assert_eq!(state.monitor.gate, GatePosition::Unknown);
        assert_eq!(state.monitor.lamp, OnOff::Off);
        assert_eq!(state.config.version, "");
        assert_eq!(state.config.delay_time, 0);
        assert_eq!(state.board_test.led, LedColor::Off);
    }

    #[test]
    fn test_snapshot_serializes_tokens() {
        let mut state = DeviceState::default();
        state.config.led_open_color = LedColor::Magenta;
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["config"]["led_open_color"], "MAGENTA");
    }
}
