// src/protocol/catalog.rs
//
// The single table of wire keys shared by the command encoder and the
// response parser. Built once on first use; lookups are exact, case-sensitive
// string matches.
//
// Key families:
//   AT+ST*     status echoes (monitoring zone)
//   curr_*     configuration, written by the host and echoed by the board
//   AT+CTRL*   board-test outputs commanded by the host
//   AT+IN*     board-test inputs sensed by the board
//   AT+<verb>  actions (open, close, stop, test, factory reset, read config)

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::state::{decode_token, DeviceState};
use crate::notice::{FactoryResetOutcome, Notice};

// ============================================================================
// Keys
// ============================================================================

pub mod keys {
    // Status echoes
    pub const STATUS_GATE: &str = "AT+STGATE";
    pub const STATUS_LAMP: &str = "AT+STLAMP";
    pub const STATUS_LED: &str = "AT+STLED";
    pub const STATUS_RELAY1: &str = "AT+STRELAY1";
    pub const STATUS_RELAY2: &str = "AT+STRELAY2";
    pub const STATUS_PHOTO1: &str = "AT+STPHOTO1";
    pub const STATUS_PHOTO2: &str = "AT+STPHOTO2";
    pub const STATUS_OPEN1: &str = "AT+STOPEN1";
    pub const STATUS_OPEN2: &str = "AT+STOPEN2";
    pub const STATUS_OPEN3: &str = "AT+STOPEN3";
    pub const STATUS_CLOSE1: &str = "AT+STCLOSE1";
    pub const STATUS_CLOSE2: &str = "AT+STCLOSE2";
    pub const STATUS_CLOSE3: &str = "AT+STCLOSE3";
    /// Older firmware reports close sensor 3 under this key.
    pub const STATUS_CLOSE3_ALIAS: &str = "AT+STCLS3";
    pub const STATUS_LOOP_A: &str = "AT+STLOOPA";
    pub const STATUS_LOOP_B: &str = "AT+STLOOPB";
    pub const STATUS_MAIN_POWER: &str = "AT+STMAINPOWER";
    pub const STATUS_TEST_COUNT: &str = "AT+STTESTCOUNT";
    pub const STATUS_DELAY_TIME: &str = "AT+STDELAYTIME";
    pub const STATUS_TEST: &str = "AT+STTEST";

    // Configuration
    pub const CONF_VERSION: &str = "curr_version";
    pub const CONF_OPEN_LEVEL: &str = "curr_openLevel";
    pub const CONF_CLOSE_LEVEL: &str = "curr_closeLevel";
    pub const CONF_LAMP_USAGE: &str = "curr_lampUsage";
    pub const CONF_BUZZER_USAGE: &str = "curr_buzzerUsage";
    pub const CONF_LAMP_ON_POSITION: &str = "curr_lampOnPosition";
    pub const CONF_LAMP_OFF_POSITION: &str = "curr_lampOffPosition";
    pub const CONF_LED_OPEN_COLOR: &str = "curr_ledOpenColor";
    pub const CONF_LED_OPEN_POSITION: &str = "curr_ledOpenPosition";
    pub const CONF_LED_CLOSE_COLOR: &str = "curr_ledCloseColor";
    pub const CONF_LED_CLOSE_POSITION: &str = "curr_ledClosePosition";
    pub const CONF_LOOP_A_USAGE: &str = "curr_loopAUsage";
    pub const CONF_LOOP_B_USAGE: &str = "curr_loopBUsage";
    pub const CONF_DELAY_TIME: &str = "curr_delayTime";
    pub const CONF_RELAY1_MODE: &str = "curr_relay1Mode";
    pub const CONF_RELAY2_MODE: &str = "curr_relay2Mode";

    // Actions
    pub const ACTION_OPEN: &str = "AT+OPEN";
    pub const ACTION_CLOSE: &str = "AT+CLOSE";
    pub const ACTION_STOP: &str = "AT+STOP";
    pub const ACTION_TEST_START: &str = "AT+TESTSTART";
    pub const ACTION_TEST_STOP: &str = "AT+TESTSTOP";
    pub const ACTION_FACTORY_RESET: &str = "AT+FACTORYRESET";
    pub const ACTION_READ_CONFIG: &str = "AT+READCONF";

    // Board test outputs
    pub const CTRL_LAMP: &str = "AT+CTRLLAMP";
    pub const CTRL_RELAY1: &str = "AT+CTRLRELAY1";
    pub const CTRL_RELAY2: &str = "AT+CTRLRELAY2";
    pub const CTRL_LED: &str = "AT+CTRLLED";
    pub const CTRL_POSITION: &str = "AT+CTRLPOSITION";

    // Board test inputs
    pub const IN_PHOTO1: &str = "AT+INPHOTO1";
    pub const IN_PHOTO2: &str = "AT+INPHOTO2";
    pub const IN_LOOP_A: &str = "AT+INLOOPA";
    pub const IN_LOOP_B: &str = "AT+INLOOPB";
    pub const IN_OPEN1: &str = "AT+INOPEN1";
    pub const IN_OPEN2: &str = "AT+INOPEN2";
    pub const IN_OPEN3: &str = "AT+INOPEN3";
    pub const IN_CLOSE1: &str = "AT+INCLOSE1";
    pub const IN_CLOSE2: &str = "AT+INCLOSE2";
    pub const IN_CLOSE3: &str = "AT+INCLOSE3";
    pub const IN_SWITCH_OPEN: &str = "AT+INSWOPEN";
    pub const IN_SWITCH_CLOSE: &str = "AT+INSWCLOSE";
    pub const TEST_GATE: &str = "AT+TESTGATE";
}

// ============================================================================
// Entries
// ============================================================================

/// How the value half of `KEY=VALUE` is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Best-effort signed integer; failure keeps the prior value.
    Integer,
    /// Case-insensitive enumerated symbol; unknown symbols keep the prior value.
    Token,
    /// Stored verbatim.
    Text,
    /// No value is decoded (outbound-only action keys).
    None,
}

/// Writes a decoded value into a snapshot. Returns `false` when the value did
/// not decode, in which case the snapshot must be left untouched.
pub type FieldUpdate = fn(&mut DeviceState, &str) -> bool;

#[derive(Clone, Copy)]
pub enum Effect {
    /// Updates exactly one snapshot field.
    Field(FieldUpdate),
    /// Produces a one-shot notice instead of touching the snapshot.
    Notice(fn(&str) -> Notice),
    /// Outbound command; inbound echoes are inert.
    Action,
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Field(_) => f.write_str("Field"),
            Effect::Notice(_) => f.write_str("Notice"),
            Effect::Action => f.write_str("Action"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub decoder: Decoder,
    pub effect: Effect,
}

fn decode_integer(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

/// Builds a field entry. The decoder kind and the update closure come from the
/// same token so the two can never disagree.
macro_rules! field {
    ($key:expr, token, $zone:ident . $field:ident) => {
        CatalogEntry {
            key: $key,
            decoder: Decoder::Token,
            effect: Effect::Field(|s, v| match decode_token(v) {
                Some(t) => {
                    s.$zone.$field = t;
                    true
                }
                None => false,
            }),
        }
    };
    ($key:expr, integer, $zone:ident . $field:ident) => {
        CatalogEntry {
            key: $key,
            decoder: Decoder::Integer,
            effect: Effect::Field(|s, v| match decode_integer(v) {
                Some(n) => {
                    s.$zone.$field = n;
                    true
                }
                None => false,
            }),
        }
    };
    ($key:expr, text, $zone:ident . $field:ident) => {
        CatalogEntry {
            key: $key,
            decoder: Decoder::Text,
            effect: Effect::Field(|s, v| {
                s.$zone.$field = v.to_string();
                true
            }),
        }
    };
}

fn action(key: &'static str) -> CatalogEntry {
    CatalogEntry {
        key,
        decoder: Decoder::None,
        effect: Effect::Action,
    }
}

fn factory_reset_notice(value: &str) -> Notice {
    if value.trim().eq_ignore_ascii_case("OK") {
        Notice::FactoryReset { outcome: FactoryResetOutcome::Completed }
    } else {
        Notice::FactoryReset { outcome: FactoryResetOutcome::Failed }
    }
}

fn entries() -> Vec<CatalogEntry> {
    use keys::*;

    vec![
        // Monitoring
        field!(STATUS_GATE, token, monitor.gate),
        field!(STATUS_LAMP, token, monitor.lamp),
        field!(STATUS_LED, token, monitor.led),
        field!(STATUS_RELAY1, token, monitor.relay1),
        field!(STATUS_RELAY2, token, monitor.relay2),
        field!(STATUS_PHOTO1, token, monitor.photo1),
        field!(STATUS_PHOTO2, token, monitor.photo2),
        field!(STATUS_OPEN1, token, monitor.open1),
        field!(STATUS_OPEN2, token, monitor.open2),
        field!(STATUS_OPEN3, token, monitor.open3),
        field!(STATUS_CLOSE1, token, monitor.close1),
        field!(STATUS_CLOSE2, token, monitor.close2),
        field!(STATUS_CLOSE3, token, monitor.close3),
        field!(STATUS_CLOSE3_ALIAS, token, monitor.close3),
        field!(STATUS_LOOP_A, token, monitor.loop_a),
        field!(STATUS_LOOP_B, token, monitor.loop_b),
        field!(STATUS_MAIN_POWER, text, monitor.main_power),
        field!(STATUS_TEST_COUNT, text, monitor.test_count),
        field!(STATUS_DELAY_TIME, text, monitor.delay_time),
        CatalogEntry {
            key: STATUS_TEST,
            decoder: Decoder::Token,
            effect: Effect::Field(|s, v| match decode_token::<super::state::OnOff>(v) {
                Some(t) => {
                    s.monitor.test_running = t.is_on();
                    true
                }
                None => false,
            }),
        },
        // Configuration
        field!(CONF_VERSION, text, config.version),
        field!(CONF_OPEN_LEVEL, integer, config.open_level),
        field!(CONF_CLOSE_LEVEL, integer, config.close_level),
        field!(CONF_LAMP_USAGE, token, config.lamp_usage),
        field!(CONF_BUZZER_USAGE, token, config.buzzer_usage),
        field!(CONF_LAMP_ON_POSITION, token, config.lamp_on_position),
        field!(CONF_LAMP_OFF_POSITION, token, config.lamp_off_position),
        field!(CONF_LED_OPEN_COLOR, token, config.led_open_color),
        field!(CONF_LED_OPEN_POSITION, token, config.led_open_position),
        field!(CONF_LED_CLOSE_COLOR, token, config.led_close_color),
        field!(CONF_LED_CLOSE_POSITION, token, config.led_close_position),
        field!(CONF_LOOP_A_USAGE, token, config.loop_a_usage),
        field!(CONF_LOOP_B_USAGE, token, config.loop_b_usage),
        field!(CONF_DELAY_TIME, integer, config.delay_time),
        field!(CONF_RELAY1_MODE, integer, config.relay1_mode),
        field!(CONF_RELAY2_MODE, integer, config.relay2_mode),
        // Actions
        action(ACTION_OPEN),
        action(ACTION_CLOSE),
        action(ACTION_STOP),
        action(ACTION_TEST_START),
        action(ACTION_TEST_STOP),
        action(ACTION_READ_CONFIG),
        CatalogEntry {
            key: ACTION_FACTORY_RESET,
            decoder: Decoder::Token,
            effect: Effect::Notice(factory_reset_notice),
        },
        // Board test outputs
        field!(CTRL_LAMP, token, board_test.lamp),
        field!(CTRL_RELAY1, token, board_test.relay1),
        field!(CTRL_RELAY2, token, board_test.relay2),
        field!(CTRL_LED, token, board_test.led),
        field!(CTRL_POSITION, token, board_test.position),
        // Board test inputs
        field!(IN_PHOTO1, token, board_test.photo1),
        field!(IN_PHOTO2, token, board_test.photo2),
        field!(IN_LOOP_A, token, board_test.loop_a),
        field!(IN_LOOP_B, token, board_test.loop_b),
        field!(IN_OPEN1, token, board_test.open1),
        field!(IN_OPEN2, token, board_test.open2),
        field!(IN_OPEN3, token, board_test.open3),
        field!(IN_CLOSE1, token, board_test.close1),
        field!(IN_CLOSE2, token, board_test.close2),
        field!(IN_CLOSE3, token, board_test.close3),
        field!(IN_SWITCH_OPEN, token, board_test.switch_open),
        field!(IN_SWITCH_CLOSE, token, board_test.switch_close),
        field!(TEST_GATE, token, board_test.gate),
    ]
}

// ============================================================================
// Catalog
// ============================================================================

pub struct Catalog {
    by_key: HashMap<&'static str, CatalogEntry>,
}

impl Catalog {
    fn build() -> Self {
        let mut by_key = HashMap::new();
        for entry in entries() {
            by_key.insert(entry.key, entry);
        }
        Catalog { by_key }
    }

    /// Exact key lookup; no prefix or case folding.
    pub fn lookup(&self, key: &str) -> Option<&CatalogEntry> {
        self.by_key.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }
}

static CATALOG: Lazy<Catalog> = Lazy::new(Catalog::build);

/// The process-wide catalog.
pub fn catalog() -> &'static Catalog {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::state::{GatePosition, OnOff};

    #[test]
    fn test_no_duplicate_keys() {
        let all = entries();
        assert_eq!(all.len(), catalog().by_key.len());
    }

    #[test]
    fn test_lookup_is_exact() {
        assert!(catalog().contains("AT+STLAMP"));
        assert!(!catalog().contains("at+stlamp"));
        assert!(!catalog().contains("AT+STLAM"));
        assert!(!catalog().contains("AT+STLAMP "));
    }

    #[test]
    fn test_close3_alias_updates_same_field() {
        for key in [keys::STATUS_CLOSE3, keys::STATUS_CLOSE3_ALIAS] {
            let entry = catalog().lookup(key).unwrap();
            let mut state = DeviceState::default();
            match entry.effect {
                Effect::Field(update) => assert!(update(&mut state, "ON")),
                other => panic!("unexpected effect {:?}", other),
            }
            assert_eq!(state.monitor.close3, OnOff::On);
            assert_eq!(state.monitor.close2, OnOff::Off);
        }
    }

    #[test]
    fn test_integer_decoder_rejects_garbage() {
        let entry = catalog().lookup(keys::CONF_OPEN_LEVEL).unwrap();
        assert_eq!(entry.decoder, Decoder::Integer);
        let Effect::Field(update) = entry.effect else {
            panic!("expected field entry");
        };
        let mut state = DeviceState::default();
        state.config.open_level = 4;
        assert!(!update(&mut state, "fast"));
        assert_eq!(state.config.open_level, 4);
        assert!(update(&mut state, " 7 "));
        assert_eq!(state.config.open_level, 7);
    }

    #[test]
    fn test_text_decoder_is_verbatim() {
        let Effect::Field(update) = catalog().lookup(keys::STATUS_MAIN_POWER).unwrap().effect else {
            panic!("expected field entry");
        };
        let mut state = DeviceState::default();
        assert!(update(&mut state, "23.9 V"));
        assert_eq!(state.monitor.main_power, "23.9 V");
    }

    #[test]
    fn test_test_gate_token() {
        let Effect::Field(update) = catalog().lookup(keys::TEST_GATE).unwrap().effect else {
            panic!("expected field entry");
        };
        let mut state = DeviceState::default();
        assert!(update(&mut state, "opening"));
        assert_eq!(state.board_test.gate, GatePosition::Opening);
    }

    #[test]
    fn test_factory_reset_is_notice() {
        let entry = catalog().lookup(keys::ACTION_FACTORY_RESET).unwrap();
        let Effect::Notice(make) = entry.effect else {
            panic!("expected notice entry");
        };
        assert_eq!(
            make("OK"),
            Notice::FactoryReset { outcome: FactoryResetOutcome::Completed }
        );
        assert_eq!(
            make("ERR"),
            Notice::FactoryReset { outcome: FactoryResetOutcome::Failed }
        );
    }
}
