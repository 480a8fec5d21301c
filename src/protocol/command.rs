// src/protocol/command.rs
//
// Semantic commands and their wire encoding. Every command names exactly one
// catalog key; values are rendered verbatim with no range checking.
//
// Frame formats:
//   KEY\r\n
//   KEY=VALUE\r\n

use serde::{Deserialize, Serialize};

use super::catalog::keys;
use super::state::{GatePosition, LedColor, OnOff, TriggerPosition, Usage, WireToken};

/// Outbound frame terminator.
pub const FRAME_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum Command {
    Open,
    Close,
    Stop,
    StartTest,
    StopTest,
    FactoryReset,
    /// Ask the board to echo every `curr_*` key.
    ReadConfig,
    ReadVersion,

    SetOpenLevel(i32),
    SetCloseLevel(i32),
    SetLampUsage(Usage),
    SetBuzzerUsage(Usage),
    SetLampOnPosition(TriggerPosition),
    SetLampOffPosition(TriggerPosition),
    SetLedOpenColor(LedColor),
    SetLedOpenPosition(TriggerPosition),
    SetLedCloseColor(LedColor),
    SetLedClosePosition(TriggerPosition),
    SetLoopAUsage(Usage),
    SetLoopBUsage(Usage),
    /// Seconds
    SetDelayTime(i32),
    SetRelay1Mode(i32),
    SetRelay2Mode(i32),

    SetControlLamp(OnOff),
    SetControlRelay1(OnOff),
    SetControlRelay2(OnOff),
    SetControlLed(LedColor),
    SetControlPosition(GatePosition),
}

impl Command {
    /// The catalog key this command is sent under.
    pub fn key(&self) -> &'static str {
        use Command::*;
        match self {
            Open => keys::ACTION_OPEN,
            Close => keys::ACTION_CLOSE,
            Stop => keys::ACTION_STOP,
            StartTest => keys::ACTION_TEST_START,
            StopTest => keys::ACTION_TEST_STOP,
            FactoryReset => keys::ACTION_FACTORY_RESET,
            ReadConfig => keys::ACTION_READ_CONFIG,
            ReadVersion => keys::CONF_VERSION,
            SetOpenLevel(_) => keys::CONF_OPEN_LEVEL,
            SetCloseLevel(_) => keys::CONF_CLOSE_LEVEL,
            SetLampUsage(_) => keys::CONF_LAMP_USAGE,
            SetBuzzerUsage(_) => keys::CONF_BUZZER_USAGE,
            SetLampOnPosition(_) => keys::CONF_LAMP_ON_POSITION,
            SetLampOffPosition(_) => keys::CONF_LAMP_OFF_POSITION,
            SetLedOpenColor(_) => keys::CONF_LED_OPEN_COLOR,
            SetLedOpenPosition(_) => keys::CONF_LED_OPEN_POSITION,
            SetLedCloseColor(_) => keys::CONF_LED_CLOSE_COLOR,
            SetLedClosePosition(_) => keys::CONF_LED_CLOSE_POSITION,
            SetLoopAUsage(_) => keys::CONF_LOOP_A_USAGE,
            SetLoopBUsage(_) => keys::CONF_LOOP_B_USAGE,
            SetDelayTime(_) => keys::CONF_DELAY_TIME,
            SetRelay1Mode(_) => keys::CONF_RELAY1_MODE,
            SetRelay2Mode(_) => keys::CONF_RELAY2_MODE,
            SetControlLamp(_) => keys::CTRL_LAMP,
            SetControlRelay1(_) => keys::CTRL_RELAY1,
            SetControlRelay2(_) => keys::CTRL_RELAY2,
            SetControlLed(_) => keys::CTRL_LED,
            SetControlPosition(_) => keys::CTRL_POSITION,
        }
    }

    /// Value half of the frame, if the command carries one.
    pub fn value(&self) -> Option<String> {
        use Command::*;
        match self {
            Open | Close | Stop | StartTest | StopTest | FactoryReset | ReadConfig
            | ReadVersion => None,
            SetOpenLevel(n) | SetCloseLevel(n) | SetDelayTime(n) | SetRelay1Mode(n)
            | SetRelay2Mode(n) => Some(n.to_string()),
            SetLampUsage(u) | SetBuzzerUsage(u) | SetLoopAUsage(u) | SetLoopBUsage(u) => {
                Some(u.as_wire().to_string())
            }
            SetLampOnPosition(p)
            | SetLampOffPosition(p)
            | SetLedOpenPosition(p)
            | SetLedClosePosition(p) => Some(p.as_wire().to_string()),
            SetLedOpenColor(c) | SetLedCloseColor(c) | SetControlLed(c) => {
                Some(c.as_wire().to_string())
            }
            SetControlLamp(o) | SetControlRelay1(o) | SetControlRelay2(o) => {
                Some(o.as_wire().to_string())
            }
            SetControlPosition(p) => Some(p.as_wire().to_string()),
        }
    }
}

/// Render the wire line for `command`, without terminator.
pub fn encode(command: &Command) -> String {
    match command.value() {
        Some(value) => format!("{}={}", command.key(), value),
        None => command.key().to_string(),
    }
}

/// Bytes ready for transmission, `\r\n` terminated.
pub fn encode_frame(command: &Command) -> Vec<u8> {
    let mut frame = encode(command);
    frame.push_str(FRAME_TERMINATOR);
    frame.into_bytes()
}
