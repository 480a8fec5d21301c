// src/settings.rs
//
// Persistent link settings, stored as TOML under the user's config directory.
// Line parameters are fixed by the protocol and deliberately absent here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::serial::{OverflowPolicy, DEFAULT_MAX_PENDING};
use crate::io::{GateError, UsbOverride};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GateSettings {
    /// Endpoint to use when several compatible devices are attached.
    #[serde(default)]
    pub preferred_port: Option<String>,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Serial read timeout; bounds how long a disconnect waits for the loop.
    #[serde(default = "default_read_poll_ms")]
    pub read_poll_ms: u64,
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default)]
    pub usb_overrides: Vec<UsbOverride>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_write_timeout_ms() -> u64 {
    500
}
fn default_read_poll_ms() -> u64 {
    50
}
fn default_max_pending_bytes() -> usize {
    DEFAULT_MAX_PENDING
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            preferred_port: None,
            write_timeout_ms: default_write_timeout_ms(),
            read_poll_ms: default_read_poll_ms(),
            max_pending_bytes: default_max_pending_bytes(),
            overflow_policy: OverflowPolicy::default(),
            usb_overrides: Vec::new(),
            log_dir: None,
        }
    }
}

impl GateSettings {
    /// `<config dir>/gatelink/settings.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gatelink").join("settings.toml"))
    }

    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, GateError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| GateError::settings(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| GateError::settings(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), GateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GateError::settings(format!("Failed to create config dir: {}", e)))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GateError::settings(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| GateError::settings(format!("Failed to write settings: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DriverKind;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings: GateSettings = toml::from_str("").unwrap();
        assert_eq!(settings, GateSettings::default());
        assert_eq!(settings.write_timeout_ms, 500);
        assert_eq!(settings.read_poll_ms, 50);
        assert_eq!(settings.max_pending_bytes, 4096);
        assert_eq!(settings.overflow_policy, OverflowPolicy::DiscardPartial);
    }

    #[test]
    fn test_partial_document() {
        let settings: GateSettings = toml::from_str(
            r#"
preferred_port = "/dev/ttyUSB1"
overflow_policy = "fail"

[[usb_overrides]]
vid = 51966
pid = 1
driver = "cdc_acm"
"#,
        )
        .unwrap();
        assert_eq!(settings.preferred_port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(settings.overflow_policy, OverflowPolicy::Fail);
        assert_eq!(settings.usb_overrides.len(), 1);
        assert_eq!(settings.usb_overrides[0].driver, DriverKind::CdcAcm);
        assert_eq!(settings.write_timeout_ms, 500);
    }

    #[test]
    fn test_load_missing_file_and_round_trip() {
        let dir = std::env::temp_dir().join(format!("gatelink-settings-{}", std::process::id()));
        let path = dir.join("settings.toml");
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(GateSettings::load(&path).unwrap(), GateSettings::default());

        let settings = GateSettings {
            write_timeout_ms: 250,
            log_dir: Some(dir.join("logs")),
            ..GateSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(GateSettings::load(&path).unwrap(), settings);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_parse_error_is_settings_error() {
        let dir = std::env::temp_dir().join(format!("gatelink-bad-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(&path, "write_timeout_ms = \"soon\"").unwrap();

        let err = GateSettings::load(&path).unwrap_err();
        assert!(matches!(err, GateError::Settings(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
