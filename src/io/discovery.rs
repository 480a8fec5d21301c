// src/io/discovery.rs
//
// Device discovery: enumerate attachments, match them against the default
// USB-serial probe table, then against VID/PID overrides for boards the
// default table misses.

use serde::{Deserialize, Serialize};

use super::transport::{AttachedDevice, DeviceHandle, DevicePlatform};
use super::GateError;

/// USB-serial bridge family that drives the board's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Ftdi,
    Cp210x,
    Ch34x,
    Pl2303,
    CdcAcm,
}

/// Match rule. `pid: None` accepts every product of the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeEntry {
    pub vid: u16,
    pub pid: Option<u16>,
    pub driver: DriverKind,
}

const fn exact(vid: u16, pid: u16, driver: DriverKind) -> ProbeEntry {
    ProbeEntry {
        vid,
        pid: Some(pid),
        driver,
    }
}

const DEFAULT_PROBES: &[ProbeEntry] = &[
    exact(0x0403, 0x6001, DriverKind::Ftdi),
    exact(0x0403, 0x6010, DriverKind::Ftdi),
    exact(0x0403, 0x6011, DriverKind::Ftdi),
    exact(0x0403, 0x6014, DriverKind::Ftdi),
    exact(0x0403, 0x6015, DriverKind::Ftdi),
    exact(0x10C4, 0xEA60, DriverKind::Cp210x),
    exact(0x10C4, 0xEA70, DriverKind::Cp210x),
    exact(0x10C4, 0xEA71, DriverKind::Cp210x),
    exact(0x1A86, 0x7523, DriverKind::Ch34x),
    exact(0x1A86, 0x5523, DriverKind::Ch34x),
    exact(0x1A86, 0x55D4, DriverKind::Ch34x),
    exact(0x067B, 0x2303, DriverKind::Pl2303),
    exact(0x067B, 0x23A3, DriverKind::Pl2303),
    ProbeEntry {
        vid: 0x2341,
        pid: None,
        driver: DriverKind::CdcAcm,
    },
    exact(0x0483, 0x5740, DriverKind::CdcAcm),
];

/// Controller revisions seen in the field that enumerate with IDs the
/// default table does not know.
const BUILTIN_OVERRIDES: &[ProbeEntry] = &[
    exact(0x1A86, 0x7522, DriverKind::Ch34x),
    exact(0x0483, 0x5741, DriverKind::CdcAcm),
    exact(0x16C0, 0x0483, DriverKind::CdcAcm),
];

/// User-supplied VID/PID mapping, read from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbOverride {
    pub vid: u16,
    pub pid: u16,
    pub driver: DriverKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTable {
    entries: Vec<ProbeEntry>,
}

impl ProbeTable {
    pub fn default_table() -> Self {
        ProbeTable {
            entries: DEFAULT_PROBES.to_vec(),
        }
    }

    /// Built-in overrides followed by `extra` from settings.
    pub fn overrides(extra: &[UsbOverride]) -> Self {
        let mut entries = BUILTIN_OVERRIDES.to_vec();
        entries.extend(extra.iter().map(|o| exact(o.vid, o.pid, o.driver)));
        ProbeTable { entries }
    }

    pub fn probe(&self, vid: u16, pid: u16) -> Option<DriverKind> {
        self.entries
            .iter()
            .find(|e| e.vid == vid && e.pid.map_or(true, |p| p == pid))
            .map(|e| e.driver)
    }
}

/// Probe one attachment: default table first, overrides second.
pub fn probe_device(
    device: &AttachedDevice,
    defaults: &ProbeTable,
    overrides: &ProbeTable,
) -> Option<DriverKind> {
    defaults
        .probe(device.vid, device.pid)
        .or_else(|| overrides.probe(device.vid, device.pid))
}

/// Enumerate and probe. Returns one handle per compatible endpoint, in
/// enumeration order. Devices with no compatible endpoint are left out.
pub fn discover(
    platform: &dyn DevicePlatform,
    defaults: &ProbeTable,
    overrides: &ProbeTable,
) -> Result<Vec<DeviceHandle>, GateError> {
    let mut handles = Vec::new();

    for device in platform.enumerate()? {
        let Some(driver) = probe_device(&device, defaults, overrides) else {
            continue;
        };
        for endpoint in device.endpoints.iter().filter(|e| !e.trim().is_empty()) {
            handles.push(DeviceHandle {
                endpoint: endpoint.clone(),
                vid: device.vid,
                pid: device.pid,
                serial_number: device.serial_number.clone(),
                product: device.product.clone(),
                driver,
            });
        }
    }

    tlog!("[discovery] {} compatible endpoint(s) found", handles.len());
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scripted::ScriptedPlatform;

    fn device(vid: u16, pid: u16, endpoints: &[&str]) -> AttachedDevice {
        AttachedDevice {
            vid,
            pid,
            serial_number: None,
            manufacturer: None,
            product: None,
            endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_table_match() {
        let table = ProbeTable::default_table();
        assert_eq!(table.probe(0x10C4, 0xEA60), Some(DriverKind::Cp210x));
        assert_eq!(table.probe(0x2341, 0x0043), Some(DriverKind::CdcAcm));
        assert_eq!(table.probe(0x1A86, 0x7522), None);
    }

    #[test]
    fn test_override_fallback() {
        let defaults = ProbeTable::default_table();
        let overrides = ProbeTable::overrides(&[UsbOverride {
            vid: 0xCAFE,
            pid: 0x0001,
            driver: DriverKind::CdcAcm,
        }]);
        let ch340k = device(0x1A86, 0x7522, &["/dev/ttyUSB0"]);
        let custom = device(0xCAFE, 0x0001, &["/dev/ttyACM3"]);
        assert_eq!(
            probe_device(&ch340k, &defaults, &overrides),
            Some(DriverKind::Ch34x)
        );
        assert_eq!(
            probe_device(&custom, &defaults, &overrides),
            Some(DriverKind::CdcAcm)
        );
    }

    #[test]
    fn test_discover_excludes_unknown_and_endpointless() {
        let platform = ScriptedPlatform::new(vec![
            device(0xDEAD, 0xBEEF, &["/dev/ttyUSB9"]),
            device(0x0403, 0x6001, &[]),
            device(0x10C4, 0xEA60, &["/dev/ttyUSB0"]),
        ]);
        let handles = discover(
            &platform,
            &ProbeTable::default_table(),
            &ProbeTable::overrides(&[]),
        )
        .unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].endpoint, "/dev/ttyUSB0");
        assert_eq!(handles[0].driver, DriverKind::Cp210x);
    }

    #[test]
    fn test_discover_one_handle_per_endpoint() {
        let platform = ScriptedPlatform::new(vec![device(
            0x0403,
            0x6010,
            &["/dev/ttyUSB0", "/dev/ttyUSB1"],
        )]);
        let handles = discover(
            &platform,
            &ProbeTable::default_table(),
            &ProbeTable::overrides(&[]),
        )
        .unwrap();
        let endpoints: Vec<_> = handles.iter().map(|h| h.endpoint.as_str()).collect();
        assert_eq!(endpoints, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }
}
