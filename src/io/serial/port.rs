// src/io/serial/port.rs
//
// Host serial ports through the serialport crate. USB ports are grouped by
// (VID, PID, serial number) so a multi-interface bridge shows up as one
// attachment with several endpoints.

use async_trait::async_trait;
use std::io::{Read, Write};
use std::time::Duration;

use super::utils::{to_serialport_data_bits, to_serialport_stop_bits};
use super::LineSettings;
use crate::io::transport::{AttachedDevice, DeviceHandle, DevicePlatform, Transport};
use crate::io::GateError;

// ============================================================================
// Transport
// ============================================================================

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl Transport for SerialTransport {
    fn configure(&mut self, line: &LineSettings) -> Result<(), String> {
        let port = &mut self.port;
        let apply = |port: &mut Box<dyn serialport::SerialPort>| -> serialport::Result<()> {
            port.set_baud_rate(line.baud_rate)?;
            port.set_data_bits(to_serialport_data_bits(line.data_bits))?;
            port.set_stop_bits(to_serialport_stop_bits(line.stop_bits))?;
            port.set_parity(serialport::Parity::None)?;
            port.set_flow_control(serialport::FlowControl::None)
        };
        apply(port).map_err(|e| e.to_string())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }

    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPlatform;

impl SerialPlatform {
    pub fn new() -> Self {
        SerialPlatform
    }
}

/// On macOS only the /dev/cu.* (calling unit) nodes are usable; the tty.*
/// twins block on open waiting for carrier detect.
fn usable_port(_name: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        !_name.starts_with("/dev/tty.")
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

#[async_trait]
impl DevicePlatform for SerialPlatform {
    fn enumerate(&self) -> Result<Vec<AttachedDevice>, GateError> {
        let ports = serialport::available_ports()
            .map_err(|e| GateError::Enumerate(e.to_string()))?;

        let mut devices: Vec<AttachedDevice> = Vec::new();
        for port in ports.into_iter().filter(|p| usable_port(&p.port_name)) {
            let serialport::SerialPortType::UsbPort(info) = port.port_type else {
                continue;
            };
            let existing = devices.iter_mut().find(|d| {
                d.vid == info.vid && d.pid == info.pid && d.serial_number == info.serial_number
            });
            match existing {
                Some(device) => device.endpoints.push(port.port_name),
                None => devices.push(AttachedDevice {
                    vid: info.vid,
                    pid: info.pid,
                    serial_number: info.serial_number,
                    manufacturer: info.manufacturer,
                    product: info.product,
                    endpoints: vec![port.port_name],
                }),
            }
        }
        Ok(devices)
    }

    fn endpoint_present(&self, endpoint: &str) -> bool {
        serialport::available_ports()
            .map(|ports| ports.iter().any(|p| p.port_name == endpoint))
            .unwrap_or(false)
    }

    #[cfg(unix)]
    fn has_permission(&self, device: &DeviceHandle) -> bool {
        match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device.endpoint)
        {
            Ok(_) => true,
            Err(e) => e.kind() != std::io::ErrorKind::PermissionDenied,
        }
    }

    #[cfg(not(unix))]
    fn has_permission(&self, _device: &DeviceHandle) -> bool {
        true
    }

    async fn request_permission(&self, device: &DeviceHandle) -> bool {
        // Desktop hosts have no interactive grant; access comes from group
        // membership or udev rules, so report and re-check.
        tlog!(
            "[serial] No access to {}. Add the user to the dialout/uucp group or install a udev rule for {:04x}:{:04x}",
            device.endpoint,
            device.vid,
            device.pid
        );
        self.has_permission(device)
    }

    fn open(
        &self,
        device: &DeviceHandle,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, String> {
        let port = serialport::new(&device.endpoint, super::GATE_LINE.baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| e.to_string())?;
        tlog!("[serial] Opened {}", device);
        Ok(Box::new(SerialTransport { port }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_port_filter() {
        assert!(usable_port("/dev/ttyUSB0"));
        assert!(usable_port("COM3"));
        #[cfg(target_os = "macos")]
        {
            assert!(!usable_port("/dev/tty.usbserial-0001"));
            assert!(usable_port("/dev/cu.usbserial-0001"));
        }
    }

    #[test]
    fn test_missing_endpoint_is_not_present() {
        let platform = SerialPlatform::new();
        assert!(!platform.endpoint_present("/dev/gatelink-does-not-exist"));
    }
}
