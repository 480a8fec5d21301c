// src/io/scripted.rs
//
// Deterministic stand-in for real hardware. A `ScriptedPlatform` reports a
// fixed device list and hands out `ScriptedTransport`s that replay a script of
// byte chunks, pauses, and failures. Used by the test suite and by demo
// setups without a board attached.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::serial::LineSettings;
use super::transport::{AttachedDevice, DeviceHandle, DevicePlatform, Transport};
use super::GateError;

// ============================================================================
// Script
// ============================================================================

#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Delivered by the next read(s), split if larger than the read buffer.
    Bytes(Vec<u8>),
    /// Sleep, then report a read timeout.
    Pause(Duration),
    /// Fail the next read with this error kind.
    Fail(ErrorKind),
    /// The device went away; every later read returns `Ok(0)`.
    Eof,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: VecDeque<ScriptStep>,
    echo_writes: bool,
    write_delay: Duration,
}

impl Script {
    pub fn new() -> Self {
        Script::default()
    }

    pub fn bytes(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.steps.push_back(ScriptStep::Bytes(bytes.as_ref().to_vec()));
        self
    }

    /// Each line is sent `\r\n` terminated, one chunk per line.
    pub fn lines(mut self, lines: &[&str]) -> Self {
        for line in lines {
            self = self.bytes(format!("{}\r\n", line));
        }
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push_back(ScriptStep::Pause(duration));
        self
    }

    pub fn fail(mut self, kind: ErrorKind) -> Self {
        self.steps.push_back(ScriptStep::Fail(kind));
        self
    }

    pub fn eof(mut self) -> Self {
        self.steps.push_back(ScriptStep::Eof);
        self
    }

    /// Behave like firmware that echoes every received frame back.
    pub fn echo_writes(mut self) -> Self {
        self.echo_writes = true;
        self
    }

    /// Stall every write for `delay`.
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct ScriptedTransport {
    steps: VecDeque<ScriptStep>,
    echo_writes: bool,
    write_delay: Duration,
    read_timeout: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl Transport for ScriptedTransport {
    fn configure(&mut self, line: &LineSettings) -> Result<(), String> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.configure_error.clone() {
            return Err(reason);
        }
        shared.configured.push(*line);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.steps.pop_front() {
            Some(ScriptStep::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.steps.push_front(ScriptStep::Bytes(rest));
                }
                Ok(n)
            }
            Some(ScriptStep::Pause(duration)) => {
                std::thread::sleep(duration);
                Err(ErrorKind::TimedOut.into())
            }
            Some(ScriptStep::Fail(kind)) => {
                Err(std::io::Error::new(kind, "scripted read failure"))
            }
            Some(ScriptStep::Eof) => {
                self.steps.push_front(ScriptStep::Eof);
                Ok(0)
            }
            None => {
                std::thread::sleep(self.read_timeout);
                Err(ErrorKind::TimedOut.into())
            }
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        lock(&self.shared)
            .written
            .push(String::from_utf8_lossy(frame).into_owned());
        if self.echo_writes {
            self.steps.push_back(ScriptStep::Bytes(frame.to_vec()));
        }
        Ok(())
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        lock(&self.shared).live -= 1;
    }
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Default)]
struct Shared {
    scripts: VecDeque<Script>,
    granted: bool,
    grant_on_request: bool,
    endpoint_missing: bool,
    open_error: Option<String>,
    configure_error: Option<String>,
    opened: usize,
    /// Transports opened and not yet dropped.
    live: usize,
    peak_live: usize,
    permission_requests: usize,
    configured: Vec<LineSettings>,
    written: Vec<String>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted host. Each `open` consumes the next queued script; with none
/// queued the transport stays silent.
pub struct ScriptedPlatform {
    devices: Vec<AttachedDevice>,
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedPlatform {
    pub fn new(devices: Vec<AttachedDevice>) -> Self {
        ScriptedPlatform {
            devices,
            shared: Arc::new(Mutex::new(Shared {
                granted: true,
                ..Shared::default()
            })),
        }
    }

    /// A single CP210x board on `/dev/ttyUSB0`.
    pub fn single_board() -> Self {
        ScriptedPlatform::new(vec![AttachedDevice {
            vid: 0x10C4,
            pid: 0xEA60,
            serial_number: Some("GATE0001".to_string()),
            manufacturer: Some("Silicon Labs".to_string()),
            product: Some("Gate Controller".to_string()),
            endpoints: vec!["/dev/ttyUSB0".to_string()],
        }])
    }

    pub fn with_script(self, script: Script) -> Self {
        lock(&self.shared).scripts.push_back(script);
        self
    }

    /// Start without access; `grant_on_request` decides the request outcome.
    pub fn without_permission(self, grant_on_request: bool) -> Self {
        {
            let mut shared = lock(&self.shared);
            shared.granted = false;
            shared.grant_on_request = grant_on_request;
        }
        self
    }

    pub fn with_missing_endpoint(self) -> Self {
        lock(&self.shared).endpoint_missing = true;
        self
    }

    pub fn with_open_error(self, reason: &str) -> Self {
        lock(&self.shared).open_error = Some(reason.to_string());
        self
    }

    pub fn with_configure_error(self, reason: &str) -> Self {
        lock(&self.shared).configure_error = Some(reason.to_string());
        self
    }

    /// Frames written by every session so far, terminators included.
    pub fn written(&self) -> Vec<String> {
        lock(&self.shared).written.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.shared).opened
    }

    pub fn live_transports(&self) -> usize {
        lock(&self.shared).live
    }

    /// Most transports ever open at the same time.
    pub fn peak_live_transports(&self) -> usize {
        lock(&self.shared).peak_live
    }

    pub fn permission_requests(&self) -> usize {
        lock(&self.shared).permission_requests
    }

    pub fn configured(&self) -> Vec<LineSettings> {
        lock(&self.shared).configured.clone()
    }
}

#[async_trait]
impl DevicePlatform for ScriptedPlatform {
    fn enumerate(&self) -> Result<Vec<AttachedDevice>, GateError> {
        Ok(self.devices.clone())
    }

    fn endpoint_present(&self, endpoint: &str) -> bool {
        !lock(&self.shared).endpoint_missing
            && self
                .devices
                .iter()
                .any(|d| d.endpoints.iter().any(|e| e == endpoint))
    }

    fn has_permission(&self, _device: &DeviceHandle) -> bool {
        lock(&self.shared).granted
    }

    async fn request_permission(&self, _device: &DeviceHandle) -> bool {
        let mut shared = lock(&self.shared);
        shared.permission_requests += 1;
        if shared.grant_on_request {
            shared.granted = true;
        }
        shared.granted
    }

    fn open(
        &self,
        _device: &DeviceHandle,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, String> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.open_error.clone() {
            return Err(reason);
        }
        shared.opened += 1;
        shared.live += 1;
        shared.peak_live = shared.peak_live.max(shared.live);
        let script = shared.scripts.pop_front().unwrap_or_default();
        Ok(Box::new(ScriptedTransport {
            steps: script.steps,
            echo_writes: script.echo_writes,
            write_delay: script.write_delay,
            read_timeout,
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::discovery::DriverKind;

    fn handle() -> DeviceHandle {
        DeviceHandle {
            endpoint: "/dev/ttyUSB0".to_string(),
            vid: 0x10C4,
            pid: 0xEA60,
            serial_number: None,
            product: None,
            driver: DriverKind::Cp210x,
        }
    }

    #[test]
    fn test_read_splits_large_chunks() {
        let platform = ScriptedPlatform::single_board().with_script(Script::new().bytes(b"abcdef"));
        let mut t = platform.open(&handle(), Duration::from_millis(1)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        let err = t.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_eof_is_sticky() {
        let platform = ScriptedPlatform::single_board().with_script(Script::new().eof());
        let mut t = platform.open(&handle(), Duration::from_millis(1)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 0);
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_live_transports_tracks_drops() {
        let platform = ScriptedPlatform::single_board();
        let a = platform.open(&handle(), Duration::from_millis(1)).unwrap();
        let b = platform.open(&handle(), Duration::from_millis(1)).unwrap();
        assert_eq!(platform.live_transports(), 2);
        drop(a);
        drop(b);
        assert_eq!(platform.live_transports(), 0);
        assert_eq!(platform.peak_live_transports(), 2);
    }

    #[test]
    fn test_echo_writes_are_read_back() {
        let platform = ScriptedPlatform::single_board().with_script(Script::new().echo_writes());
        let mut t = platform.open(&handle(), Duration::from_millis(1)).unwrap();
        t.write_frame(b"AT+OPEN\r\n").unwrap();
        let mut buf = [0u8; 16];
        let n = t.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AT+OPEN\r\n");
        assert_eq!(platform.written(), vec!["AT+OPEN\r\n".to_string()]);
    }

    #[tokio::test]
    async fn test_permission_request_outcome() {
        let platform = ScriptedPlatform::single_board().without_permission(true);
        assert!(!platform.has_permission(&handle()));
        assert!(platform.request_permission(&handle()).await);
        assert!(platform.has_permission(&handle()));
        assert_eq!(platform.permission_requests(), 1);
    }
}
