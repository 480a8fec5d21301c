// src/connection.rs
//
// Connection lifecycle and the per-session read loop.
//
//   Disconnected -> Discovering -> [AwaitingPermission] -> Connecting -> Connected
//   any failure before Connected -> Error
//   Connected -> Disconnected  (disconnect, or a fatal read error / EOF)
//
// The transport is owned by a blocking worker for the session's lifetime.
// Outbound frames reach it through a bounded request queue that the worker
// drains between reads; the submitter awaits a oneshot reply under a
// timeout, so a stalled write never parks the caller or a runtime worker.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::io::discovery::{discover, ProbeTable};
use crate::io::serial::{LineFramer, Overflow, GATE_LINE};
use crate::io::{DeviceHandle, DevicePlatform, GateError, Transport};
use crate::notice::Notice;
use crate::protocol::{encode_frame, Command};
use crate::settings::GateSettings;
use crate::store::DeviceStateStore;

const TRANSMIT_QUEUE: usize = 32;
const READ_CHUNK: usize = 256;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Discovering,
    AwaitingPermission,
    Connecting,
    Connected,
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Discovering => f.write_str("discovering"),
            ConnectionState::AwaitingPermission => f.write_str("awaiting permission"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// One outbound frame plus the channel its write result goes back on.
struct TransmitRequest {
    data: Vec<u8>,
    result_tx: oneshot::Sender<Result<(), GateError>>,
}

#[derive(Default)]
struct PermissionLedger {
    /// Endpoints a request has been issued for since their last open.
    requested: HashSet<String>,
    /// Answers to the current round of requests, by endpoint.
    answered: HashMap<String, bool>,
}

struct Session {
    device: DeviceHandle,
    cancel: Arc<AtomicBool>,
    /// Set by the worker when the transport failed.
    ended: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

// ============================================================================
// Manager
// ============================================================================

pub struct ConnectionManager {
    platform: Arc<dyn DevicePlatform>,
    defaults: ProbeTable,
    overrides: ProbeTable,
    settings: GateSettings,
    store: Arc<DeviceStateStore>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    session: tokio::sync::Mutex<Option<Session>>,
    transmit_tx: Mutex<Option<std_mpsc::SyncSender<TransmitRequest>>>,
    permissions: Arc<Mutex<PermissionLedger>>,
}

impl ConnectionManager {
    pub fn new(
        platform: Arc<dyn DevicePlatform>,
        settings: GateSettings,
        store: Arc<DeviceStateStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionManager {
            platform,
            defaults: ProbeTable::default_table(),
            overrides: ProbeTable::overrides(&settings.usb_overrides),
            settings,
            store,
            state_tx: Arc::new(state_tx),
            session: tokio::sync::Mutex::new(None),
            transmit_tx: Mutex::new(None),
            permissions: Arc::new(Mutex::new(PermissionLedger::default())),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        set_state(&self.state_tx, state);
    }

    fn fail(&self, err: GateError) -> GateError {
        tlog!("[connection] {}", err);
        self.set_state(ConnectionState::Error(err.to_string()));
        err
    }

    fn transmit_slot(&self) -> MutexGuard<'_, Option<std_mpsc::SyncSender<TransmitRequest>>> {
        self.transmit_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn permissions(&self) -> MutexGuard<'_, PermissionLedger> {
        lock_ledger(&self.permissions)
    }

    pub fn list_available_devices(&self) -> Result<Vec<DeviceHandle>, GateError> {
        discover(self.platform.as_ref(), &self.defaults, &self.overrides)
    }

    /// Issue a permission request for `device`, wait for the answer, and
    /// publish it as a notice.
    pub async fn request_permission(&self, device: &DeviceHandle) -> bool {
        self.permissions().requested.insert(device.endpoint.clone());
        let granted = self.platform.request_permission(device).await;
        self.permissions()
            .answered
            .insert(device.endpoint.clone(), granted);
        tlog!(
            "[connection] Permission for {} {}",
            device,
            if granted { "granted" } else { "denied" }
        );
        resolve_permission(&self.state_tx, device, granted);
        self.store.notify(Notice::PermissionResult {
            device: device.clone(),
            granted,
        });
        granted
    }

    /// Discover, authorise, open, and configure a device, then start its read
    /// loop. Returns the live session's handle if already connected.
    pub async fn connect(&self) -> Result<DeviceHandle, GateError> {
        let mut session = self.session.lock().await;

        if let Some(live) = session.as_ref() {
            if !live.ended.load(Ordering::Acquire) {
                return Ok(live.device.clone());
            }
        }
        if let Some(dead) = session.take() {
            *self.transmit_slot() = None;
            let _ = dead.task.await;
        }

        self.set_state(ConnectionState::Discovering);
        let handles = self
            .list_available_devices()
            .map_err(|e| self.fail(e))?;
        let device = match &self.settings.preferred_port {
            Some(port) => handles
                .iter()
                .find(|h| &h.endpoint == port)
                .or_else(|| handles.first()),
            None => handles.first(),
        }
        .cloned()
        .ok_or_else(|| self.fail(GateError::NoCompatibleDevice))?;

        if !self.platform.has_permission(&device) {
            return Err(self.await_permission(device));
        }
        self.permissions().requested.remove(&device.endpoint);

        self.set_state(ConnectionState::Connecting);
        if !self.platform.endpoint_present(&device.endpoint) {
            return Err(self.fail(GateError::MissingEndpoint {
                device: device.to_string(),
            }));
        }

        let read_timeout = Duration::from_millis(self.settings.read_poll_ms.max(1));
        let mut transport = self
            .platform
            .open(&device, read_timeout)
            .map_err(|e| self.fail(GateError::open(device.to_string(), e)))?;
        transport
            .configure(&GATE_LINE)
            .map_err(|e| self.fail(GateError::configure(device.to_string(), e)))?;

        self.store.reset();

        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel(TRANSMIT_QUEUE);
        *self.transmit_slot() = Some(transmit_tx);

        let cancel = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        let worker = ReadLoop {
            transport,
            device: device.clone(),
            framer: LineFramer::new(self.settings.max_pending_bytes, self.settings.overflow_policy),
            store: Arc::clone(&self.store),
            cancel: Arc::clone(&cancel),
            ended: Arc::clone(&ended),
            transmit_rx,
        };

        // Connected is published before the worker starts so a session that
        // dies immediately still ends in Disconnected.
        self.set_state(ConnectionState::Connected);
        tlog!("[connection] Connected to {} at {}", device, GATE_LINE);

        let state_tx = Arc::clone(&self.state_tx);
        let task = tokio::task::spawn_blocking(move || worker.run(&state_tx));

        *session = Some(Session {
            device: device.clone(),
            cancel,
            ended,
            task,
        });
        Ok(device)
    }

    /// First attempt: issue one request in the background and report
    /// `PermissionRequired`. Later attempts for the same endpoint report
    /// `PermissionDenied`; requests are never retried automatically.
    fn await_permission(&self, device: DeviceHandle) -> GateError {
        {
            let mut ledger = self.permissions();
            if !ledger.requested.insert(device.endpoint.clone()) {
                drop(ledger);
                return self.fail(GateError::PermissionDenied {
                    device: device.to_string(),
                });
            }
            ledger.answered.remove(&device.endpoint);
        }

        tlog!("[connection] Requesting permission for {}", device);
        self.set_state(ConnectionState::AwaitingPermission);

        let platform = Arc::clone(&self.platform);
        let store = Arc::clone(&self.store);
        let state_tx = Arc::clone(&self.state_tx);
        let permissions = Arc::clone(&self.permissions);
        let name = device.to_string();
        tokio::spawn(async move {
            // An explicit request may have answered this round already.
            let earlier = lock_ledger(&permissions)
                .answered
                .get(&device.endpoint)
                .copied();
            if let Some(granted) = earlier {
                resolve_permission(&state_tx, &device, granted);
                return;
            }

            let granted = platform.request_permission(&device).await;
            lock_ledger(&permissions)
                .answered
                .insert(device.endpoint.clone(), granted);
            resolve_permission(&state_tx, &device, granted);
            store.notify(Notice::PermissionResult { device, granted });
        });

        GateError::PermissionRequired { device: name }
    }

    /// Stop the read loop and release the device. Always leaves the
    /// connection `Disconnected`, with or without a session.
    pub async fn disconnect(&self) {
        // Held until the worker has exited so an overlapping connect cannot
        // open the device while the old worker still owns it.
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };
        *self.transmit_slot() = None;
        session.cancel.store(true, Ordering::Release);
        if let Err(e) = session.task.await {
            tlog!("[connection] Read loop for {} panicked: {:?}", session.device, e);
        }
        self.set_state(ConnectionState::Disconnected);
        drop(slot);
        tlog!("[connection] Disconnected from {}", session.device);
    }

    /// Encode and write one command, waiting at most `write_timeout_ms` for
    /// the write to complete.
    pub async fn submit(&self, command: &Command) -> Result<(), GateError> {
        let tx = self.transmit_slot().clone().ok_or(GateError::NotConnected)?;

        let (result_tx, result_rx) = oneshot::channel();
        tx.try_send(TransmitRequest {
            data: encode_frame(command),
            result_tx,
        })
        .map_err(|e| match e {
            std_mpsc::TrySendError::Full(_) => {
                GateError::Write("transmit queue full".to_string())
            }
            std_mpsc::TrySendError::Disconnected(_) => GateError::NotConnected,
        })?;

        let timeout_ms = self.settings.write_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), result_rx).await {
            Ok(Ok(result)) => result,
            // The worker dropped the request without answering.
            Ok(Err(_)) => Err(GateError::NotConnected),
            Err(_) => Err(GateError::WriteTimeout { timeout_ms }),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        *self.transmit_slot() = None;
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.store(true, Ordering::Release);
            tlog!("[connection] Dropped with {} open, stopping its read loop", session.device);
        }
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    state_tx.send_replace(state);
}

fn lock_ledger(ledger: &Mutex<PermissionLedger>) -> MutexGuard<'_, PermissionLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Leave `AwaitingPermission` once the answer is in. Any other state means a
/// later connect or disconnect already moved on, and it stands.
fn resolve_permission(
    state_tx: &watch::Sender<ConnectionState>,
    device: &DeviceHandle,
    granted: bool,
) {
    state_tx.send_if_modified(|state| {
        if *state != ConnectionState::AwaitingPermission {
            return false;
        }
        *state = if granted {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Error(format!("{}: permission denied", device))
        };
        true
    });
}

// ============================================================================
// Read loop
// ============================================================================

struct ReadLoop {
    transport: Box<dyn Transport>,
    device: DeviceHandle,
    framer: LineFramer,
    store: Arc<DeviceStateStore>,
    cancel: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
}

impl ReadLoop {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Run until cancelled (returns `None`) or until the transport fails
    /// (returns the reason).
    fn pump(&mut self) -> Option<String> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if self.cancelled() {
                return None;
            }

            while let Ok(req) = self.transmit_rx.try_recv() {
                let result = self
                    .transport
                    .write_frame(&req.data)
                    .map_err(|e| GateError::Write(e.to_string()));
                if let Err(e) = &result {
                    tlog!("[connection] {}", e);
                }
                // The submitter may have timed out and gone.
                let _ = req.result_tx.send(result);
            }

            match self.transport.read(&mut buf) {
                Ok(0) => return Some("device closed the connection".to_string()),
                Ok(n) => {
                    let (lines, fatal) = match self.framer.feed(&buf[..n]) {
                        Ok(lines) => (lines, None),
                        Err(Overflow { completed, error }) => (completed, Some(error)),
                    };
                    for line in lines {
                        if self.cancelled() {
                            return None;
                        }
                        self.store.apply_line(&line);
                    }
                    if let Some(e) = fatal {
                        return Some(e.to_string());
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Some(GateError::Read(e.to_string()).to_string()),
            }
        }
    }

    fn run(mut self, state_tx: &watch::Sender<ConnectionState>) {
        let Some(reason) = self.pump() else {
            return;
        };

        let ReadLoop { transport, device, store, ended, .. } = self;
        drop(transport);
        ended.store(true, Ordering::Release);
        tlog!("[connection] Lost {}: {}", device, reason);
        set_state(state_tx, ConnectionState::Disconnected);
        store.notify(Notice::ConnectionLost { device, reason });
    }
}

// ============================================================================
// Tests
// ============================================================================
