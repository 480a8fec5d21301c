// src/link.rs
//
// GateLink: the one object UI-side code holds. Wires a platform, the state
// store, and the connection manager together by explicit construction.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::io::{DeviceHandle, DevicePlatform, GateError};
use crate::notice::Notice;
use crate::protocol::{Command, DeviceState};
use crate::settings::GateSettings;
use crate::store::{DeviceStateStore, StateSubscription};

pub struct GateLink {
    store: Arc<DeviceStateStore>,
    connection: ConnectionManager,
}

impl GateLink {
    pub fn new(platform: Arc<dyn DevicePlatform>, settings: GateSettings) -> Self {
        let store = Arc::new(DeviceStateStore::new());
        let connection = ConnectionManager::new(platform, settings, Arc::clone(&store));
        GateLink { store, connection }
    }

    /// A link over the host's serial ports.
    #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
    pub fn serial(settings: GateSettings) -> Self {
        GateLink::new(Arc::new(crate::io::serial::SerialPlatform::new()), settings)
    }

    pub async fn connect(&self) -> Result<DeviceHandle, GateError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Write one command, waiting at most the configured write timeout.
    pub async fn submit(&self, command: &Command) -> Result<(), GateError> {
        self.connection.submit(command).await
    }

    /// Current snapshot first, then every later snapshot in order.
    pub fn state(&self) -> StateSubscription {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Arc<DeviceState> {
        self.store.snapshot()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.store.notices()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    pub fn list_available_devices(&self) -> Result<Vec<DeviceHandle>, GateError> {
        self.connection.list_available_devices()
    }

    pub async fn request_permission(&self, device: &DeviceHandle) -> bool {
        self.connection.request_permission(device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scripted::{Script, ScriptedPlatform};
    use crate::protocol::{GatePosition, Usage};
    use std::time::Duration;

    fn link(script: Script) -> (GateLink, Arc<ScriptedPlatform>) {
        let platform = Arc::new(ScriptedPlatform::single_board().with_script(script));
        let settings = GateSettings {
            read_poll_ms: 5,
            ..GateSettings::default()
        };
        (
            GateLink::new(Arc::clone(&platform) as Arc<dyn DevicePlatform>, settings),
            platform,
        )
    }

    #[tokio::test]
    async fn test_monitor_and_control_session() {
        let (link, platform) = link(
            Script::new()
                .lines(&["curr_version=2.1.4", "curr_lampUsage=USE"])
                .echo_writes(),
        );
        let mut state = link.state();
        assert_eq!(*state.next().await.unwrap(), DeviceState::default());

        link.connect().await.unwrap();
        assert_eq!(link.connection_state(), ConnectionState::Connected);

        let s = state.next().await.unwrap();
        assert_eq!(s.config.version, "2.1.4");
        let s = state.next().await.unwrap();
        assert_eq!(s.config.lamp_usage, Usage::Use);

        link.submit(&Command::Open).await.unwrap();
        link.submit(&Command::ReadConfig).await.unwrap();
        assert_eq!(
            platform.written(),
            vec!["AT+OPEN\r\n".to_string(), "AT+READCONF\r\n".to_string()]
        );

        link.disconnect().await;
        assert_eq!(link.connection_state(), ConnectionState::Disconnected);
        assert_eq!(link.snapshot().config.version, "2.1.4");
        assert_eq!(link.snapshot().monitor.gate, GatePosition::Unknown);
    }

    #[tokio::test]
    async fn test_watch_connection_sees_transitions() {
        let (link, _platform) = link(Script::new());
        let mut watch = link.watch_connection();
        link.connect().await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(1),
            watch.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
        link.disconnect().await;
        assert_eq!(*watch.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_explicit_permission_request_publishes_notice() {
        let platform = Arc::new(ScriptedPlatform::single_board().without_permission(true));
        let link = GateLink::new(
            Arc::clone(&platform) as Arc<dyn DevicePlatform>,
            GateSettings::default(),
        );
        let mut notices = link.notices();
        let device = link.list_available_devices().unwrap().remove(0);

        assert!(link.request_permission(&device).await);
        assert_eq!(
            notices.try_recv().unwrap(),
            Notice::PermissionResult {
                device,
                granted: true
            }
        );
        link.connect().await.unwrap();
        link.disconnect().await;
    }
}
