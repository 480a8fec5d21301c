// src/store.rs
//
// Device state store. One writer (the session read loop) replaces the current
// snapshot; every subscriber receives the snapshot current at subscribe time
// followed by each later snapshot, in order, none skipped.
//
// Each subscriber owns an unbounded queue. Publishing happens under the store
// lock, so every queue receives update N before update N+1 is produced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};

use crate::notice::Notice;
use crate::protocol::{interpret, DeviceState, Interpretation};

const NOTICE_CAPACITY: usize = 16;

/// Snapshot stream handed out by [`DeviceStateStore::subscribe`].
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<Arc<DeviceState>>,
}

impl StateSubscription {
    /// Wait for the next snapshot. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Arc<DeviceState>> {
        self.rx.recv().await
    }

    /// Next queued snapshot, if any, without waiting.
    pub fn try_next(&mut self) -> Option<Arc<DeviceState>> {
        self.rx.try_recv().ok()
    }
}

struct StoreInner {
    current: Arc<DeviceState>,
    subscribers: Vec<mpsc::UnboundedSender<Arc<DeviceState>>>,
}

pub struct DeviceStateStore {
    inner: Mutex<StoreInner>,
    notice_tx: broadcast::Sender<Notice>,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        DeviceStateStore::new()
    }
}

impl DeviceStateStore {
    pub fn new() -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        DeviceStateStore {
            inner: Mutex::new(StoreInner {
                current: Arc::new(DeviceState::default()),
                subscribers: Vec::new(),
            }),
            notice_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Arc<DeviceState> {
        Arc::clone(&self.lock().current)
    }

    /// Subscribe to snapshots. The current snapshot is queued immediately.
    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Cannot fail: `rx` is still held here.
        let _ = tx.send(Arc::clone(&inner.current));
        inner.subscribers.push(tx);
        StateSubscription { rx }
    }

    /// One-shot notices published from now on. Past notices are not replayed.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Interpret one received line against the current snapshot and publish
    /// the outcome. Returns true when a new snapshot was published.
    pub(crate) fn apply_line(&self, line: &str) -> bool {
        let mut inner = self.lock();
        match interpret(line, &inner.current) {
            Interpretation::Updated(next) => {
                publish(&mut inner, Arc::new(next));
                true
            }
            Interpretation::Notice(notice) => {
                drop(inner);
                self.notify(notice);
                false
            }
            Interpretation::Unchanged => false,
        }
    }

    /// Return to the default snapshot at the start of a session.
    pub(crate) fn reset(&self) {
        let mut inner = self.lock();
        if *inner.current != DeviceState::default() {
            publish(&mut inner, Arc::new(DeviceState::default()));
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        // Err only means nobody is listening.
        let _ = self.notice_tx.send(notice);
    }
}

fn publish(inner: &mut StoreInner, next: Arc<DeviceState>) {
    inner
        .subscribers
        .retain(|tx| tx.send(Arc::clone(&next)).is_ok());
    inner.current = next;
}
