#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use carebook_core::contract::model::AccessLogEntry;
use carebook_core::domain::access_log::AccessLog;
use carebook_core::domain::device::DeviceInfo;
use carebook_core::domain::error::RelayError;
use carebook_core::domain::events::CarebookEvent;
use carebook_core::domain::ports::{EventPublisher, KeyValueStore, RelayPort};
use carebook_core::domain::session::{SessionManager, SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET};
use carebook_core::domain::store::PersistenceStore;
use carebook_core::infra::storage::MemoryStore;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Captures every published event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<CarebookEvent>>,
}

impl RecordingEvents {
    pub fn take(&self) -> Vec<CarebookEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventPublisher<CarebookEvent> for RecordingEvents {
    fn publish(&self, event: &CarebookEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Memory store whose writes to selected keys fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.failing.lock().contains(key) {
            anyhow::bail!("disk full");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.inner.keys()
    }
}

/// Relay double: forwards pushes to a channel and serves a fixed pull.
pub struct ChannelRelay {
    pushed: mpsc::UnboundedSender<AccessLogEntry>,
    remote: Vec<AccessLogEntry>,
    fail: bool,
}

impl ChannelRelay {
    pub fn new(remote: Vec<AccessLogEntry>) -> (Self, mpsc::UnboundedReceiver<AccessLogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pushed: tx,
                remote,
                fail: false,
            },
            rx,
        )
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<AccessLogEntry>) {
        let (mut relay, rx) = Self::new(Vec::new());
        relay.fail = true;
        (relay, rx)
    }
}

#[async_trait]
impl RelayPort for ChannelRelay {
    async fn push(&self, entry: &AccessLogEntry) -> Result<(), RelayError> {
        let _ = self.pushed.send(entry.clone());
        if self.fail {
            return Err(RelayError::Status { status: 503 });
        }
        Ok(())
    }

    async fn pull(&self) -> Result<Vec<AccessLogEntry>, RelayError> {
        if self.fail {
            return Err(RelayError::Status { status: 503 });
        }
        Ok(self.remote.clone())
    }
}

pub struct Fixture {
    pub kv: Arc<dyn KeyValueStore>,
    pub store: Arc<PersistenceStore>,
    pub events: Arc<RecordingEvents>,
    pub log: Arc<AccessLog>,
    pub sessions: SessionManager,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MemoryStore::new()), None)
    }

    pub fn with_parts(kv: Arc<dyn KeyValueStore>, relay: Option<Arc<dyn RelayPort>>) -> Self {
        let events = Arc::new(RecordingEvents::default());
        let store = Arc::new(PersistenceStore::new(kv.clone(), events.clone()));
        let log = Arc::new(AccessLog::new(
            store.clone(),
            relay,
            events.clone(),
            DeviceInfo::detect("tests", Some("test-host")),
        ));
        let sessions = SessionManager::new(store.clone(), log.clone(), events.clone());
        Self {
            kv,
            store,
            events,
            log,
            sessions,
        }
    }

    pub fn login_admin(&self) {
        self.sessions
            .login(SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET)
            .expect("admin login");
    }

    /// Register `email` and log in as it.
    pub fn login_user(&self, email: &str) {
        self.sessions.signup(email, "pw").expect("signup");
        self.sessions.login(email, "pw").expect("login");
    }
}
