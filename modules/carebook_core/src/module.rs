use std::sync::Arc;

use anyhow::Context;
use runtime::{AppConfig, StorageBackend};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{CarebookConfig, SessionScope};
use crate::contract::error::AuthError;
use crate::contract::model::{AccessAction, AccessStatus, ClinicSettings, Record, SessionInfo};
use crate::domain::access_log::AccessLog;
use crate::domain::collections::Collection;
use crate::domain::device::DeviceInfo;
use crate::domain::error::StoreError;
use crate::domain::events::CarebookEvent;
use crate::domain::ports::{EventPublisher, KeyValueStore, RelayPort};
use crate::domain::session::SessionManager;
use crate::domain::store::PersistenceStore;
use crate::gate::DataGate;
use crate::infra::events::BroadcastEvents;
use crate::infra::relay::HttpRelayClient;
use crate::infra::storage::{JsonFileStore, MemoryStore};

pub const MODULE_NAME: &str = "carebook_core";

/// Per-user collections of the current session, loaded in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub patients: Vec<Record>,
    pub appointments: Vec<Record>,
    pub finances: Vec<Record>,
    pub settings: ClinicSettings,
}

/// The wired core: one store, one access log, one session manager and one
/// event bus per process. Cheap to clone.
#[derive(Clone)]
pub struct CarebookCore {
    store: Arc<PersistenceStore>,
    sessions: Arc<SessionManager>,
    access_log: Arc<AccessLog>,
    events: BroadcastEvents,
    gate: Arc<DataGate>,
    config: CarebookConfig,
}

impl CarebookCore {
    /// Wire the components over an existing backend. `relay = None` keeps
    /// the access log local.
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        relay: Option<Arc<dyn RelayPort>>,
        config: &CarebookConfig,
    ) -> Self {
        let device = DeviceInfo::detect(&config.client_label, config.origin_host.as_deref());
        Self::with_device(kv, relay, config, device)
    }

    /// Like [`new`](Self::new) with an already detected device, so the
    /// access log and the relay client describe the same machine.
    pub fn with_device(
        kv: Arc<dyn KeyValueStore>,
        relay: Option<Arc<dyn RelayPort>>,
        config: &CarebookConfig,
        device: DeviceInfo,
    ) -> Self {
        let events = BroadcastEvents::new(config.event_capacity);
        let publisher: Arc<dyn EventPublisher<CarebookEvent>> = Arc::new(events.clone());

        let session_kv: Arc<dyn KeyValueStore> = match config.session_scope {
            SessionScope::Shared => kv.clone(),
            SessionScope::Process => Arc::new(MemoryStore::new()),
        };
        let store = Arc::new(PersistenceStore::with_session_store(
            kv,
            session_kv,
            publisher.clone(),
        ));
        let access_log = Arc::new(AccessLog::new(
            store.clone(),
            relay,
            publisher.clone(),
            device,
        ));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            access_log.clone(),
            publisher,
        ));

        Self {
            store,
            sessions,
            access_log,
            events,
            gate: Arc::new(DataGate::new()),
            config: config.clone(),
        }
    }

    /// Build the core from the application config: storage backend from the
    /// `storage` section, relay and labels from `modules.carebook_core`.
    pub fn from_app_config(app: &AppConfig) -> anyhow::Result<Self> {
        let cfg: CarebookConfig = app.module_config(MODULE_NAME)?;
        let storage = app.storage_or_default();

        let kv: Arc<dyn KeyValueStore> = match storage.backend {
            StorageBackend::File => {
                let path = storage.resolved_path(std::path::Path::new(&app.app.home_dir));
                Arc::new(JsonFileStore::open(&path)?)
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
        };

        let device = DeviceInfo::detect(&cfg.client_label, cfg.origin_host.as_deref());
        let relay: Option<Arc<dyn RelayPort>> = match &cfg.relay_endpoint {
            Some(endpoint) => {
                let client = HttpRelayClient::new(
                    endpoint.clone(),
                    cfg.relay_timeout(),
                    device.host.clone(),
                    device.clone(),
                )
                .context("Failed to build relay client")?;
                info!(endpoint = %endpoint, "Access log relay enabled");
                Some(Arc::new(client))
            }
            None => {
                debug!("No relay endpoint configured, access log stays local");
                None
            }
        };

        Ok(Self::with_device(kv, relay, &cfg, device))
    }

    /// Volatile core with defaults and no relay.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            None,
            &CarebookConfig::default(),
        )
    }

    pub fn store(&self) -> &Arc<PersistenceStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.access_log
    }

    pub fn events(&self) -> &BroadcastEvents {
        &self.events
    }

    pub fn gate(&self) -> &DataGate {
        &self.gate
    }

    pub fn config(&self) -> &CarebookConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CarebookEvent> {
        self.events.subscribe()
    }

    /// Log in and close the gate until the new session's data is loaded.
    pub fn login(&self, identifier: &str, secret: &str) -> Result<SessionInfo, AuthError> {
        let session = self.sessions.login(identifier, secret)?;
        self.gate.reset();
        Ok(session)
    }

    pub fn logout(&self) -> Option<String> {
        self.gate.reset();
        self.sessions.logout()
    }

    /// Apply a pending universal logout. Returns `true` when the session ended.
    pub fn poll_universal_logout(&self) -> bool {
        let ended = self.sessions.poll_universal_logout();
        if ended {
            self.gate.reset();
        }
        ended
    }

    /// Read every collection of the current session and open the gate for it.
    pub fn load_session_data(&self) -> SessionData {
        let data = SessionData {
            patients: self.store.load_patients(),
            appointments: self.store.load_appointments(),
            finances: self.store.load_finances(),
            settings: self.store.load_settings(),
        };
        self.gate
            .mark_loaded(self.store.current_identifier().as_deref());
        data
    }

    /// Save a collection for the current session, refused until
    /// [`load_session_data`](Self::load_session_data) ran for it.
    pub fn save<C: Collection>(&self, value: &C::Value) -> Result<(), StoreError> {
        let current = self.store.current_identifier();
        if !self.gate.is_open_for(current.as_deref()) {
            debug!(collection = C::NAME, "Save refused before load");
            return Err(StoreError::not_loaded(C::NAME));
        }
        self.store.save::<C>(value)
    }

    /// Restore a backup and leave a `DATA_UPDATE` trace for the session
    /// that did it. The gate closes; hosts reload before saving again.
    pub fn import_all(&self, blob: &str) -> bool {
        let ok = self.store.import_all(blob);
        if ok {
            // in-memory copies are stale now
            self.gate.reset();
        }
        if let Some(current) = self.store.current_identifier() {
            let status = if ok {
                AccessStatus::Success
            } else {
                AccessStatus::Error
            };
            self.access_log
                .record(&current, AccessAction::DataUpdate, status);
        }
        ok
    }
}
