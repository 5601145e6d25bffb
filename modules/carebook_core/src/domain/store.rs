use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::contract::model::{
    AccessLogEntry, Backup, ClinicSettings, GlobalConfig, Record, RecoveryRequest, StorageUsage,
    UserAccount,
};
use crate::domain::collections::{Appointments, Collection, Finances, Patients, Settings};
use crate::domain::error::StoreError;
use crate::domain::events::{CarebookEvent, ChangeScope};
use crate::domain::keys::{
    guest_key, is_reserved, namespaced_key, KEY_CURRENT_SESSION, KEY_GLOBAL_CONFIG,
    KEY_GLOBAL_LOGS, KEY_RECOVERY_REQUESTS, KEY_SESSION_STARTED_AT, KEY_UNIVERSAL_LOGOUT_AT,
    KEY_USERS, RESERVED_PREFIX,
};
use crate::domain::ports::{EventPublisher, KeyValueStore};

/// Maps in-memory collections and shared records onto the key/value backend.
///
/// Reads never fail: a missing, unreadable or corrupt value yields the
/// type's default and a warning. Writes go straight through to the backend.
///
/// The session pointer may live in a backend of its own, so that clients
/// sharing one data backend each keep their own session.
pub struct PersistenceStore {
    kv: Arc<dyn KeyValueStore>,
    session_kv: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventPublisher<CarebookEvent>>,
}

impl PersistenceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, events: Arc<dyn EventPublisher<CarebookEvent>>) -> Self {
        Self::with_session_store(kv.clone(), kv, events)
    }

    pub fn with_session_store(
        kv: Arc<dyn KeyValueStore>,
        session_kv: Arc<dyn KeyValueStore>,
        events: Arc<dyn EventPublisher<CarebookEvent>>,
    ) -> Self {
        Self {
            kv,
            session_kv,
            events,
        }
    }

    // --- raw access ---

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %format!("{e:#}"), "storage read failed, using default");
                None
            }
        }
    }

    fn read_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.read_raw(key) else {
            return T::default();
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "corrupt JSON in storage, using default");
                T::default()
            }
        }
    }

    fn write_raw(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        self.kv
            .set(key, raw)
            .map_err(|e| StoreError::backend(format!("{e:#}")))
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::serialize(key, e))?;
        self.write_raw(key, &raw)
    }

    fn read_instant(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.read_raw(key)?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(key, error = %e, "unparsable timestamp in storage, ignoring");
                None
            }
        }
    }

    // --- session pointer ---

    fn read_session(&self, key: &str) -> Option<String> {
        match self.session_kv.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %format!("{e:#}"), "session read failed, assuming none");
                None
            }
        }
    }

    /// Identifier of the logged-in session, if any.
    pub fn current_identifier(&self) -> Option<String> {
        self.read_session(KEY_CURRENT_SESSION)
            .filter(|s| !s.is_empty())
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.read_session(KEY_SESSION_STARTED_AT)?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(error = %e, "unparsable session start, ignoring");
                None
            }
        }
    }

    pub fn set_session(&self, identifier: &str, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        let backend = |e: anyhow::Error| StoreError::backend(format!("{e:#}"));
        self.session_kv
            .set(KEY_SESSION_STARTED_AT, &started_at.to_rfc3339())
            .map_err(backend)?;
        self.session_kv
            .set(KEY_CURRENT_SESSION, identifier)
            .map_err(backend)
    }

    pub fn clear_session(&self) -> Result<(), StoreError> {
        let backend = |e: anyhow::Error| StoreError::backend(format!("{e:#}"));
        self.session_kv
            .remove(KEY_CURRENT_SESSION)
            .map_err(backend)?;
        self.session_kv
            .remove(KEY_SESSION_STARTED_AT)
            .map_err(backend)
    }

    pub fn universal_logout_at(&self) -> Option<DateTime<Utc>> {
        self.read_instant(KEY_UNIVERSAL_LOGOUT_AT)
    }

    pub fn set_universal_logout_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write_raw(KEY_UNIVERSAL_LOGOUT_AT, &at.to_rfc3339())
    }

    // --- per-user collections ---

    /// Key of `collection` for the current session, or the guest scratch key.
    pub fn collection_key(&self, collection: &str) -> String {
        match self.current_identifier() {
            Some(id) => namespaced_key(&id, collection),
            None => guest_key(collection),
        }
    }

    pub fn load<C: Collection>(&self) -> C::Value {
        self.read_json(&self.collection_key(C::NAME))
    }

    pub fn save<C: Collection>(&self, value: &C::Value) -> Result<(), StoreError> {
        self.write_json(&self.collection_key(C::NAME), value)
    }

    /// Collection of an explicit identifier, regardless of the session.
    pub fn load_for<C: Collection>(&self, identifier: &str) -> C::Value {
        self.read_json(&namespaced_key(identifier, C::NAME))
    }

    pub fn save_for<C: Collection>(
        &self,
        identifier: &str,
        value: &C::Value,
    ) -> Result<(), StoreError> {
        self.write_json(&namespaced_key(identifier, C::NAME), value)
    }

    pub fn load_patients(&self) -> Vec<Record> {
        self.load::<Patients>()
    }

    pub fn save_patients(&self, patients: &[Record]) -> Result<(), StoreError> {
        self.write_json(&self.collection_key(Patients::NAME), patients)
    }

    pub fn load_appointments(&self) -> Vec<Record> {
        self.load::<Appointments>()
    }

    pub fn save_appointments(&self, appointments: &[Record]) -> Result<(), StoreError> {
        self.write_json(&self.collection_key(Appointments::NAME), appointments)
    }

    pub fn load_finances(&self) -> Vec<Record> {
        self.load::<Finances>()
    }

    pub fn save_finances(&self, finances: &[Record]) -> Result<(), StoreError> {
        self.write_json(&self.collection_key(Finances::NAME), finances)
    }

    pub fn load_settings(&self) -> ClinicSettings {
        self.load::<Settings>()
    }

    pub fn save_settings(&self, settings: &ClinicSettings) -> Result<(), StoreError> {
        self.save::<Settings>(settings)
    }

    // --- shared records ---

    pub fn load_users(&self) -> Vec<UserAccount> {
        self.read_json(KEY_USERS)
    }

    pub fn save_users(&self, users: &[UserAccount]) -> Result<(), StoreError> {
        self.write_json(KEY_USERS, users)
    }

    pub fn load_global_config(&self) -> GlobalConfig {
        self.read_json(KEY_GLOBAL_CONFIG)
    }

    pub fn save_global_config(&self, config: &GlobalConfig) -> Result<(), StoreError> {
        self.write_json(KEY_GLOBAL_CONFIG, config)
    }

    pub fn load_logs(&self) -> Vec<AccessLogEntry> {
        self.read_json(KEY_GLOBAL_LOGS)
    }

    pub fn save_logs(&self, logs: &[AccessLogEntry]) -> Result<(), StoreError> {
        self.write_json(KEY_GLOBAL_LOGS, logs)
    }

    pub fn load_recovery_requests(&self) -> Vec<RecoveryRequest> {
        self.read_json(KEY_RECOVERY_REQUESTS)
    }

    pub fn save_recovery_requests(&self, requests: &[RecoveryRequest]) -> Result<(), StoreError> {
        self.write_json(KEY_RECOVERY_REQUESTS, requests)
    }

    // --- backup / restore ---

    fn reserved_snapshot(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let keys = self
            .kv
            .keys()
            .map_err(|e| StoreError::backend(format!("{e:#}")))?;

        let mut snapshot = BTreeMap::new();
        for key in keys.into_iter().filter(|k| is_reserved(k)) {
            let value = self
                .kv
                .get(&key)
                .map_err(|e| StoreError::backend(format!("{e:#}")))?;
            if let Some(value) = value {
                snapshot.insert(key, value);
            }
        }
        Ok(snapshot)
    }

    /// Snapshot of every reserved key, all users included.
    #[instrument(name = "carebook.store.export_all", skip(self))]
    pub fn export_all(&self) -> Result<Backup, StoreError> {
        let snapshot = self.reserved_snapshot()?;
        let contents = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::serialize("backup", e))?;
        let file_name = format!(
            "{RESERVED_PREFIX}_backup_{}.json",
            Utc::now().format("%Y-%m-%d")
        );

        info!(keys = snapshot.len(), file_name = %file_name, "Store exported");
        Ok(Backup {
            file_name,
            contents,
        })
    }

    /// Restore a snapshot produced by [`export_all`](Self::export_all).
    ///
    /// Reserved keys overwrite whatever is stored under the same name; other
    /// keys are ignored. Returns `false` for anything that is not a non-empty
    /// JSON object, or when the backend rejects a write (keys written before
    /// the failure stay written).
    #[instrument(name = "carebook.store.import_all", skip_all, fields(len = blob.len()))]
    pub fn import_all(&self, blob: &str) -> bool {
        let parsed: serde_json::Value = match serde_json::from_str(blob) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Backup is not valid JSON");
                return false;
            }
        };

        let Some(entries) = parsed.as_object().filter(|o| !o.is_empty()) else {
            warn!("Backup is not a non-empty JSON object");
            return false;
        };

        let mut written = 0usize;
        for (key, value) in entries {
            if !is_reserved(key) {
                debug!(key = %key, "Ignoring foreign key in backup");
                continue;
            }
            let raw = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Err(e) = self.write_raw(key, &raw) {
                warn!(key = %key, error = %e, "Restore aborted");
                return false;
            }
            written += 1;
        }

        self.events.publish(&CarebookEvent::ConfigChanged);
        self.events.publish(&CarebookEvent::DirectoryChanged {
            scope: ChangeScope::All,
        });

        info!(written, "Store restored from backup");
        true
    }

    /// Byte count of reserved keys and values. Approximate, for display.
    pub fn storage_usage(&self) -> StorageUsage {
        match self.reserved_snapshot() {
            Ok(snapshot) => StorageUsage {
                bytes: snapshot
                    .iter()
                    .map(|(k, v)| (k.len() + v.len()) as u64)
                    .sum(),
            },
            Err(e) => {
                warn!(error = %e, "Cannot estimate storage usage");
                StorageUsage { bytes: 0 }
            }
        }
    }
}
