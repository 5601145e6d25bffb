use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::contract::model::{AccessAction, AccessLogEntry, AccessStatus};
use crate::domain::device::DeviceInfo;
use crate::domain::events::{CarebookEvent, ChangeScope};
use crate::domain::ports::{EventPublisher, RelayPort};
use crate::domain::store::PersistenceStore;

/// Local ring size; older entries are evicted first.
pub const ACCESS_LOG_CAPACITY: usize = 100;

/// Trailing window in which an identifier counts as online.
pub const ONLINE_WINDOW_MINUTES: i64 = 10;

/// Bounded local audit trail with a best-effort remote copy.
pub struct AccessLog {
    store: Arc<PersistenceStore>,
    relay: Option<Arc<dyn RelayPort>>,
    events: Arc<dyn EventPublisher<CarebookEvent>>,
    device: DeviceInfo,
}

impl AccessLog {
    /// `relay = None` disables remote propagation without touching local behavior.
    pub fn new(
        store: Arc<PersistenceStore>,
        relay: Option<Arc<dyn RelayPort>>,
        events: Arc<dyn EventPublisher<CarebookEvent>>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            store,
            relay,
            events,
            device,
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Append an entry, newest first, keep the newest 100 and persist.
    ///
    /// The relay push is spawned on the ambient Tokio runtime and never
    /// awaited; without a runtime it is skipped. Nothing here fails the caller.
    #[instrument(name = "carebook.access_log.record", skip(self), fields(identifier = %identifier))]
    pub fn record(
        &self,
        identifier: &str,
        action: AccessAction,
        status: AccessStatus,
    ) -> AccessLogEntry {
        let entry = AccessLogEntry {
            id: Uuid::new_v4().to_string(),
            email: identifier.to_string(),
            timestamp: Utc::now(),
            device: self.device.description(),
            action,
            status,
            is_remote: false,
        };

        let mut logs = self.store.load_logs();
        logs.insert(0, entry.clone());
        logs.truncate(ACCESS_LOG_CAPACITY);

        if let Err(e) = self.store.save_logs(&logs) {
            warn!(error = %e, "Access log entry not persisted");
        }
        self.events.publish(&CarebookEvent::DirectoryChanged {
            scope: ChangeScope::Logs,
        });

        self.spawn_push(&entry);
        entry
    }

    fn spawn_push(&self, entry: &AccessLogEntry) {
        let Some(relay) = self.relay.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, relay push skipped");
            return;
        };

        let entry = entry.clone();
        handle.spawn(async move {
            if let Err(e) = relay.push(&entry).await {
                debug!(error = %e, entry_id = %entry.id, "Relay push failed (ignored)");
            }
        });
    }

    /// Local entries, newest first.
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.store.load_logs()
    }

    /// Entries other devices published to the relay; empty on any failure.
    #[instrument(name = "carebook.access_log.pull_remote", skip(self))]
    pub async fn pull_remote(&self) -> Vec<AccessLogEntry> {
        let Some(relay) = &self.relay else {
            return Vec::new();
        };
        match relay.pull().await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Relay pull failed, showing local entries only");
                Vec::new()
            }
        }
    }

    /// Local and remote entries together, newest first. Entries the relay
    /// echoes back from this store are shown once.
    pub async fn merged_with_remote(&self) -> Vec<AccessLogEntry> {
        let mut all = self.entries();
        let local_ids: HashSet<String> = all.iter().map(|e| e.id.clone()).collect();
        all.extend(
            self.pull_remote()
                .await
                .into_iter()
                .filter(|e| !local_ids.contains(&e.id)),
        );
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }
}

/// Identifiers whose most recent entry lies within the trailing window
/// ending at `now`, most recently seen first.
pub fn online_users(entries: &[AccessLogEntry], now: DateTime<Utc>) -> Vec<String> {
    let window_start = now - Duration::minutes(ONLINE_WINDOW_MINUTES);

    let mut latest: Vec<(&str, DateTime<Utc>)> = Vec::new();
    for entry in entries {
        match latest.iter_mut().find(|(email, _)| *email == entry.email) {
            Some((_, seen)) if entry.timestamp > *seen => *seen = entry.timestamp,
            Some(_) => {}
            None => latest.push((entry.email.as_str(), entry.timestamp)),
        }
    }

    latest.retain(|(_, seen)| *seen >= window_start && *seen <= now);
    latest.sort_by(|a, b| b.1.cmp(&a.1));
    latest.into_iter().map(|(email, _)| email.to_string()).collect()
}
