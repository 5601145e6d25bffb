use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for the carebook_core module, read from
/// `modules.carebook_core` of the application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarebookConfig {
    /// Remote log relay; no endpoint disables relaying.
    #[serde(default)]
    pub relay_endpoint: Option<Url>,
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,
    /// Label stored in every access log entry's device description.
    #[serde(default = "default_client_label")]
    pub client_label: String,
    /// Host name sent with relayed entries; detected when unset.
    #[serde(default)]
    pub origin_host: Option<String>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub session_scope: SessionScope,
}

/// Where the session pointer is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionScope {
    /// In the data backend, shared by every client of that backend.
    #[default]
    Shared,
    /// In process memory. Clients sharing a store file keep separate
    /// sessions and see each other's universal logout.
    Process,
}

impl Default for CarebookConfig {
    fn default() -> Self {
        Self {
            relay_endpoint: None,
            relay_timeout_ms: default_relay_timeout_ms(),
            client_label: default_client_label(),
            origin_host: None,
            event_capacity: default_event_capacity(),
            session_scope: SessionScope::default(),
        }
    }
}

impl CarebookConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }
}

fn default_relay_timeout_ms() -> u64 {
    5_000
}

fn default_client_label() -> String {
    format!("carebook/{}", env!("CARGO_PKG_VERSION"))
}

fn default_event_capacity() -> usize {
    64
}
