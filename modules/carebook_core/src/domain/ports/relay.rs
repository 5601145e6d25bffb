use async_trait::async_trait;

use crate::contract::model::AccessLogEntry;
use crate::domain::error::RelayError;

/// Transport-agnostic port to the shared remote copy of the access log.
/// Never authoritative: callers treat every error as "no remote data".
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// Publish one entry.
    async fn push(&self, entry: &AccessLogEntry) -> Result<(), RelayError>;
    /// Entries published by any device, marked `is_remote`.
    async fn pull(&self) -> Result<Vec<AccessLogEntry>, RelayError>;
}
