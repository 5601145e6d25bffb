use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which shared record a `DirectoryChanged` event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeScope {
    Users,
    Logs,
    RecoveryRequests,
    /// Everything may have changed (restore from backup).
    All,
}

/// Transport-agnostic notification for views holding copies of shared data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CarebookEvent {
    /// Global configuration was rewritten; re-read it.
    ConfigChanged,
    /// User directory, access log or recovery requests changed.
    DirectoryChanged { scope: ChangeScope },
    /// The session ended; drop every in-memory per-user collection.
    SessionEnded { identifier: Option<String> },
    /// Admin asked all regular sessions to log out.
    UniversalLogout { at: DateTime<Utc> },
}
