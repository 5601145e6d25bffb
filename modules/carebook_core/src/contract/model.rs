use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One opaque record of a per-user list collection (patient, appointment,
/// financial entry). Its shape belongs to the UI.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Entry of the shared user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Normalized identifier (trimmed, lowercase).
    pub email: String,
    /// Stored as entered; see DESIGN.md.
    pub password: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_active: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(email: String, password: String, now: DateTime<Utc>) -> Self {
        Self {
            email,
            password,
            blocked: false,
            created_at: now,
            last_active: now,
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub identifier: String,
    pub is_admin: bool,
    pub started_at: DateTime<Utc>,
}

/// Branding and behavior shared by every session; written by the admin only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    pub app_name: String,
    pub app_slogan: String,
    pub primary_color: String,
    pub accent_color: String,
    pub global_notice: String,
    pub base_assistant_instruction: String,
    pub maintenance_mode: bool,
    pub cover_image: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            app_name: "Carebook".to_string(),
            app_slogan: "Your clinic, organized".to_string(),
            primary_color: "#0f766e".to_string(),
            accent_color: "#f59e0b".to_string(),
            global_notice: String::new(),
            base_assistant_instruction:
                "You are a helpful medical practice assistant. Be concise and accurate."
                    .to_string(),
            maintenance_mode: false,
            cover_image: String::new(),
        }
    }
}

/// Per-user clinic settings singleton. Fields the UI adds beyond the known
/// ones are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClinicSettings {
    pub doctor_name: String,
    pub clinic_name: String,
    pub specialty: String,
    pub phone: String,
    pub address: String,
    pub currency: String,
    pub language: String,
    pub assistant_instruction: String,
    pub working_hours_start: String,
    pub working_hours_end: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            doctor_name: String::new(),
            clinic_name: String::new(),
            specialty: String::new(),
            phone: String::new(),
            address: String::new(),
            currency: "USD".to_string(),
            language: "en".to_string(),
            assistant_instruction: String::new(),
            working_hours_start: "09:00".to_string(),
            working_hours_end: "17:00".to_string(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Login,
    Logout,
    Heartbeat,
    DataUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub device: String,
    pub action: AccessAction,
    pub status: AccessStatus,
    /// Set on entries pulled back from the relay.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

/// Full-store snapshot ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub file_name: String,
    pub contents: String,
}

/// Approximate footprint of the reserved keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageUsage {
    pub bytes: u64,
}

impl fmt::Display for StorageUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        let b = self.bytes as f64;
        if b < KB {
            write!(f, "{} B", self.bytes)
        } else if b < MB {
            write!(f, "{:.2} KB", b / KB)
        } else {
            write!(f, "{:.2} MB", b / MB)
        }
    }
}
