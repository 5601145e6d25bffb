use thiserror::Error;

use crate::domain::error::StoreError;

/// Outcome of a failed credential operation. Never a panic, always a value
/// the UI maps to its own message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access blocked")]
    Blocked,

    #[error("Account '{email}' already exists")]
    AlreadyExists { email: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl AuthError {
    pub fn already_exists(email: impl Into<String>) -> Self {
        Self::AlreadyExists {
            email: email.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}

/// Refusal or failure of an admin-only operation. `Forbidden` and
/// `ProtectedAccount` are no-ops: nothing was written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Admin session required")]
    Forbidden,

    #[error("The super-admin account cannot be modified")]
    ProtectedAccount,

    #[error("User not found: {email}")]
    UserNotFound { email: String },

    #[error("Account '{email}' already exists")]
    AlreadyExists { email: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl AdminError {
    pub fn user_not_found(email: impl Into<String>) -> Self {
        Self::UserNotFound {
            email: email.into(),
        }
    }

    pub fn already_exists(email: impl Into<String>) -> Self {
        Self::AlreadyExists {
            email: email.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True for the silent refusals that leave all state untouched.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Forbidden | Self::ProtectedAccount)
    }
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}
