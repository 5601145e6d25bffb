use thiserror::Error;

/// Failure to write through to the key/value backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend error: {message}")]
    Backend { message: String },

    #[error("Serialization failed for '{key}': {message}")]
    Serialize { key: String, message: String },

    #[error("Refusing to save '{collection}' before it was loaded for this session")]
    NotLoaded { collection: String },
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }

    pub fn serialize(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialize {
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub fn not_loaded(collection: impl Into<String>) -> Self {
        Self::NotLoaded {
            collection: collection.into(),
        }
    }
}

/// Relay failures. Logged and dropped by the access log, never surfaced.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Relay answered HTTP {status}")]
    Status { status: u16 },

    #[error("Relay endpoint is not usable: {message}")]
    Endpoint { message: String },
}
