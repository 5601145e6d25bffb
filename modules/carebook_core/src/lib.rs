//! Carebook clinic core: per-user namespaced persistence, session and
//! authorization, access logging with a best-effort remote relay, and the
//! change notifications the UI subscribes to.

// === PUBLIC CONTRACT ===
pub mod contract;

pub use contract::{error, model};

// === MODULE DEFINITION ===
pub mod module;
pub use module::{CarebookCore, SessionData};

pub mod config;
pub mod gate;

// === INTERNAL MODULES ===
// Exposed for tests and for hosts that wire their own backends.
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;
