//! Storage key layout.
//!
//! Every key owned by the system starts with [`RESERVED_PREFIX`]. Per-user
//! collections live under `carebook_v2_<sanitized identifier>_<collection>`,
//! shared records under fixed names.

use sha2::{Digest, Sha256};

pub const RESERVED_PREFIX: &str = "carebook";
const NAMESPACE_VERSION: &str = "v2";

pub const KEY_USERS: &str = "carebook_auth_users";
pub const KEY_CURRENT_SESSION: &str = "carebook_current_session";
pub const KEY_SESSION_STARTED_AT: &str = "carebook_session_started_at";
pub const KEY_UNIVERSAL_LOGOUT_AT: &str = "carebook_universal_logout_at";
pub const KEY_RECOVERY_REQUESTS: &str = "carebook_recovery_requests";
pub const KEY_GLOBAL_CONFIG: &str = "carebook_global_master_config";
pub const KEY_GLOBAL_LOGS: &str = "carebook_global_logs";

/// Relay object names are `<RELAY_NAME_PREFIX>_<email>`.
pub const RELAY_NAME_PREFIX: &str = "carebook_log";

const FILLER: char = '_';
const MAX_SANITIZED_LEN: usize = 64;
const TRUNCATED_LEN: usize = 40;
const DIGEST_HEX_LEN: usize = 16;

/// Trim and lowercase a user-supplied identifier.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// True for keys that belong to the system (export, import, usage).
pub fn is_reserved(key: &str) -> bool {
    key.strip_prefix(RESERVED_PREFIX)
        .is_some_and(|rest| rest.starts_with('_'))
}

/// Storage-safe form of an identifier.
///
/// ASCII alphanumerics pass through; every other byte of the UTF-8 encoding
/// becomes the filler followed by two lowercase hex digits, so the mapping is
/// injective (`_` itself turns into `_5f`). Results longer than 64 characters
/// are cut and suffixed with `_h` and a SHA-256 prefix of the identifier;
/// `h` is never produced by an escape, so hashed and plain forms cannot meet.
pub fn sanitize_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len());
    for byte in identifier.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push(FILLER);
            out.push_str(&format!("{byte:02x}"));
        }
    }

    if out.len() <= MAX_SANITIZED_LEN {
        return out;
    }

    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
    // cut on an escape boundary so the kept part stays well-formed
    let mut cut = TRUNCATED_LEN;
    while cut > 0 && out.as_bytes()[cut - 1] == FILLER as u8 {
        cut -= 1;
    }
    if cut >= 2 && out.as_bytes()[cut - 2] == FILLER as u8 {
        cut -= 2;
    }
    format!("{}{FILLER}h{}", &out[..cut], &digest[..DIGEST_HEX_LEN])
}

/// Key of one per-user collection.
pub fn namespaced_key(identifier: &str, collection: &str) -> String {
    format!(
        "{RESERVED_PREFIX}_{NAMESPACE_VERSION}_{}_{collection}",
        sanitize_identifier(identifier)
    )
}

/// Scratch key used when nobody is logged in. Not reserved, never exported.
pub fn guest_key(collection: &str) -> String {
    format!("guest_{collection}")
}
