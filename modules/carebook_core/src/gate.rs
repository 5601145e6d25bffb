//! Load-before-save guard for hosts that keep collections in memory.
//!
//! A host that saves its in-memory copy before loading the session's data
//! would overwrite that data with empty defaults. The gate opens only after
//! the data of the current session was loaded and closes again on logout.

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Closed,
    /// Data loaded for this session identifier (`None` = guest).
    Open(Option<String>),
}

#[derive(Debug)]
pub struct DataGate {
    state: Mutex<GateState>,
}

impl Default for DataGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
        }
    }

    pub fn mark_loaded(&self, identifier: Option<&str>) {
        *self.state.lock() = GateState::Open(identifier.map(str::to_string));
    }

    pub fn reset(&self) {
        *self.state.lock() = GateState::Closed;
    }

    /// True when saves for `current` may proceed. A session switch without
    /// a fresh load keeps the gate shut.
    pub fn is_open_for(&self, current: Option<&str>) -> bool {
        match &*self.state.lock() {
            GateState::Closed => false,
            GateState::Open(loaded) => loaded.as_deref() == current,
        }
    }
}
