//! Default responses for commands no scenario step answers

use nfcemu_apdu::{StatusWord, status::common};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::VersionClock;

/// Status answered for commands outside the scripted flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum DefaultResponse {
    /// 90 00
    #[display("Success (9000)")]
    Success,
    /// 6A 82
    #[display("File Not Found (6A82)")]
    FileNotFound,
}

impl DefaultResponse {
    /// Status word sent for this choice
    pub const fn status(self) -> StatusWord {
        match self {
            Self::Success => common::SUCCESS,
            Self::FileNotFound => common::FILE_NOT_FOUND,
        }
    }
}

/// Source of the fallback status the engine answers with
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Fallback for the given selection state
    fn fallback_response(&self, selected: bool) -> StatusWord;
}

/// In-memory settings
#[derive(Debug)]
pub struct MemorySettings {
    clock: VersionClock,
    selected: RwLock<DefaultResponse>,
    unselected: RwLock<DefaultResponse>,
}

impl MemorySettings {
    /// Create settings with `9000` when selected and `6A82` otherwise
    pub fn new(clock: VersionClock) -> Self {
        Self::with_responses(clock, DefaultResponse::Success, DefaultResponse::FileNotFound)
    }

    /// Create settings with explicit defaults
    pub fn with_responses(
        clock: VersionClock,
        selected: DefaultResponse,
        unselected: DefaultResponse,
    ) -> Self {
        Self {
            clock,
            selected: RwLock::new(selected),
            unselected: RwLock::new(unselected),
        }
    }

    /// Change the fallback used while an application is selected
    pub fn set_selected_response(&self, response: DefaultResponse) {
        debug!(%response, "Setting selected fallback");
        *self.selected.write() = response;
        self.clock.bump();
    }

    /// Change the fallback used while nothing is selected
    pub fn set_unselected_response(&self, response: DefaultResponse) {
        debug!(%response, "Setting unselected fallback");
        *self.unselected.write() = response;
        self.clock.bump();
    }
}

impl SettingsStore for MemorySettings {
    fn fallback_response(&self, selected: bool) -> StatusWord {
        if selected {
            self.selected.read().status()
        } else {
            self.unselected.read().status()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_updates() {
        let clock = VersionClock::new();
        let settings = MemorySettings::new(clock.clone());
        assert_eq!(settings.fallback_response(true), common::SUCCESS);
        assert_eq!(settings.fallback_response(false), common::FILE_NOT_FOUND);

        settings.set_unselected_response(DefaultResponse::Success);
        assert_eq!(settings.fallback_response(false), common::SUCCESS);
        assert_eq!(clock.current(), 1);
    }

    #[test]
    fn test_wire_names() {
        let parsed: DefaultResponse = serde_json::from_str("\"FileNotFound\"").unwrap();
        assert_eq!(parsed, DefaultResponse::FileNotFound);
        assert_eq!(DefaultResponse::Success.to_string(), "Success (9000)");
    }
}
