//! The emulated card and the services behind it

use std::path::PathBuf;
use std::sync::Arc;

use nfcemu_apdu::{Command, Response, hex::encode_upper};
use tracing::debug;

use crate::aid::{AidRegistry, MemoryAidRegistry};
use crate::clock::VersionClock;
use crate::engine::ScenarioEngine;
use crate::filter::CommunicationFilter;
use crate::log::{ActiveLog, CommunicationLog, Origin, Outcome};
use crate::router::CommandRouter;
use crate::settings::{MemorySettings, SettingsStore};
use crate::status::StatusTracker;
use crate::store::{MemoryScenarioStore, ScenarioStore};

/// Owned set of services making up one emulated card
///
/// Clones share the same services.
#[derive(Debug, Clone)]
pub struct Emulator {
    clock: VersionClock,
    aids: Arc<dyn AidRegistry>,
    store: Arc<dyn ScenarioStore>,
    filter: Arc<CommunicationFilter>,
    log: Arc<dyn ActiveLog>,
    status: StatusTracker,
    engine: Arc<ScenarioEngine>,
}

impl Emulator {
    /// Assemble an emulator from its collaborators
    ///
    /// Every collaborator must bump `clock` on its own mutations.
    pub fn new(
        clock: VersionClock,
        aids: Arc<dyn AidRegistry>,
        store: Arc<dyn ScenarioStore>,
        settings: Arc<dyn SettingsStore>,
        log: Arc<dyn ActiveLog>,
    ) -> Self {
        let status = StatusTracker::new();
        let engine = Arc::new(ScenarioEngine::new(
            clock.clone(),
            store.clone(),
            settings,
            log.clone(),
            status.clone(),
        ));
        Self {
            filter: Arc::new(CommunicationFilter::new(clock.clone())),
            clock,
            aids,
            store,
            log,
            status,
            engine,
        }
    }

    /// Emulator backed by in-memory stores, saving logs under `log_root`
    pub fn in_memory(log_root: impl Into<PathBuf>) -> Self {
        let clock = VersionClock::new();
        Self::new(
            clock.clone(),
            Arc::new(MemoryAidRegistry::new(clock.clone())),
            Arc::new(MemoryScenarioStore::new(clock.clone())),
            Arc::new(MemorySettings::new(clock)),
            Arc::new(CommunicationLog::new(log_root)),
        )
    }

    /// Card interface entry point: answer one command from the reader
    pub fn process_apdu(&self, command: &[u8]) -> Option<Response> {
        if !self.aids.is_enabled() {
            debug!("Card emulation disabled");
            return None;
        }
        match Command::from_bytes(command) {
            Ok(parsed) => debug!(
                ins = format_args!("{:#04x}", parsed.ins),
                case = %parsed.case(),
                "Command from reader"
            ),
            Err(e) => debug!(%e, "Command outside the short layouts"),
        }
        self.record(&format!("REQ: {}", encode_upper(command)));
        let response = self.engine.process_command(command);
        if let Some(response) = &response {
            self.record(&format!("RESP: {}", response.to_hex()));
        }
        response
    }

    /// Card interface entry point: the reader left the field
    pub fn on_deactivated(&self) {
        self.engine.on_deactivated();
    }

    /// Router applying command payloads to this emulator
    pub fn router(&self) -> CommandRouter {
        CommandRouter::new(self.clone())
    }

    fn record(&self, message: &str) {
        if !self.filter.should_hide(message) {
            self.log.append(message, Origin::Card, Outcome::Neutral);
        }
    }

    /// Shared version clock
    pub const fn clock(&self) -> &VersionClock {
        &self.clock
    }

    /// AID registry
    pub fn aids(&self) -> &dyn AidRegistry {
        &*self.aids
    }

    /// Scenario store
    pub fn store(&self) -> &dyn ScenarioStore {
        &*self.store
    }

    /// Communication filters
    pub fn filter(&self) -> &CommunicationFilter {
        &self.filter
    }

    /// User-visible log
    pub fn log(&self) -> &dyn ActiveLog {
        &*self.log
    }

    /// Status tracker
    pub const fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// Scenario engine
    pub fn engine(&self) -> &ScenarioEngine {
        &self.engine
    }
}
