//! Scenario engine
//!
//! The engine holds the active scenario and a strictly forward cursor into its
//! steps. Each command from the reader is compared against the step under the
//! cursor only; there is no searching ahead and no skipping.
//!
//! Processing never performs I/O, so it is safe to call from the card
//! interface callback.

use std::collections::HashSet;
use std::sync::Arc;

use nfcemu_apdu::{Response, Select, hex::encode_upper, status::common};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::VersionClock;
use crate::error::{Error, Result};
use crate::log::{ActiveLog, Origin, Outcome};
use crate::scenario::{Step, StepKind};
use crate::settings::SettingsStore;
use crate::status::StatusTracker;
use crate::store::ScenarioStore;

#[derive(Debug, Default)]
struct EngineState {
    current: Option<String>,
    steps: Vec<Step>,
    running: bool,
    silenced: bool,
    step_index: usize,
    is_selected: bool,
    single_consumed: HashSet<String>,
}

impl EngineState {
    fn reset(&mut self) {
        self.step_index = 0;
        self.is_selected = false;
        self.single_consumed.clear();
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Active scenario name
    pub current: Option<String>,
    /// Whether the scenario is running
    pub running: bool,
    /// Whether every command is ignored
    pub silenced: bool,
    /// Cursor into the scenario's steps
    pub step_index: usize,
    /// Number of steps in the scenario
    pub step_count: usize,
    /// Whether an application is selected
    pub is_selected: bool,
}

/// Decides the response to every command the reader sends
#[derive(Debug)]
pub struct ScenarioEngine {
    clock: VersionClock,
    store: Arc<dyn ScenarioStore>,
    settings: Arc<dyn SettingsStore>,
    log: Arc<dyn ActiveLog>,
    status: StatusTracker,
    state: Mutex<EngineState>,
}

impl ScenarioEngine {
    /// Create an engine with no active scenario
    pub fn new(
        clock: VersionClock,
        store: Arc<dyn ScenarioStore>,
        settings: Arc<dyn SettingsStore>,
        log: Arc<dyn ActiveLog>,
        status: StatusTracker,
    ) -> Self {
        Self {
            clock,
            store,
            settings,
            log,
            status,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Activate the named scenario, or unload the active one with `None`
    ///
    /// Activation resets the cursor and selection state. An unknown name is
    /// rejected and leaves the engine untouched. Unloading also stops it.
    pub fn set_current(&self, name: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        match name {
            Some(name) => {
                let scenario = self
                    .store
                    .load(name)
                    .ok_or_else(|| Error::UnknownScenario(name.to_string()))?;
                let steps = scenario.steps;
                info!(scenario = %scenario.name, steps = steps.len(), "Activating scenario");
                state.current = Some(scenario.name);
                state.steps = steps;
                state.reset();
                if state.running {
                    self.status.scenario_running();
                } else {
                    self.status.scenario_loaded();
                }
            }
            None => {
                info!(previous = ?state.current, "Unloading scenario");
                state.current = None;
                state.steps.clear();
                state.running = false;
                state.reset();
                self.status.scenario_unloaded();
            }
        }
        self.clock.bump();
        Ok(())
    }

    /// Unload the active scenario if it is `name`
    pub fn unload_if_current(&self, name: &str) -> bool {
        let is_current = self.state.lock().current.as_deref() == Some(name.trim());
        if is_current {
            // set_current(None) cannot fail
            let _ = self.set_current(None);
        }
        is_current
    }

    /// Start or stop the active scenario; both directions reset the cursor
    pub fn set_running(&self, running: bool) {
        let mut state = self.state.lock();
        state.running = running;
        state.reset();
        match (&state.current, running) {
            (Some(name), true) => {
                self.log.append(
                    &format!("STATE-SCEN: Scenario '{name}' started."),
                    Origin::Server,
                    Outcome::Success,
                );
                self.status.scenario_running();
            }
            (Some(name), false) => {
                self.log.append(
                    &format!("STATE-SCEN: Scenario '{name}' stopped."),
                    Origin::Server,
                    Outcome::Failure,
                );
                self.status.scenario_stopped();
            }
            (None, true) => warn!("Start requested without an active scenario"),
            (None, false) => {}
        }
        self.clock.bump();
    }

    /// Silence or unsilence the emulator; no-op when already in that state
    pub fn set_silenced(&self, silenced: bool) -> bool {
        let mut state = self.state.lock();
        if state.silenced == silenced {
            return false;
        }
        state.silenced = silenced;
        let subject = state
            .current
            .as_ref()
            .map_or_else(|| "Scenario".to_string(), |name| format!("Scenario '{name}'"));
        let verb = if silenced { "silenced" } else { "unsilenced" };
        self.log.append(
            &format!("STATE-SCEN: {subject} {verb}."),
            Origin::Server,
            Outcome::from(!silenced),
        );
        if !silenced && state.running && state.current.is_some() {
            self.status.scenario_running();
        } else {
            self.status.silenced(silenced, state.current.is_some());
        }
        self.clock.bump();
        true
    }

    /// Flip the silence flag, returning the new value
    pub fn toggle_silence(&self) -> bool {
        let silenced = !self.state.lock().silenced;
        self.set_silenced(silenced);
        silenced
    }

    /// The reader left the field
    pub fn on_deactivated(&self) {
        debug!("Card deactivated");
        self.state.lock().is_selected = false;
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock();
        EngineSnapshot {
            current: state.current.clone(),
            running: state.running,
            silenced: state.silenced,
            step_index: state.step_index,
            step_count: state.steps.len(),
            is_selected: state.is_selected,
        }
    }

    /// Decide the answer to a command, `None` meaning stay silent
    #[instrument(level = "debug", skip_all, fields(command = %encode_upper(command)))]
    pub fn process_command(&self, command: &[u8]) -> Option<Response> {
        let mut state = self.state.lock();
        if state.silenced {
            debug!("Silenced");
            return None;
        }
        if !state.running || state.current.is_none() {
            debug!("Not running");
            return None;
        }

        let select = Select::from_raw(command);
        if let Some(select) = &select
            && state.single_consumed.contains(&select.aid_hex())
        {
            debug!(aid = %select.aid_hex(), "Select already consumed");
            return None;
        }

        debug!(index = state.step_index, selected = state.is_selected, "Matching step");
        if let Some(step) = state.steps.get(state.step_index).cloned() {
            match &step.kind {
                StepKind::Select { aid, single_select } => {
                    if !select.as_ref().is_some_and(|s| s.targets(aid)) {
                        debug!(step = %step.name, "Select not matched");
                        return None;
                    }
                    debug!(step = %step.name, "Select matched");
                    state.is_selected = true;
                    if *single_select {
                        state.single_consumed.insert(aid.to_ascii_uppercase());
                    }
                    self.advance(&mut state);
                    return Some(Response::status(common::SUCCESS));
                }
                StepKind::RequestResponse {
                    request,
                    response,
                    needs_selection,
                } => {
                    if *needs_selection == state.is_selected
                        && encode_upper(command).eq_ignore_ascii_case(request)
                    {
                        debug!(step = %step.name, "Exchange matched");
                        match Response::from_hex(response) {
                            Ok(response) => {
                                self.advance(&mut state);
                                return Some(response);
                            }
                            Err(e) => warn!(step = %step.name, %e, "Unusable scripted response"),
                        }
                    } else {
                        debug!(step = %step.name, "Exchange not matched");
                    }
                }
            }
        }

        let fallback = self.settings.fallback_response(state.is_selected);
        debug!(%fallback, "Answering with fallback");
        Some(Response::status(fallback))
    }

    fn advance(&self, state: &mut EngineState) {
        state.step_index += 1;
        if state.step_index == state.steps.len() {
            info!(scenario = ?state.current, "Scenario finished");
            self.status.scenario_finished();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::CommunicationLog;
    use crate::scenario::Scenario;
    use crate::settings::MemorySettings;
    use crate::status::Status;
    use crate::store::MemoryScenarioStore;
    use hex_literal::hex;

    const SELECT_F001: [u8; 12] = hex!("00A4040007F0010203040506");

    struct Fixture {
        clock: VersionClock,
        store: Arc<MemoryScenarioStore>,
        log: Arc<CommunicationLog>,
        status: StatusTracker,
        engine: ScenarioEngine,
    }

    fn fixture() -> Fixture {
        let clock = VersionClock::new();
        let store = Arc::new(MemoryScenarioStore::new(clock.clone()));
        let log = Arc::new(CommunicationLog::new("unused"));
        let status = StatusTracker::new();
        let engine = ScenarioEngine::new(
            clock.clone(),
            store.clone(),
            Arc::new(MemorySettings::new(clock.clone())),
            log.clone(),
            status.clone(),
        );
        Fixture {
            clock,
            store,
            log,
            status,
            engine,
        }
    }

    fn bytes(response: Option<Response>) -> Option<Vec<u8>> {
        response.map(|r| r.as_bytes().to_vec())
    }

    #[test]
    fn test_single_select_consumed_until_restart() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("single", "", false)
                    .with_step(Step::select("a", "F0010203040506", true))
                    .with_step(Step::select("b", "F0010203040506", false)),
            )
            .unwrap();
        f.engine.set_current(Some("single")).unwrap();
        f.engine.set_running(true);

        assert_eq!(bytes(f.engine.process_command(&SELECT_F001)), Some(vec![0x90, 0x00]));
        // consumed by the single select
        assert_eq!(f.engine.process_command(&SELECT_F001), None);
        assert_eq!(f.engine.snapshot().step_index, 1);

        // restart resets the consumed set
        f.engine.set_running(false);
        f.engine.set_running(true);
        assert_eq!(bytes(f.engine.process_command(&SELECT_F001)), Some(vec![0x90, 0x00]));
    }

    #[test]
    fn test_select_step_only_advances_on_match() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("s", "", false)
                    .with_step(Step::select("sel", "f0010203040506", false))
                    .with_step(Step::exchange("read", "00B0000000", "CAFE9000", true)),
            )
            .unwrap();
        f.engine.set_current(Some("s")).unwrap();
        f.engine.set_running(true);

        assert_eq!(f.engine.process_command(&hex!("00B0000000")), None);
        assert_eq!(f.engine.process_command(&hex!("00A4040005A000000003")), None);
        assert_eq!(f.engine.snapshot().step_index, 0);

        assert!(f.engine.process_command(&SELECT_F001).is_some());
        assert!(f.engine.snapshot().is_selected);
        assert_eq!(
            bytes(f.engine.process_command(&hex!("00b0000000"))),
            Some(hex!("CAFE9000").to_vec())
        );
        assert_eq!(f.status.current(), Status::Finished);

        // past the end: selected fallback
        assert_eq!(bytes(f.engine.process_command(&hex!("00B0000000"))), Some(vec![0x90, 0x00]));
    }

    #[test]
    fn test_needs_selection_mismatch_stalls() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("s", "", false)
                    .with_step(Step::exchange("gpo", "80A8000000", "9000", true)),
            )
            .unwrap();
        f.engine.set_current(Some("s")).unwrap();
        f.engine.set_running(true);

        // nothing selected: unselected fallback, no advance
        assert_eq!(bytes(f.engine.process_command(&hex!("80A8000000"))), Some(vec![0x6A, 0x82]));
        assert_eq!(bytes(f.engine.process_command(&hex!("80A8000000"))), Some(vec![0x6A, 0x82]));
        assert_eq!(f.engine.snapshot().step_index, 0);
    }

    #[test]
    fn test_single_select_then_empty_select_exchange() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("example", "F0010203040506", true)
                    .with_step(Step::select("select", "F0010203040506", true))
                    .with_step(Step::exchange("empty select", "00A4040000", "9000", true)),
            )
            .unwrap();
        f.engine.set_current(Some("example")).unwrap();
        f.engine.set_running(true);

        let answers: Vec<_> = [&SELECT_F001[..], &SELECT_F001[..], &hex!("00A4040000")[..]]
            .into_iter()
            .map(|c| bytes(f.engine.process_command(c)))
            .collect();
        assert_eq!(answers, vec![Some(vec![0x90, 0x00]), None, Some(vec![0x90, 0x00])]);
        assert_eq!(f.status.current(), Status::Finished);
    }

    #[test]
    fn test_scenario_aid_adds_no_select() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("s", "F0010203040506", false)
                    .with_step(Step::exchange("first", "00B0000000", "0102", false)),
            )
            .unwrap();
        f.engine.set_current(Some("s")).unwrap();
        f.engine.set_running(true);
        assert_eq!(f.engine.snapshot().step_count, 1);

        assert_eq!(bytes(f.engine.process_command(&hex!("00B0000000"))), Some(hex!("0102").to_vec()));
        assert_eq!(f.engine.snapshot().step_index, 1);
    }

    #[test]
    fn test_silence_and_stopped_states_answer_nothing() {
        let f = fixture();
        f.store
            .upsert(Scenario::new("s", "", false).with_step(Step::exchange("x", "00", "9000", false)))
            .unwrap();
        f.engine.set_current(Some("s")).unwrap();
        assert_eq!(f.engine.process_command(&hex!("00")), None);

        f.engine.set_running(true);
        assert!(f.engine.set_silenced(true));
        assert!(!f.engine.set_silenced(true));
        assert_eq!(f.status.current(), Status::Silenced);
        assert_eq!(f.engine.process_command(&hex!("00")), None);

        assert!(!f.engine.toggle_silence());
        assert_eq!(bytes(f.engine.process_command(&hex!("00"))), Some(vec![0x90, 0x00]));

        let messages: Vec<_> = f.log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec![
            "STATE-SCEN: Scenario 's' started.",
            "STATE-SCEN: Scenario 's' silenced.",
            "STATE-SCEN: Scenario 's' unsilenced.",
        ]);
    }

    #[test]
    fn test_deactivation_clears_selection_only() {
        let f = fixture();
        f.store
            .upsert(
                Scenario::new("s", "F0010203040506", false)
                    .with_step(Step::select("sel", "F0010203040506", false))
                    .with_step(Step::exchange("x", "00B0000000", "9000", true)),
            )
            .unwrap();
        f.engine.set_current(Some("s")).unwrap();
        f.engine.set_running(true);
        f.engine.process_command(&SELECT_F001);
        let version = f.clock.current();

        f.engine.on_deactivated();
        let snapshot = f.engine.snapshot();
        assert!(!snapshot.is_selected);
        assert_eq!(snapshot.step_index, 1);
        assert_eq!(f.clock.current(), version);
    }

    #[test]
    fn test_unknown_scenario_leaves_state() {
        let f = fixture();
        f.store.upsert(Scenario::new("s", "", false)).unwrap();
        f.engine.set_current(Some("s")).unwrap();
        let version = f.clock.current();

        assert!(matches!(
            f.engine.set_current(Some("missing")),
            Err(Error::UnknownScenario(_))
        ));
        assert_eq!(f.engine.snapshot().current.as_deref(), Some("s"));
        assert_eq!(f.clock.current(), version);

        assert!(f.engine.unload_if_current("s"));
        assert_eq!(f.engine.snapshot().current, None);
        assert_eq!(f.status.current(), Status::Idle);
    }

    #[test]
    fn test_sequences_are_deterministic() {
        let commands: [&[u8]; 4] = [
            &SELECT_F001,
            &hex!("00B0000000"),
            &hex!("00B2010C00"),
            &hex!("00B2010C00"),
        ];
        let run = || {
            let f = fixture();
            f.store
                .upsert(
                    Scenario::new("s", "F0010203040506", false)
                        .with_step(Step::select("sel", "F0010203040506", false))
                        .with_step(Step::exchange("a", "00B0000000", "0102", true))
                        .with_step(Step::exchange("b", "00B2010C00", "6A83", true)),
                )
                .unwrap();
            f.engine.set_current(Some("s")).unwrap();
            f.engine.set_running(true);
            commands
                .iter()
                .map(|c| bytes(f.engine.process_command(c)))
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(first[3], Some(vec![0x90, 0x00]));
    }
}
