//! Command payload routing
//!
//! Controllers send JSON objects either tagged with a `Type` naming one
//! section, or carrying several section objects side by side:
//!
//! ```json
//! {"Type": "Aid", "Add": ["A000000003", "A000000004"]}
//! {"Aid": {"Clear": true}, "Comm": {"CurrentScenario": "Start"}}
//! ```
//!
//! Payloads are applied in place. Anything malformed is logged and reported
//! through [`ApplyOutcome`], never propagated to the caller.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::emulator::Emulator;
use crate::error::{Error, Result};
use crate::log::{Origin, Outcome};
use crate::scenario::Scenario;

type Object = Map<String, Value>;

/// Result of applying one payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The payload parsed and was dispatched
    pub applied: bool,
    /// The payload cleared the communication log
    pub log_cleared: bool,
}

/// Applies command payloads to an [`Emulator`]
#[derive(Debug, Clone)]
pub struct CommandRouter {
    emulator: Emulator,
}

impl CommandRouter {
    /// Create a router for `emulator`
    pub const fn new(emulator: Emulator) -> Self {
        Self { emulator }
    }

    /// Apply a payload
    pub fn apply(&self, payload: &str) -> ApplyOutcome {
        debug!(payload, "Applying command");
        match self.dispatch(payload) {
            Ok(log_cleared) => ApplyOutcome {
                applied: true,
                log_cleared,
            },
            Err(e) => {
                warn!(%e, "Rejected command payload");
                self.note(format!("JSON ERR: {e}"), Outcome::Failure);
                ApplyOutcome::default()
            }
        }
    }

    fn dispatch(&self, payload: &str) -> Result<bool> {
        let Value::Object(obj) = serde_json::from_str::<Value>(payload)? else {
            return Err(Error::InvalidPayload("expected a JSON object"));
        };

        if let Some(kind) = obj.get("Type").and_then(Value::as_str).map(str::trim)
            && !kind.is_empty()
        {
            match kind {
                "Aid" => self.aid(&obj),
                "Comm" => return Ok(self.comm(&obj)),
                "Scenarios" => self.scenarios(&obj),
                "Filters" => self.filters(&obj),
                "Reset" => self.reset(),
                other => return Err(Error::UnknownCommandType(other.to_string())),
            }
            return Ok(false);
        }

        let sections = ["Aid", "Comm", "Scenarios", "Filters", "Reset"];
        if !sections.iter().any(|key| obj.contains_key(*key)) {
            return Err(Error::InvalidPayload("no command section"));
        }

        let mut cleared = false;
        if let Some(section) = obj.get("Aid").and_then(Value::as_object) {
            self.aid(section);
        }
        if let Some(section) = obj.get("Comm").and_then(Value::as_object) {
            cleared |= self.comm(section);
        }
        if let Some(section) = obj.get("Scenarios").and_then(Value::as_object) {
            self.scenarios(section);
        }
        if let Some(section) = obj.get("Filters").and_then(Value::as_object) {
            self.filters(section);
        }
        if obj.contains_key("Reset") {
            self.reset();
        }
        Ok(cleared)
    }

    fn aid(&self, obj: &Object) {
        let aids = self.emulator.aids();
        if let Some(enabled) = flexible_bool(obj.get("Enabled")) {
            aids.set_enabled(enabled);
        }
        if flag(obj, "Clear") {
            aids.clear();
        }
        for aid in strings(obj.get("Add")) {
            if let Err(e) = aids.add(&aid) {
                warn!(%aid, %e, "Rejected AID");
                self.note(format!("STATE-AID: Invalid AID ({aid})."), Outcome::Failure);
            }
        }
        for aid in strings(obj.get("Remove")) {
            aids.remove(&aid);
        }
    }

    fn comm(&self, obj: &Object) -> bool {
        let mut cleared = false;
        if flag(obj, "Clear") {
            debug!("Clearing communication log");
            self.emulator.log().clear();
            cleared = true;
        }

        if let Some(logs) = obj.get("Logs").and_then(Value::as_object) {
            self.log_settings(logs);
        }
        if let Some(save) = obj.get("Save") {
            self.save_request(save);
        }
        if let Some(mute) = flexible_bool(obj.get("Mute")) {
            self.emulator.engine().set_silenced(mute);
        }
        if let Some(enabled) =
            flexible_bool(obj.get("NfcEnabled")).or_else(|| flexible_bool(obj.get("EnableNfc")))
        {
            self.emulator.aids().set_enabled(enabled);
        }

        let engine = self.emulator.engine();
        match obj.get("CurrentScenario").and_then(Value::as_str) {
            Some("Start") => engine.set_running(true),
            Some("Stop") => engine.set_running(false),
            Some("Clear") => {
                if engine.snapshot().running {
                    engine.set_running(false);
                }
                // unloading cannot fail
                let _ = engine.set_current(None);
            }
            Some(other) => warn!(action = other, "Unknown scenario action"),
            None => {}
        }
        cleared
    }

    fn log_settings(&self, obj: &Object) {
        if let Some(path) = lookup(obj, "Path").and_then(Value::as_str)
            && !path.trim().is_empty()
        {
            self.set_log_path(path);
        }
        if let Some(megabytes) = max_storage_mb(obj) {
            self.set_max_storage(megabytes);
        }
        if let Some(save) = lookup(obj, "Save") {
            self.save_request(save);
        }
    }

    fn save_request(&self, request: &Value) {
        match request {
            Value::Bool(true) => self.save_log(),
            Value::String(path) => {
                self.set_log_path(path);
                self.save_log();
            }
            Value::Object(obj) => {
                let path = lookup(obj, "Path")
                    .and_then(Value::as_str)
                    .filter(|p| !p.trim().is_empty());
                if let Some(path) = path {
                    self.set_log_path(path);
                }
                if let Some(megabytes) = max_storage_mb(obj) {
                    self.set_max_storage(megabytes);
                }
                let should_save = match (obj.get("Enabled"), lookup(obj, "Save")) {
                    (Some(enabled), _) => flexible_bool(Some(enabled)).unwrap_or(false),
                    (None, Some(Value::Bool(save))) => *save,
                    _ => path.is_some(),
                };
                if should_save {
                    self.save_log();
                }
            }
            _ => {}
        }
    }

    fn set_log_path(&self, raw: &str) {
        let log = self.emulator.log();
        let previous = log.directory();
        match log.set_directory(raw) {
            Ok(_) => {
                let directory = log.directory();
                if directory != previous {
                    info!(directory = %directory.display(), "Log directory changed");
                    self.note(
                        format!("STATE-COMM: Log directory {}", directory.display()),
                        Outcome::Success,
                    );
                }
            }
            Err(e) => {
                warn!(path = raw, %e, "Rejected log path");
                self.note(format!("STATE-COMM: Invalid log path ({raw}): {e}"), Outcome::Failure);
            }
        }
    }

    fn set_max_storage(&self, megabytes: i64) {
        let log = self.emulator.log();
        let previous = log.max_storage_mb();
        let applied = log.set_max_storage_mb(megabytes);
        if applied != previous {
            self.note(format!("STATE-COMM: Log storage limit {applied}MB"), Outcome::Success);
        }
    }

    fn save_log(&self) {
        let scenario = self.emulator.engine().snapshot().current;
        match self.emulator.log().save(scenario.as_deref()) {
            Ok(path) => self.note(format!("STATE-COMM: Log saved {}", path.display()), Outcome::Success),
            Err(e) => {
                warn!(%e, "Saving the log failed");
                self.note(format!("STATE-COMM: Save error ({e})"), Outcome::Failure);
            }
        }
    }

    fn scenarios(&self, obj: &Object) {
        let store = self.emulator.store();
        let engine = self.emulator.engine();
        if flag(obj, "Clear") {
            debug!("Clearing scenarios");
            store.clear();
            // unloading cannot fail
            let _ = engine.set_current(None);
        }

        let added: Vec<&Value> = match obj.get("Add") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        };
        for item in added {
            let result = serde_json::from_value::<Scenario>(item.clone())
                .map_err(Error::from)
                .and_then(|scenario| store.upsert(scenario));
            if let Err(e) = result {
                warn!(%e, "Rejected scenario");
                self.note(format!("STATE-SCEN: Invalid scenario ({e})."), Outcome::Failure);
            }
        }

        for name in strings(obj.get("Remove")) {
            store.remove(&name);
            engine.unload_if_current(&name);
        }

        if let Some(name) = obj.get("Current").and_then(Value::as_str)
            && !name.trim().is_empty()
            && let Err(e) = engine.set_current(Some(name.trim()))
        {
            warn!(%e, "Cannot activate scenario");
            self.note(format!("STATE-SCEN: Scenario '{name}' not found."), Outcome::Failure);
        }
    }

    fn filters(&self, obj: &Object) {
        let filter = self.emulator.filter();
        if flag(obj, "Clear") {
            filter.clear();
        }
        for pattern in strings(obj.get("Add")) {
            if let Err(e) = filter.add(&pattern) {
                warn!(%e, "Rejected filter");
                self.note(format!("STATE-FILTER: Invalid filter ({pattern})."), Outcome::Failure);
            }
        }
        for pattern in strings(obj.get("Remove")) {
            filter.remove(&pattern);
        }
    }

    fn reset(&self) {
        info!("Resetting emulator");
        let engine = self.emulator.engine();
        engine.set_running(false);
        self.emulator.store().clear();
        // unloading cannot fail
        let _ = engine.set_current(None);
        self.emulator.aids().clear();
        self.emulator.filter().clear();
        self.emulator.log().clear();
        self.note("STATE-APP: Reset executed.".to_string(), Outcome::Success);
    }

    fn note(&self, message: String, outcome: Outcome) {
        self.emulator.log().append(&message, Origin::Server, outcome);
    }
}

/// `true`, `1`, `"true"` and `"1"` are true; other present values are false
fn flexible_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(s) => Some(s.eq_ignore_ascii_case("true") || s == "1"),
        _ => None,
    }
}

fn flag(obj: &Object, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// A string or an array of strings, blanks dropped
fn strings(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `Key` or its lower camel case spelling
fn lookup<'a>(obj: &'a Object, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        let mut chars = key.chars();
        let lower = chars
            .next()
            .map(|first| first.to_ascii_lowercase().to_string() + chars.as_str())?;
        obj.get(&lower)
    })
}

fn max_storage_mb(obj: &Object) -> Option<i64> {
    match lookup(obj, "MaxStorageMb")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
