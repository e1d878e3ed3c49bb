//! Scenario storage

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::clock::VersionClock;
use crate::error::Result;
use crate::scenario::Scenario;

/// Named scenarios available to the engine
pub trait ScenarioStore: Send + Sync + std::fmt::Debug {
    /// Fetch a scenario by name
    fn load(&self, name: &str) -> Option<Scenario>;

    /// Validate and insert a scenario, replacing any with the same name
    fn upsert(&self, scenario: Scenario) -> Result<()>;

    /// Remove a scenario. Returns `false` when it did not exist.
    fn remove(&self, name: &str) -> bool;

    /// Remove every scenario
    fn clear(&self);

    /// Stored names, sorted
    fn names(&self) -> Vec<String>;
}

/// In-memory scenario store
#[derive(Debug)]
pub struct MemoryScenarioStore {
    clock: VersionClock,
    scenarios: RwLock<BTreeMap<String, Scenario>>,
}

impl MemoryScenarioStore {
    /// Create an empty store
    pub fn new(clock: VersionClock) -> Self {
        Self {
            clock,
            scenarios: RwLock::new(BTreeMap::new()),
        }
    }
}

impl ScenarioStore for MemoryScenarioStore {
    fn load(&self, name: &str) -> Option<Scenario> {
        self.scenarios.read().get(name.trim()).cloned()
    }

    fn upsert(&self, scenario: Scenario) -> Result<()> {
        let scenario = scenario.validated()?;
        debug!(name = %scenario.name, steps = scenario.steps.len(), "Storing scenario");
        self.scenarios.write().insert(scenario.name.clone(), scenario);
        self.clock.bump();
        Ok(())
    }

    fn remove(&self, name: &str) -> bool {
        let removed = self.scenarios.write().remove(name.trim()).is_some();
        self.clock.bump();
        removed
    }

    fn clear(&self) {
        self.scenarios.write().clear();
        self.clock.bump();
    }

    fn names(&self) -> Vec<String> {
        self.scenarios.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Step;

    #[test]
    fn test_upsert_replaces_by_name() {
        let store = MemoryScenarioStore::new(VersionClock::new());
        store
            .upsert(Scenario::new("a", "", false).with_step(Step::exchange("x", "00", "9000", false)))
            .unwrap();
        store.upsert(Scenario::new(" a ", "", false)).unwrap();
        assert_eq!(store.names(), vec!["a"]);
        assert!(store.load("a").unwrap().steps.is_empty());
    }

    #[test]
    fn test_invalid_scenarios_are_not_stored() {
        let clock = VersionClock::new();
        let store = MemoryScenarioStore::new(clock.clone());
        assert!(store.upsert(Scenario::new("", "", false)).is_err());
        assert!(store.names().is_empty());
        assert_eq!(clock.current(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = MemoryScenarioStore::new(VersionClock::new());
        store.upsert(Scenario::new("a", "", false)).unwrap();
        store.upsert(Scenario::new("b", "", false)).unwrap();
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        store.clear();
        assert!(store.load("b").is_none());
    }
}
