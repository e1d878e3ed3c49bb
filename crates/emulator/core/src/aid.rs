//! Registry of the AIDs the emulated card answers for

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use nfcemu_apdu::hex::normalize_aid;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::clock::VersionClock;
use crate::error::Result;

/// Set of AIDs routed to the emulator, plus the global enable switch
pub trait AidRegistry: Send + Sync + std::fmt::Debug {
    /// Register an AID. Returns `false` when it was already present.
    fn add(&self, aid: &str) -> Result<bool>;

    /// Unregister an AID. Returns `false` when it was not present.
    fn remove(&self, aid: &str) -> bool;

    /// Unregister every AID
    fn clear(&self);

    /// Replace the whole set; invalid entries are skipped
    fn replace_all(&self, aids: &[String]);

    /// Registered AIDs, uppercase and sorted
    fn list(&self) -> Vec<String>;

    /// Whether the AID is registered
    fn contains(&self, aid: &str) -> bool;

    /// Turn card emulation on or off
    fn set_enabled(&self, enabled: bool);

    /// Whether card emulation is on
    fn is_enabled(&self) -> bool;
}

/// In-memory AID registry
#[derive(Debug)]
pub struct MemoryAidRegistry {
    clock: VersionClock,
    aids: RwLock<BTreeSet<String>>,
    enabled: AtomicBool,
}

impl MemoryAidRegistry {
    /// Create an empty, enabled registry
    pub fn new(clock: VersionClock) -> Self {
        Self {
            clock,
            aids: RwLock::new(BTreeSet::new()),
            enabled: AtomicBool::new(true),
        }
    }

    fn registered(&self, aids: &BTreeSet<String>) {
        // The device-level registration is an external concern; record what it would receive.
        debug!(count = aids.len(), aids = ?aids, "Registering AIDs");
        self.clock.bump();
    }
}

impl AidRegistry for MemoryAidRegistry {
    fn add(&self, aid: &str) -> Result<bool> {
        let aid = normalize_aid(aid)?;
        let mut aids = self.aids.write();
        let inserted = aids.insert(aid);
        self.registered(&aids);
        Ok(inserted)
    }

    fn remove(&self, aid: &str) -> bool {
        let mut aids = self.aids.write();
        let removed = aids.remove(&aid.trim().to_ascii_uppercase());
        self.registered(&aids);
        removed
    }

    fn clear(&self) {
        let mut aids = self.aids.write();
        aids.clear();
        self.registered(&aids);
    }

    fn replace_all(&self, list: &[String]) {
        let mut aids = self.aids.write();
        *aids = list.iter().filter_map(|aid| normalize_aid(aid).ok()).collect();
        self.registered(&aids);
    }

    fn list(&self) -> Vec<String> {
        self.aids.read().iter().cloned().collect()
    }

    fn contains(&self, aid: &str) -> bool {
        self.aids.read().contains(&aid.trim().to_ascii_uppercase())
    }

    fn set_enabled(&self, enabled: bool) {
        info!(enabled, "Card emulation toggled");
        self.enabled.store(enabled, Ordering::Release);
        self.clock.bump();
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_clear() {
        let clock = VersionClock::new();
        let registry = MemoryAidRegistry::new(clock.clone());

        assert!(registry.add("a000000003").unwrap());
        assert!(!registry.add("A000000003").unwrap());
        assert!(registry.contains("A000000003"));
        assert!(registry.add("A0").is_err());

        assert!(registry.remove("a000000003"));
        assert!(!registry.remove("A000000003"));

        registry.add("F0010203040506").unwrap();
        registry.clear();
        assert!(registry.list().is_empty());
        // one bump per mutating call that succeeded
        assert_eq!(clock.current(), 6);
    }

    #[test]
    fn test_replace_all_skips_invalid() {
        let registry = MemoryAidRegistry::new(VersionClock::new());
        registry.add("A000000003").unwrap();
        registry.replace_all(&["f0010203040506".into(), "zz".into(), "A000000004".into()]);
        assert_eq!(registry.list(), vec!["A000000004", "F0010203040506"]);
    }

    #[test]
    fn test_enable_flag() {
        let registry = MemoryAidRegistry::new(VersionClock::new());
        assert!(registry.is_enabled());
        registry.set_enabled(false);
        assert!(!registry.is_enabled());
    }
}
