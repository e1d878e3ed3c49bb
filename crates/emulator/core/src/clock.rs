//! Version clock shared by every store that affects command processing

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter bumped on every state change that could alter how a
/// future command is processed.
///
/// Clones share the same counter. The remote sync client compares snapshots
/// of it to decide whether the last synchronised command must be re-applied.
#[derive(Debug, Clone, Default)]
pub struct VersionClock {
    version: Arc<AtomicU64>,
}

impl VersionClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a state change, returning the new version
    pub fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current version
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_is_shared_between_clones() {
        let clock = VersionClock::new();
        let other = clock.clone();
        assert_eq!(clock.current(), 0);
        assert_eq!(other.bump(), 1);
        assert_eq!(clock.bump(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn test_concurrent_bumps_are_not_lost() {
        let clock = VersionClock::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        clock.bump();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(clock.current(), 8000);
    }
}
