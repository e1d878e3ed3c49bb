//! Communication filters
//!
//! Filters are uppercase hex patterns where `*` stands for any run of hex
//! digits. A log line whose payload matches one of them is hidden.

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::clock::VersionClock;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Pattern {
    text: String,
    matcher: Regex,
}

impl Pattern {
    fn compile(raw: &str) -> Result<Self> {
        let text = raw.trim().to_ascii_uppercase();
        if text.is_empty() || !text.chars().all(|c| c.is_ascii_hexdigit() || c == '*') {
            return Err(Error::InvalidFilter(raw.to_string()));
        }
        let matcher = Regex::new(&format!("^{}$", text.replace('*', "[0-9A-F]*")))
            .map_err(|_| Error::InvalidFilter(raw.to_string()))?;
        Ok(Self { text, matcher })
    }
}

/// Set of filter patterns
#[derive(Debug)]
pub struct CommunicationFilter {
    clock: VersionClock,
    patterns: RwLock<Vec<Pattern>>,
}

impl CommunicationFilter {
    /// Create an empty filter set
    pub fn new(clock: VersionClock) -> Self {
        Self {
            clock,
            patterns: RwLock::new(Vec::new()),
        }
    }

    /// Add a pattern; adding an existing pattern is a no-op apart from the bump
    pub fn add(&self, pattern: &str) -> Result<()> {
        let pattern = Pattern::compile(pattern)?;
        debug!(pattern = %pattern.text, "Adding filter");
        let mut patterns = self.patterns.write();
        if !patterns.iter().any(|p| p.text == pattern.text) {
            patterns.push(pattern);
        }
        self.clock.bump();
        Ok(())
    }

    /// Remove a pattern by its text
    pub fn remove(&self, pattern: &str) -> bool {
        let text = pattern.trim().to_ascii_uppercase();
        let mut patterns = self.patterns.write();
        let before = patterns.len();
        patterns.retain(|p| p.text != text);
        self.clock.bump();
        patterns.len() != before
    }

    /// Replace all patterns, skipping invalid ones
    pub fn replace_all(&self, list: &[String]) {
        let mut compiled: Vec<Pattern> = Vec::with_capacity(list.len());
        for raw in list {
            match Pattern::compile(raw) {
                Ok(p) if !compiled.iter().any(|c| c.text == p.text) => compiled.push(p),
                Ok(_) => {}
                Err(e) => warn!(%e, "Skipping filter"),
            }
        }
        *self.patterns.write() = compiled;
        self.clock.bump();
    }

    /// Remove every pattern
    pub fn clear(&self) {
        self.patterns.write().clear();
        self.clock.bump();
    }

    /// Current patterns
    pub fn patterns(&self) -> Vec<String> {
        self.patterns.read().iter().map(|p| p.text.clone()).collect()
    }

    /// Whether `message` should be hidden
    ///
    /// Only the part after the first `:` is matched, with spaces removed, so
    /// `"REQ: 00 A4 04 00"` is matched as `00A40400`.
    pub fn should_hide(&self, message: &str) -> bool {
        let payload = message.split_once(':').map_or(message, |(_, rest)| rest);
        let hex: String = payload
            .chars()
            .filter(|c| *c != ' ')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        self.patterns.read().iter().any(|p| p.matcher.is_match(&hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        let filter = CommunicationFilter::new(VersionClock::new());
        filter.add("00a4*").unwrap();
        assert!(filter.should_hide("REQ: 00A4040007F0010203040506"));
        assert!(filter.should_hide("REQ:00 a4 04 00"));
        assert!(!filter.should_hide("REQ: 00B0000000"));
        assert!(!filter.should_hide("RESP: 9000"));

        filter.add("9000").unwrap();
        assert!(filter.should_hide("RESP: 9000"));
        assert!(!filter.should_hide("RESP: 019000"));
    }

    #[test]
    fn test_invalid_patterns() {
        let filter = CommunicationFilter::new(VersionClock::new());
        assert!(filter.add("GG").is_err());
        assert!(filter.add("").is_err());
        assert!(filter.add("00.*").is_err());
        assert!(filter.patterns().is_empty());
    }

    #[test]
    fn test_mutations_bump_clock() {
        let clock = VersionClock::new();
        let filter = CommunicationFilter::new(clock.clone());
        filter.add("00A4*").unwrap();
        filter.add("00a4*").unwrap();
        assert_eq!(filter.patterns(), vec!["00A4*"]);
        assert!(filter.remove("00a4*"));
        filter.replace_all(&["90*".into(), "xx".into()]);
        assert_eq!(filter.patterns(), vec!["90*"]);
        filter.clear();
        assert_eq!(clock.current(), 5);
    }
}
