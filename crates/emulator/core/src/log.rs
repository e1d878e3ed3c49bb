//! User-visible communication log
//!
//! This is the operator-facing record of APDU traffic and state changes, kept
//! apart from `tracing` diagnostics. It holds the most recent entries in
//! memory and can be written to `.log` files under a bounded directory.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Maximum number of entries kept in memory
pub const MAX_ENTRIES: usize = 1000;

/// Default size cap for saved logs, in megabytes
pub const DEFAULT_MAX_STORAGE_MB: u32 = 10;

/// Upper bound for the size cap, in megabytes
pub const MAX_STORAGE_LIMIT_MB: u32 = 100;

/// Where a log line comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Traffic with the reader
    Card,
    /// Emulator state, local server or remote controller
    Server,
}

/// How a log line should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Plain information
    Neutral,
    /// Something succeeded or was switched on
    Success,
    /// Something failed or was switched off
    Failure,
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }
}

/// One log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Text of the line
    pub message: String,
    /// Source of the line
    pub origin: Origin,
    /// Rendering hint
    pub outcome: Outcome,
    /// When the line was appended
    pub timestamp: DateTime<Local>,
}

/// Sink for user-visible log lines
pub trait ActiveLog: Send + Sync + std::fmt::Debug {
    /// Append a line
    fn append(&self, message: &str, origin: Origin, outcome: Outcome);

    /// Drop every line
    fn clear(&self);

    /// Snapshot of the current lines, oldest first
    fn entries(&self) -> Vec<LogEntry>;

    /// Write the current lines to a new file named after `scenario`
    fn save(&self, scenario: Option<&str>) -> Result<PathBuf>;

    /// Set the sub-directory logs are saved to, returning the sanitized form
    fn set_directory(&self, raw: &str) -> Result<String>;

    /// Set the size cap in megabytes (clamped to 0..=100, 0 disables the cap)
    fn set_max_storage_mb(&self, megabytes: i64) -> u32;

    /// Current size cap in megabytes
    fn max_storage_mb(&self) -> u32;

    /// Directory the next [`ActiveLog::save`] writes to
    fn directory(&self) -> PathBuf;
}

#[derive(Debug)]
struct LogState {
    entries: VecDeque<LogEntry>,
    sub_path: String,
    max_storage_mb: u32,
}

/// In-memory log with file export
#[derive(Debug)]
pub struct CommunicationLog {
    root: PathBuf,
    state: Mutex<LogState>,
}

impl CommunicationLog {
    /// Create a log saving under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(LogState {
                entries: VecDeque::new(),
                sub_path: String::new(),
                max_storage_mb: DEFAULT_MAX_STORAGE_MB,
            }),
        }
    }

    /// Root directory for saved logs
    pub fn root(&self) -> &Path {
        &self.root
    }

}

impl ActiveLog for CommunicationLog {
    fn append(&self, message: &str, origin: Origin, outcome: Outcome) {
        debug!(message, ?origin, ?outcome, "log");
        let mut state = self.state.lock();
        state.entries.push_back(LogEntry {
            message: message.to_string(),
            origin,
            outcome,
            timestamp: Local::now(),
        });
        if state.entries.len() > MAX_ENTRIES {
            state.entries.pop_front();
        }
    }

    fn clear(&self) {
        debug!("Clearing communication log");
        self.state.lock().entries.clear();
    }

    fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    fn save(&self, scenario: Option<&str>) -> Result<PathBuf> {
        let (entries, directory, max_storage_mb) = {
            let state = self.state.lock();
            let text: Vec<String> = state.entries.iter().map(|e| e.message.clone()).collect();
            (text, self.root.join(&state.sub_path), state.max_storage_mb)
        };

        enforce_storage_limit(&self.root, max_storage_mb);
        fs::create_dir_all(&directory).map_err(|e| Error::log_io(&directory, e))?;

        let target = directory.join(file_name(scenario));
        fs::write(&target, entries.join("\n")).map_err(|e| Error::log_io(&target, e))?;
        enforce_storage_limit(&self.root, max_storage_mb);

        info!(path = %target.display(), "Saved communication log");
        Ok(target)
    }

    fn set_directory(&self, raw: &str) -> Result<String> {
        let sanitized = sanitize_path(raw);
        if sanitized.is_empty() && !raw.trim().is_empty() {
            return Err(Error::InvalidLogPath {
                path: raw.to_string(),
                reason: "no usable path segments",
            });
        }
        self.state.lock().sub_path.clone_from(&sanitized);
        Ok(sanitized)
    }

    fn set_max_storage_mb(&self, megabytes: i64) -> u32 {
        let clamped = megabytes.clamp(0, i64::from(MAX_STORAGE_LIMIT_MB)) as u32;
        self.state.lock().max_storage_mb = clamped;
        clamped
    }

    fn max_storage_mb(&self) -> u32 {
        self.state.lock().max_storage_mb
    }

    fn directory(&self) -> PathBuf {
        self.root.join(&self.state.lock().sub_path)
    }
}

/// Keep only safe relative segments made of `[A-Za-z0-9._-]`
fn sanitize_path(raw: &str) -> String {
    raw.split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(|segment| {
            segment
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                .collect::<String>()
        })
        .filter(|segment| !segment.is_empty() && segment != "." && segment != "..")
        .collect::<Vec<_>>()
        .join(std::path::MAIN_SEPARATOR_STR)
}

fn file_name(scenario: Option<&str>) -> String {
    let name: String = scenario
        .unwrap_or("log")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
        .collect();
    format!("{name}_{}.log", Local::now().format("%Y%m%d_%H%M%S_%3f"))
}

fn collect_logs(dir: &Path, found: &mut Vec<(PathBuf, SystemTime, u64)>) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            collect_logs(&path, found);
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("log"))
        {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((path, modified, meta.len()));
        }
    }
}

/// Delete the oldest `.log` files until the total fits, never the newest one
fn enforce_storage_limit(root: &Path, max_storage_mb: u32) {
    if max_storage_mb == 0 {
        return;
    }
    let max_bytes = u64::from(max_storage_mb) * 1024 * 1024;
    let mut files = Vec::new();
    collect_logs(root, &mut files);
    files.sort_by_key(|(_, modified, _)| *modified);

    let mut total: u64 = files.iter().map(|(_, _, len)| len).sum();
    let keep_newest = files.len().saturating_sub(1);
    for (path, _, len) in files.into_iter().take(keep_newest) {
        if total <= max_bytes {
            break;
        }
        match fs::remove_file(&path) {
            Ok(()) => total -= len,
            Err(e) => warn!(path = %path.display(), %e, "Failed to prune log"),
        }
    }
}
