//! High-level emulator status
//!
//! The status is served by the local server's `/STATUS` endpoint and pushed
//! to the remote controller whenever it changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Status vocabulary shared with controllers
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// No scenario loaded
    #[default]
    #[display("IDLE")]
    Idle,
    /// Scenario loaded, not running
    #[display("READY")]
    Ready,
    /// Scenario running
    #[display("RUNNING")]
    Running,
    /// Running scenario reached its last step
    #[display("FINISHED")]
    Finished,
    /// Running scenario stopped
    #[display("STOPPED")]
    Stopped,
    /// Emulator silenced
    #[display("SILENCED")]
    Silenced,
    /// Unrecoverable error
    #[display("ERROR")]
    Error,
}

/// Holder of the current [`Status`]; clones share it
#[derive(Debug, Clone)]
pub struct StatusTracker {
    tx: Arc<watch::Sender<Status>>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    /// Create a tracker reporting [`Status::Idle`]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Current status
    pub fn current(&self) -> Status {
        *self.tx.borrow()
    }

    /// Receive every change from now on
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Set the status, notifying subscribers only when it changed
    pub fn set(&self, status: Status) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(%status, "Status changed");
        }
        changed
    }

    /// A scenario was loaded
    pub fn scenario_loaded(&self) {
        self.set(Status::Ready);
    }

    /// The scenario was unloaded
    pub fn scenario_unloaded(&self) {
        self.set(Status::Idle);
    }

    /// The scenario started running
    pub fn scenario_running(&self) {
        self.set(Status::Running);
    }

    /// The running scenario completed its last step
    pub fn scenario_finished(&self) {
        self.set(Status::Finished);
    }

    /// The running scenario was stopped
    pub fn scenario_stopped(&self) {
        self.set(Status::Stopped);
    }

    /// Silence toggled; unsilencing reports READY or IDLE depending on whether
    /// a scenario is loaded
    pub fn silenced(&self, on: bool, scenario_loaded: bool) {
        let status = match (on, scenario_loaded) {
            (true, _) => Status::Silenced,
            (false, true) => Status::Ready,
            (false, false) => Status::Idle,
        };
        self.set(status);
    }

    /// Something failed beyond recovery, such as the local server failing to bind
    pub fn set_error(&self) {
        self.set(Status::Error);
    }
}
