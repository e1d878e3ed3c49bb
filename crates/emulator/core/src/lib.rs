//! Emulator core for nfcemu
//!
//! This crate decides what an emulated contactless card answers and applies
//! the command payloads controllers use to script it.
//!
//! ## Overview
//!
//! - [`ScenarioEngine`] runs the active [`Scenario`] against reader commands
//! - [`CommandRouter`] applies JSON command payloads
//! - [`VersionClock`] counts every state change that could alter a future answer
//! - [`Emulator`] owns the engine and its collaborators
//!
//! Collaborators sit behind traits ([`AidRegistry`], [`ActiveLog`],
//! [`SettingsStore`], [`ScenarioStore`]) with in-memory implementations.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod aid;
pub mod clock;
pub mod emulator;
pub mod engine;
pub mod error;
pub mod filter;
pub mod log;
pub mod router;
pub mod scenario;
pub mod settings;
pub mod status;
pub mod store;

pub use aid::{AidRegistry, MemoryAidRegistry};
pub use clock::VersionClock;
pub use emulator::Emulator;
pub use engine::{EngineSnapshot, ScenarioEngine};
pub use error::{Error, Result};
pub use filter::CommunicationFilter;
pub use log::{ActiveLog, CommunicationLog, LogEntry, Origin, Outcome};
pub use router::{ApplyOutcome, CommandRouter};
pub use scenario::{Scenario, Step, StepKind};
pub use settings::{DefaultResponse, MemorySettings, SettingsStore};
pub use status::{Status, StatusTracker};
pub use store::{MemoryScenarioStore, ScenarioStore};
