//! Network services for nfcemu
//!
//! Controllers reach the emulator two ways, both feeding the same
//! [`CommandRouter`](nfcemu_core::CommandRouter):
//!
//! - [`LocalCommandServer`] accepts payloads posted by controllers on the
//!   local network
//! - [`RemoteSyncClient`] polls a remote controller for queued payloads and
//!   reports status changes back to it
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod error;
pub mod http;
pub mod server;

pub use client::{ConnectionState, CycleOutcome, Poller, Reachability, RemoteSyncClient, RouteReachability};
pub use error::{Error, Result, ResultExt};
pub use server::{LocalCommandServer, ServerState};
