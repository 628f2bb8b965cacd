//! WiiM Core - playback orchestration and recovery for WiiM players.
//!
//! This crate keeps a fleet of WiiM/LinkPlay network players looping the
//! media each one has been assigned, and puts them back into that state
//! after device hiccups or a server restart. It is used by the headless
//! server in `apps/server`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`device`]: WiiM HTTP command client, status normalization and subnet scan
//! - [`services`]: Registry, desired state, monitors, groups and repair loops
//! - [`api`]: HTTP control surface (Axum)
//! - [`context`]: Network configuration and media URL building
//! - [`state`]: Configuration and timing tables
//! - [`persistence`]: Atomic JSON documents backing the stores
//! - [`runtime`]: Task spawning abstraction
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`WiimDevice`](device::WiimDevice): the device command seam, mocked in tests
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`IpDetector`](context::IpDetector): local IP detection

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod device;
pub mod error;
pub mod persistence;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{ErrorCode, WiimError, WiimResult};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, MonitorTimings, ReconcilerTimings, RecoveryTimings};
pub use utils::now_millis;

// Re-export device types
pub use device::{
    DeviceEndpoint, DeviceError, LoopMode, PlaybackState, PlayerStatus, TransportAction,
    WiimClientImpl, WiimDevice,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
