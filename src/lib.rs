//! # airptp
//!
//! Core of a PTP (IEEE 1588) clock-sync daemon for `AirPlay` 2 senders.
//!
//! ## Features
//!
//! - Dual-stack binding of the PTP event (319) and general (320) ports
//! - A worker thread that serves Announce, Sync and Signaling to unicast
//!   slaves, pausing its timers while nobody listens
//! - A shared-memory presence beacon so unprivileged processes on the same
//!   host can discover the running daemon's clock identity
//!
//! ## Example
//!
//! ```rust,no_run
//! use airptp::PtpHandle;
//!
//! # fn example() -> Result<(), airptp::AirPtpError> {
//! let mut handle = PtpHandle::bind()?;
//! handle.start(0x0012_3456_789A, true, None)?;
//! println!("serving clock {:016X}", handle.clock_identity()?);
//!
//! // ...
//!
//! handle.release();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Handle**: [`PtpHandle`], the only type most callers need
//! - **Daemon**: worker thread lifecycle and event loop
//! - **Gateway**: the PTP conversation, pluggable through [`MessageGateway`]
//! - **Low-level**: port binding, beacon and wire format modules

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod beacon;
pub mod callbacks;
pub mod daemon;
pub mod gateway;
mod handle;
pub mod net;
pub mod protocol;

// Re-exports
pub use beacon::{BeaconError, BeaconRecord};
pub use callbacks::{Callbacks, NoopCallbacks};
pub use error::AirPtpError;
pub use gateway::{
    GatewayContext, MasterGateway, MasterGatewayConfig, MessageGateway, MessageTimer,
};
pub use handle::PtpHandle;
pub use types::{DaemonConfig, HandleState, Role, clock_identity_from_seed};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
