//! Core types module

mod config;
mod identity;
mod state;

#[cfg(test)]
mod tests;

pub use config::{DaemonConfig, DaemonConfigBuilder};
pub use identity::{CLOCK_IDENTITY_SEED_MASK, NON_EUI64_PREFIX, clock_identity_from_seed};
pub use state::{HandleState, Role};
