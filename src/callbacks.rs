//! Host hooks the daemon calls into.
//!
//! Every method has a no-op default, so a host only implements what it
//! cares about. The daemon logs through `tracing` regardless; these hooks
//! exist for hosts that route diagnostics elsewhere.

use std::sync::Arc;

/// Optional capabilities a host can provide to the daemon
pub trait Callbacks: Send + Sync {
    /// Called once from the worker thread with the name it should carry
    fn thread_name_set(&self, _name: &str) {}

    /// Raw bytes worth looking at, e.g. a datagram that failed to decode
    fn hexdump(&self, _msg: &str, _data: &[u8]) {}

    /// A formatted diagnostic message
    fn log_message(&self, _msg: &str) {}
}

/// Callbacks that ignore everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl Callbacks for NoopCallbacks {}

/// Shared callbacks handle, defaulting to [`NoopCallbacks`]
pub(crate) fn or_noop(callbacks: Option<Arc<dyn Callbacks>>) -> Arc<dyn Callbacks> {
    callbacks.unwrap_or_else(|| Arc::new(NoopCallbacks))
}

/// Format bytes the way PTP decode failures are logged: `[AA, BB, ...]`
#[must_use]
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    let hex: Vec<String> = data.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    format!("[{}]", hex.join(", "))
}
