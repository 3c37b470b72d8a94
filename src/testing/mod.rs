//! Test doubles for the daemon core.
//!
//! [`RecordingGateway`] counts every call the worker makes and lets a test
//! script the slave count; [`unique_beacon_name`] keeps concurrently
//! running tests off each other's shared memory.

#[cfg(test)]
mod tests;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::callbacks::Callbacks;
use crate::gateway::{GatewayContext, MessageGateway};
use crate::net::ServiceKind;

/// Counters shared between a [`RecordingGateway`] and the test driving it
#[derive(Debug, Default)]
pub struct GatewayStats {
    inits: AtomicUsize,
    clock_identity: AtomicU64,
    datagrams: AtomicUsize,
    announces: AtomicUsize,
    syncs: AtomicUsize,
    signalings: AtomicUsize,
    slave_queries: AtomicUsize,
    slaves: AtomicUsize,
    peers: Mutex<Vec<(ServiceKind, SocketAddr, Vec<u8>)>>,
}

impl GatewayStats {
    /// Script the slave count the gateway reports
    pub fn set_slaves(&self, count: usize) {
        self.slaves.store(count, Ordering::SeqCst);
    }

    /// Number of `init` calls
    #[must_use]
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Clock identity passed to the last `init`
    #[must_use]
    pub fn clock_identity(&self) -> u64 {
        self.clock_identity.load(Ordering::SeqCst)
    }

    /// Datagrams handed to the gateway
    #[must_use]
    pub fn datagrams(&self) -> usize {
        self.datagrams.load(Ordering::SeqCst)
    }

    /// Announce sends requested
    #[must_use]
    pub fn announces(&self) -> usize {
        self.announces.load(Ordering::SeqCst)
    }

    /// Sync sends requested
    #[must_use]
    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    /// Signaling sends requested
    #[must_use]
    pub fn signalings(&self) -> usize {
        self.signalings.load(Ordering::SeqCst)
    }

    /// Times the slave count was queried
    #[must_use]
    pub fn slave_queries(&self) -> usize {
        self.slave_queries.load(Ordering::SeqCst)
    }

    /// Service, peer and payload of every datagram received, in order
    #[must_use]
    pub fn received(&self) -> Vec<(ServiceKind, SocketAddr, Vec<u8>)> {
        self.peers
            .lock()
            .map(|peers| peers.clone())
            .unwrap_or_default()
    }
}

/// Gateway that records calls instead of speaking PTP
///
/// When a datagram arrives while the scripted slave count is non-zero it
/// re-arms every message timer, the way a real gateway does when a slave
/// appears.
#[derive(Debug)]
pub struct RecordingGateway {
    stats: Arc<GatewayStats>,
    fail_init: bool,
}

impl RecordingGateway {
    /// Create a gateway and the handle to its counters
    #[must_use]
    pub fn new() -> (Self, Arc<GatewayStats>) {
        let stats = Arc::new(GatewayStats::default());
        (
            Self {
                stats: Arc::clone(&stats),
                fail_init: false,
            },
            stats,
        )
    }

    /// Create a gateway whose `init` fails
    #[must_use]
    pub fn failing_init() -> (Self, Arc<GatewayStats>) {
        let (mut gateway, stats) = Self::new();
        gateway.fail_init = true;
        (gateway, stats)
    }
}

impl MessageGateway for RecordingGateway {
    fn init(&mut self, clock_identity: u64) -> io::Result<()> {
        self.stats.inits.fetch_add(1, Ordering::SeqCst);
        self.stats
            .clock_identity
            .store(clock_identity, Ordering::SeqCst);
        if self.fail_init {
            return Err(io::Error::other("scripted init failure"));
        }
        Ok(())
    }

    fn handle_message(
        &mut self,
        ctx: &mut GatewayContext<'_>,
        service: ServiceKind,
        data: &[u8],
        peer: SocketAddr,
    ) {
        self.stats.datagrams.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut peers) = self.stats.peers.lock() {
            peers.push((service, peer, data.to_vec()));
        }
        if self.stats.slaves.load(Ordering::SeqCst) > 0 {
            ctx.arm_all();
        }
    }

    fn send_announce(&mut self, _ctx: &mut GatewayContext<'_>) {
        self.stats.announces.fetch_add(1, Ordering::SeqCst);
    }

    fn send_sync(&mut self, _ctx: &mut GatewayContext<'_>) {
        self.stats.syncs.fetch_add(1, Ordering::SeqCst);
    }

    fn send_signaling(&mut self, _ctx: &mut GatewayContext<'_>) {
        self.stats.signalings.fetch_add(1, Ordering::SeqCst);
    }

    fn slave_count(&self) -> usize {
        self.stats.slave_queries.fetch_add(1, Ordering::SeqCst);
        self.stats.slaves.load(Ordering::SeqCst)
    }
}

/// Callbacks that remember what the worker told the host
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    thread_names: Mutex<Vec<(String, Option<String>)>>,
    messages: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    /// `(requested name, name of the calling thread)` for each
    /// `thread_name_set` call
    #[must_use]
    pub fn thread_names(&self) -> Vec<(String, Option<String>)> {
        self.thread_names
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    /// Messages passed to `log_message`
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl Callbacks for RecordingCallbacks {
    fn thread_name_set(&self, name: &str) {
        let current = std::thread::current().name().map(str::to_string);
        if let Ok(mut names) = self.thread_names.lock() {
            names.push((name.to_string(), current));
        }
    }

    fn log_message(&self, msg: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(msg.to_string());
        }
    }
}

/// Beacon name unique to this process and call
#[must_use]
pub fn unique_beacon_name(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "/airptp-test-{}-{}-{}",
        prefix,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
