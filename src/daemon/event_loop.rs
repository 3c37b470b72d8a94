//! Worker thread body.
//!
//! One current-thread tokio runtime multiplexes both PTP sockets, the
//! shutdown channel and four timers. Every gateway call happens here, one
//! event at a time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};

use super::timer::{RearmTimer, TimerPolicy};
use crate::beacon::PresenceBeacon;
use crate::callbacks::Callbacks;
use crate::error::{AirPtpError, Result};
use crate::gateway::{GatewayContext, MessageGateway, MessageTimer, Outbound};
use crate::net::{ServiceKind, normalize_peer};

/// Name given to the worker thread
pub const THREAD_NAME: &str = "airptp";

/// Everything the worker needs, handed over from the control thread
pub(crate) struct WorkerSetup {
    pub(crate) event_rx: std::net::UdpSocket,
    pub(crate) general_rx: std::net::UdpSocket,
    pub(crate) event_tx: std::net::UdpSocket,
    pub(crate) general_tx: std::net::UdpSocket,
    pub(crate) gateway: Box<dyn MessageGateway>,
    pub(crate) callbacks: Arc<dyn Callbacks>,
    pub(crate) beacon: Option<BeaconSetup>,
    pub(crate) intervals: Intervals,
    pub(crate) recv_buf_size: usize,
}

/// Beacon to publish for the life of the loop
#[derive(Debug, Clone)]
pub(crate) struct BeaconSetup {
    pub(crate) name: String,
    pub(crate) clock_identity: u64,
    pub(crate) stale_after: Duration,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Intervals {
    pub(crate) announce: Duration,
    pub(crate) signaling: Duration,
    pub(crate) sync: Duration,
    pub(crate) beacon_refresh: Duration,
}

/// Clears the running flag however the worker exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Thread entry point.
///
/// Reports setup success or failure through `ready` before entering the
/// loop; the loop runs until `shutdown` carries `true` or its sender is
/// dropped.
pub(crate) fn run_worker(
    setup: WorkerSetup,
    runtime: tokio::runtime::Runtime,
    shutdown: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<()>>,
    running: Arc<AtomicBool>,
) {
    let _guard = RunningGuard(running);
    setup.callbacks.thread_name_set(THREAD_NAME);

    runtime.block_on(async move {
        let worker = match Worker::new(setup) {
            Ok(worker) => worker,
            Err(e) => {
                tracing::warn!("PTP worker setup failed: {}", e);
                // start() is waiting on the other end.
                let _ = ready.send(Err(e));
                return;
            }
        };
        if ready.send(Ok(())).is_err() {
            return;
        }
        worker.run(shutdown).await;
    });

    tracing::debug!("PTP worker thread exiting");
}

struct Timers {
    announce: RearmTimer,
    signaling: RearmTimer,
    sync: RearmTimer,
    beacon_refresh: RearmTimer,
}

impl Timers {
    fn new(intervals: Intervals) -> Self {
        Self {
            announce: RearmTimer::new(intervals.announce, TimerPolicy::WhileActive),
            signaling: RearmTimer::new(intervals.signaling, TimerPolicy::WhileActive),
            sync: RearmTimer::new(intervals.sync, TimerPolicy::WhileActive),
            beacon_refresh: RearmTimer::new(intervals.beacon_refresh, TimerPolicy::Persistent),
        }
    }

    fn message(&mut self, timer: MessageTimer) -> &mut RearmTimer {
        match timer {
            MessageTimer::Announce => &mut self.announce,
            MessageTimer::Signaling => &mut self.signaling,
            MessageTimer::Sync => &mut self.sync,
        }
    }

    fn arm(&mut self, requests: Vec<MessageTimer>) {
        for timer in requests {
            let slot = self.message(timer);
            if !slot.is_armed() {
                tracing::debug!("PTP: re-arming {} timer", timer);
                slot.arm_now();
            }
        }
    }
}

struct Worker {
    event: UdpSocket,
    general: UdpSocket,
    event_tx: Outbound,
    general_tx: Outbound,
    gateway: Box<dyn MessageGateway>,
    callbacks: Arc<dyn Callbacks>,
    beacon: Option<PresenceBeacon>,
    timers: Timers,
    recv_buf_size: usize,
}

impl Worker {
    /// Register the sockets, then publish the beacon. Must run inside the
    /// runtime.
    fn new(setup: WorkerSetup) -> Result<Self> {
        let register = |socket| {
            UdpSocket::from_std(socket).map_err(|source| AirPtpError::Resource {
                context: "register socket",
                source,
            })
        };
        let outbound = |socket| {
            Outbound::new(socket).map_err(|source| AirPtpError::Resource {
                context: "prepare send socket",
                source,
            })
        };

        let event = register(setup.event_rx)?;
        let general = register(setup.general_rx)?;
        let event_tx = outbound(setup.event_tx)?;
        let general_tx = outbound(setup.general_tx)?;

        let mut timers = Timers::new(setup.intervals);
        for timer in MessageTimer::ALL {
            timers.message(timer).arm_now();
        }

        let beacon = match setup.beacon {
            Some(beacon) => {
                let created = PresenceBeacon::create_or_reclaim(
                    &beacon.name,
                    beacon.clock_identity,
                    beacon.stale_after,
                )
                .inspect_err(|e| {
                    setup
                        .callbacks
                        .log_message(&format!("Could not publish PTP beacon: {e}"));
                })?;
                timers.beacon_refresh.arm_now();
                Some(created)
            }
            None => None,
        };

        Ok(Self {
            event,
            general,
            event_tx,
            general_tx,
            gateway: setup.gateway,
            callbacks: setup.callbacks,
            beacon,
            timers,
            recv_buf_size: setup.recv_buf_size,
        })
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut event_buf = vec![0u8; self.recv_buf_size];
        let mut general_buf = vec![0u8; self.recv_buf_size];

        tracing::info!(
            "PTP worker running (event={:?}, general={:?}, beacon={})",
            self.event.local_addr().ok(),
            self.general.local_addr().ok(),
            self.beacon.is_some()
        );

        loop {
            tokio::select! {
                result = self.event.recv_from(&mut event_buf) => {
                    self.on_datagram(ServiceKind::Event, result, &event_buf);
                }

                result = self.general.recv_from(&mut general_buf) => {
                    self.on_datagram(ServiceKind::General, result, &general_buf);
                }

                () = self.timers.announce.wait() => {
                    self.on_message_timer(MessageTimer::Announce);
                }

                () = self.timers.signaling.wait() => {
                    self.on_message_timer(MessageTimer::Signaling);
                }

                () = self.timers.sync.wait() => {
                    self.on_message_timer(MessageTimer::Sync);
                }

                () = self.timers.beacon_refresh.wait() => {
                    if let Some(beacon) = &self.beacon {
                        beacon.refresh();
                    }
                    self.timers.beacon_refresh.fire(|| true);
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("PTP worker shutting down");
                        break;
                    }
                }
            }
        }

        if let Some(mut beacon) = self.beacon.take() {
            beacon.destroy();
        }
    }

    fn on_datagram(
        &mut self,
        service: ServiceKind,
        result: io::Result<(usize, SocketAddr)>,
        buf: &[u8],
    ) {
        match result {
            Ok((0, peer)) => {
                tracing::debug!("PTP: empty datagram from {} on {} discarded", peer, service);
            }
            Ok((len, peer)) => {
                let peer = normalize_peer(peer);
                tracing::trace!("PTP: {} bytes from {} on {}", len, peer, service);
                let mut ctx =
                    GatewayContext::new(&self.event_tx, &self.general_tx, self.callbacks.as_ref());
                self.gateway
                    .handle_message(&mut ctx, service, &buf[..len], peer);
                let requests = ctx.into_arm_requests();
                self.timers.arm(requests);
            }
            Err(e) if is_transient_udp_error(&e) => {
                tracing::debug!("PTP: transient {} socket error: {}", service, e);
            }
            Err(e) => {
                tracing::warn!("PTP: receive on {} failed: {}", service, e);
                self.callbacks
                    .log_message(&format!("Receive on {service} failed: {e}"));
            }
        }
    }

    fn on_message_timer(&mut self, timer: MessageTimer) {
        let gateway = &self.gateway;
        if !self
            .timers
            .message(timer)
            .fire(|| gateway.slave_count() > 0)
        {
            tracing::debug!("PTP: no slaves, {} timer lapsed", timer);
            return;
        }

        let mut ctx = GatewayContext::new(&self.event_tx, &self.general_tx, self.callbacks.as_ref());
        match timer {
            MessageTimer::Announce => self.gateway.send_announce(&mut ctx),
            MessageTimer::Signaling => self.gateway.send_signaling(&mut ctx),
            MessageTimer::Sync => self.gateway.send_sync(&mut ctx),
        }
        let requests = ctx.into_arm_requests();
        self.timers.arm(requests);
    }
}

/// Errors a UDP receive can report for a previous send, e.g. an ICMP port
/// unreachable from a peer that is not listening yet.
fn is_transient_udp_error(e: &io::Error) -> bool {
    // Windows WSAECONNRESET
    e.raw_os_error() == Some(10054) || e.kind() == io::ErrorKind::ConnectionReset
}
