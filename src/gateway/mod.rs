//! Message gateway seam.
//!
//! The daemon core owns sockets, timers and the beacon; everything about the
//! PTP conversation itself lives behind [`MessageGateway`]. The gateway is
//! only ever called from the worker thread, one event at a time.

mod master;

#[cfg(test)]
mod tests;

use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::callbacks::Callbacks;
use crate::net::{ServiceKind, destination_for};

pub use master::{MasterGateway, MasterGatewayConfig};

/// The three periodic message timers driven by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTimer {
    /// Announce cadence
    Announce,
    /// Signaling cadence
    Signaling,
    /// Sync / `Follow_Up` cadence
    Sync,
}

impl MessageTimer {
    /// All message timers, in the order the worker arms them
    pub const ALL: [Self; 3] = [Self::Announce, Self::Signaling, Self::Sync];
}

impl std::fmt::Display for MessageTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Announce => write!(f, "announce"),
            Self::Signaling => write!(f, "signaling"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// Protocol engine plugged into the daemon core
///
/// Message timers lapse while [`slave_count`](Self::slave_count) is zero.
/// Bringing them back is the gateway's job: when it sees a slave appear it
/// calls [`GatewayContext::arm`] (or [`GatewayContext::arm_all`]).
pub trait MessageGateway: Send {
    /// Prepare for a run under `clock_identity`.
    ///
    /// Called on the control thread before the worker starts.
    ///
    /// # Errors
    ///
    /// Any error aborts `start`.
    fn init(&mut self, clock_identity: u64) -> io::Result<()>;

    /// Handle one non-empty datagram received on `service` from `peer`.
    fn handle_message(
        &mut self,
        ctx: &mut GatewayContext<'_>,
        service: ServiceKind,
        data: &[u8],
        peer: SocketAddr,
    );

    /// Send Announce to the current slaves.
    fn send_announce(&mut self, ctx: &mut GatewayContext<'_>);

    /// Send Sync (and `Follow_Up`) to the current slaves.
    fn send_sync(&mut self, ctx: &mut GatewayContext<'_>);

    /// Send Signaling to the current slaves.
    fn send_signaling(&mut self, ctx: &mut GatewayContext<'_>);

    /// Number of slaves currently listening.
    fn slave_count(&self) -> usize;
}

/// Non-blocking sender side of one PTP service
#[derive(Debug)]
pub(crate) struct Outbound {
    socket: UdpSocket,
    local: SocketAddr,
}

impl Outbound {
    pub(crate) fn new(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;
        Ok(Self { socket, local })
    }

    fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, destination_for(&self.local, dest))
    }
}

/// What a gateway may do while handling an event
pub struct GatewayContext<'a> {
    event: &'a Outbound,
    general: &'a Outbound,
    callbacks: &'a dyn Callbacks,
    arm_requests: Vec<MessageTimer>,
}

impl<'a> GatewayContext<'a> {
    pub(crate) fn new(
        event: &'a Outbound,
        general: &'a Outbound,
        callbacks: &'a dyn Callbacks,
    ) -> Self {
        Self {
            event,
            general,
            callbacks,
            arm_requests: Vec::new(),
        }
    }

    /// Send a datagram from the given service's socket without blocking.
    ///
    /// # Errors
    ///
    /// Returns the socket error, including `WouldBlock` when the send
    /// buffer is full.
    pub fn send(&self, service: ServiceKind, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        match service {
            ServiceKind::Event => self.event.send_to(data, dest),
            ServiceKind::General => self.general.send_to(data, dest),
        }
    }

    /// Send from the event socket.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_event(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.send(ServiceKind::Event, data, dest)
    }

    /// Send from the general socket.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_general(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.send(ServiceKind::General, data, dest)
    }

    /// Ask the worker to fire `timer` now if it has lapsed.
    ///
    /// A timer that is still scheduled keeps its deadline.
    pub fn arm(&mut self, timer: MessageTimer) {
        if !self.arm_requests.contains(&timer) {
            self.arm_requests.push(timer);
        }
    }

    /// Arm every message timer.
    pub fn arm_all(&mut self) {
        for timer in MessageTimer::ALL {
            self.arm(timer);
        }
    }

    /// Host callbacks
    #[must_use]
    pub fn callbacks(&self) -> &dyn Callbacks {
        self.callbacks
    }

    pub(crate) fn into_arm_requests(self) -> Vec<MessageTimer> {
        self.arm_requests
    }
}

impl std::fmt::Debug for GatewayContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("event", &self.event.local)
            .field("general", &self.general.local)
            .field("arm_requests", &self.arm_requests)
            .finish_non_exhaustive()
    }
}
