//! Privileged port binding.
//!
//! Opens the two PTP UDP sockets before the daemon exists. Both sockets are
//! dual-stack where the host supports IPv6, so IPv4 receivers reach us as
//! IPv4-mapped peers.


use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{AirPtpError, Result};
use crate::types::DaemonConfig;

/// Which of the two PTP services a socket belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Event port (Sync, `Delay_Req`)
    Event,
    /// General port (`Follow_Up`, `Delay_Resp`, Announce, Signaling)
    General,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => write!(f, "PTP EVENT"),
            Self::General => write!(f, "PTP GENERAL"),
        }
    }
}

/// A bound PTP socket and the port it ended up on
#[derive(Debug)]
pub struct Service {
    kind: ServiceKind,
    port: u16,
    socket: UdpSocket,
}

impl Service {
    /// Service kind
    #[must_use]
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Port actually bound (differs from the requested one when that was 0)
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Local address of the socket
    ///
    /// # Errors
    ///
    /// Returns the OS error if the address cannot be queried.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Duplicate the descriptor for use by the worker thread.
    ///
    /// The original stays with the owner; closing the duplicate does not
    /// unbind the port.
    pub(crate) fn try_clone_socket(&self) -> io::Result<UdpSocket> {
        self.socket.try_clone()
    }
}

/// The event and general sockets, bound once and owned by the handle
#[derive(Debug)]
pub struct BoundPorts {
    event: Service,
    general: Service,
}

impl BoundPorts {
    /// Event service
    #[must_use]
    pub fn event(&self) -> &Service {
        &self.event
    }

    /// General service
    #[must_use]
    pub fn general(&self) -> &Service {
        &self.general
    }
}

/// Bind both PTP ports as described by `config`.
///
/// Either both sockets are returned or neither stays open.
///
/// # Errors
///
/// Returns [`AirPtpError::Bind`] naming the port that could not be bound,
/// typically because the process lacks privilege for ports below 1024 or
/// another daemon already holds them.
pub fn bind_ports(config: &DaemonConfig) -> Result<BoundPorts> {
    let node = config.bind_address.as_deref();

    let event = bind_service(ServiceKind::Event, node, config.event_port, config.reuse_address)?;
    // If this fails, `event` is dropped and its descriptor closed.
    let general = bind_service(
        ServiceKind::General,
        node,
        config.general_port,
        config.reuse_address,
    )?;

    tracing::info!(
        "PTP ports bound: event={} general={}",
        event.port,
        general.port
    );

    Ok(BoundPorts { event, general })
}

fn bind_service(
    kind: ServiceKind,
    node: Option<&str>,
    port: u16,
    reuse_address: bool,
) -> Result<Service> {
    let socket =
        bind_udp(node, port, reuse_address).map_err(|source| AirPtpError::Bind { port, source })?;
    let bound_port = socket
        .local_addr()
        .map_err(|source| AirPtpError::Bind { port, source })?
        .port();
    Ok(Service {
        kind,
        port: bound_port,
        socket,
    })
}

/// Bind a non-blocking UDP socket to the first candidate address that works.
///
/// Without a node the dual-stack IPv6 wildcard is tried first, then the IPv4
/// wildcard for hosts without IPv6.
///
/// # Errors
///
/// Returns the error of the last candidate tried, or `AddrNotAvailable` if
/// the node resolved to nothing.
pub fn bind_udp(node: Option<&str>, port: u16, reuse_address: bool) -> io::Result<UdpSocket> {
    let mut last_err = None;

    for addr in candidate_addrs(node, port)? {
        match try_bind(addr, reuse_address) {
            Ok(socket) => return Ok(socket),
            Err(e) => {
                tracing::debug!("Could not bind {}: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no local address to bind",
        )
    }))
}

fn candidate_addrs(node: Option<&str>, port: u16) -> io::Result<Vec<SocketAddr>> {
    let Some(node) = node else {
        return Ok(vec![
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        ]);
    };

    let mut addrs: Vec<SocketAddr> = (node, port).to_socket_addrs()?.collect();
    // Prefer IPv6 so a dual-stack socket is used whenever possible.
    addrs.sort_by_key(|addr| !addr.is_ipv6());
    addrs.dedup();
    Ok(addrs)
}

fn try_bind(addr: SocketAddr, reuse_address: bool) -> io::Result<UdpSocket> {
    // socket2 opens the descriptor with close-on-exec set.
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_keepalive(true)?;
    if reuse_address {
        socket.set_reuse_address(true)?;
    }
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Report IPv4-mapped IPv6 peers as plain IPv4.
#[must_use]
pub fn normalize_peer(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        SocketAddr::V4(_) => addr,
    }
}

/// Adapt a destination to the family of the socket sending to it.
#[must_use]
pub fn destination_for(local: &SocketAddr, dest: SocketAddr) -> SocketAddr {
    match (local, dest) {
        (SocketAddr::V6(_), SocketAddr::V4(v4)) => {
            SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port())
        }
        _ => dest,
    }
}
