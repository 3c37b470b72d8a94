//! Grandmaster-only gateway.
//!
//! Keeps a table of unicast slaves and serves them Announce, two-step Sync
//! and Signaling, answering `Delay_Req` as it arrives. No BMCA: this node
//! is always the master.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;

use super::{GatewayContext, MessageGateway};
use crate::callbacks::hex_preview;
use crate::net::ServiceKind;
use crate::protocol::ptp::{
    PTP_EVENT_PORT, PTP_GENERAL_PORT, PtpMessage, PtpMessageBody, PtpMessageType, PtpPortIdentity,
    PtpTimestamp,
};

/// Configuration for [`MasterGateway`]
#[derive(Debug, Clone)]
pub struct MasterGatewayConfig {
    /// Announce priority1 (lower wins, 128 = default)
    pub priority1: u8,
    /// Announce priority2
    pub priority2: u8,
    /// A slave not heard from for this long is dropped (default: 15 seconds)
    pub slave_timeout: Duration,
    /// Event port assumed for a slave only seen on its general port
    pub event_port: u16,
    /// General port assumed for a slave only seen on its event port
    pub general_port: u16,
}

impl Default for MasterGatewayConfig {
    fn default() -> Self {
        Self {
            priority1: 128,
            priority2: 128,
            slave_timeout: Duration::from_secs(15),
            event_port: PTP_EVENT_PORT,
            general_port: PTP_GENERAL_PORT,
        }
    }
}

#[derive(Debug, Clone)]
struct Slave {
    port_identity: PtpPortIdentity,
    event_addr: Option<SocketAddr>,
    general_addr: Option<SocketAddr>,
    last_seen: Instant,
}

impl Slave {
    fn event_dest(&self, ip: IpAddr, config: &MasterGatewayConfig) -> SocketAddr {
        self.event_addr
            .unwrap_or_else(|| SocketAddr::new(ip, config.event_port))
    }

    fn general_dest(&self, ip: IpAddr, config: &MasterGatewayConfig) -> SocketAddr {
        self.general_addr
            .unwrap_or_else(|| SocketAddr::new(ip, config.general_port))
    }
}

/// Unicast PTP master serving every peer that asks for it
#[derive(Debug)]
pub struct MasterGateway {
    config: MasterGatewayConfig,
    clock_identity: u64,
    slaves: HashMap<IpAddr, Slave>,
    announce_sequence: u16,
    sync_sequence: u16,
    signaling_sequence: u16,
}

impl MasterGateway {
    /// Create a gateway; the clock identity is set by `init`.
    #[must_use]
    pub fn new(config: MasterGatewayConfig) -> Self {
        Self {
            config,
            clock_identity: 0,
            slaves: HashMap::new(),
            announce_sequence: 0,
            sync_sequence: 0,
            signaling_sequence: 0,
        }
    }

    /// Clock identity in use
    #[must_use]
    pub fn clock_identity(&self) -> u64 {
        self.clock_identity
    }

    /// Addresses of the live slaves
    #[must_use]
    pub fn slaves(&self) -> Vec<IpAddr> {
        let now = Instant::now();
        self.slaves
            .iter()
            .filter(|(_, slave)| self.is_live(slave, now))
            .map(|(ip, _)| *ip)
            .collect()
    }

    fn source(&self) -> PtpPortIdentity {
        PtpPortIdentity::new(self.clock_identity, 1)
    }

    fn is_live(&self, slave: &Slave, now: Instant) -> bool {
        now.saturating_duration_since(slave.last_seen) < self.config.slave_timeout
    }

    fn prune(&mut self) {
        let now = Instant::now();
        let timeout = self.config.slave_timeout;
        self.slaves.retain(|ip, slave| {
            let live = now.saturating_duration_since(slave.last_seen) < timeout;
            if !live {
                tracing::info!(
                    "PTP slave {} ({:016X}) timed out",
                    ip,
                    slave.port_identity.clock_identity
                );
            }
            live
        });
    }

    fn note_slave(
        &mut self,
        service: ServiceKind,
        peer: SocketAddr,
        port_identity: PtpPortIdentity,
    ) {
        let now = Instant::now();
        let slave = self.slaves.entry(peer.ip()).or_insert_with(|| {
            tracing::info!(
                "PTP slave {} ({:016X}) registered",
                peer.ip(),
                port_identity.clock_identity
            );
            Slave {
                port_identity,
                event_addr: None,
                general_addr: None,
                last_seen: now,
            }
        });
        match service {
            ServiceKind::Event => slave.event_addr = Some(peer),
            ServiceKind::General => slave.general_addr = Some(peer),
        }
        slave.port_identity = port_identity;
        slave.last_seen = now;
    }

    fn handle_delay_req(
        &self,
        ctx: &GatewayContext<'_>,
        msg: &PtpMessage,
        peer: SocketAddr,
        receive_timestamp: PtpTimestamp,
    ) {
        let resp = PtpMessage::delay_resp(
            self.source(),
            msg.header.sequence_id,
            receive_timestamp,
            msg.header.source_port_identity,
        );
        let dest = match self.slaves.get(&peer.ip()) {
            Some(slave) => slave.general_dest(peer.ip(), &self.config),
            None => SocketAddr::new(peer.ip(), self.config.general_port),
        };
        send_message(ctx, PtpMessageType::DelayResp, &resp.encode(), dest);
    }
}

impl MessageGateway for MasterGateway {
    fn init(&mut self, clock_identity: u64) -> io::Result<()> {
        self.clock_identity = clock_identity;
        self.slaves.clear();
        self.announce_sequence = 0;
        self.sync_sequence = 0;
        self.signaling_sequence = 0;
        tracing::debug!("PTP master gateway ready as {:016X}", clock_identity);
        Ok(())
    }

    fn handle_message(
        &mut self,
        ctx: &mut GatewayContext<'_>,
        service: ServiceKind,
        data: &[u8],
        peer: SocketAddr,
    ) {
        let receive_timestamp = PtpTimestamp::now();
        let msg = match PtpMessage::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(
                    "PTP: undecodable {} datagram from {}: {} {}",
                    service,
                    peer,
                    e,
                    hex_preview(data, 16)
                );
                ctx.callbacks().hexdump("Undecodable PTP datagram", data);
                return;
            }
        };

        self.prune();
        let had_slaves = !self.slaves.is_empty();

        match &msg.body {
            PtpMessageBody::Signaling { .. } => {
                tracing::debug!("PTP: Signaling from {} on {}", peer, service);
                self.note_slave(service, peer, msg.header.source_port_identity);
            }
            PtpMessageBody::DelayReq { .. } => {
                tracing::debug!(
                    "PTP: Delay_Req seq={} from {}",
                    msg.header.sequence_id,
                    peer
                );
                self.note_slave(service, peer, msg.header.source_port_identity);
                self.handle_delay_req(ctx, &msg, peer, receive_timestamp);
            }
            PtpMessageBody::Announce {
                grandmaster_identity,
                ..
            } => {
                tracing::debug!(
                    "PTP: ignoring Announce from {} (grandmaster {:016X})",
                    peer,
                    grandmaster_identity
                );
            }
            _ => {
                tracing::debug!(
                    "PTP: ignoring {} from {}",
                    msg.header.message_type,
                    peer
                );
            }
        }

        if !had_slaves && !self.slaves.is_empty() {
            tracing::info!("PTP: first slave appeared, resuming message timers");
            ctx.arm_all();
        }
    }

    fn send_announce(&mut self, ctx: &mut GatewayContext<'_>) {
        self.prune();
        let msg = PtpMessage::announce(
            self.source(),
            self.announce_sequence,
            self.config.priority1,
            self.config.priority2,
        );
        let encoded = msg.encode();
        for (ip, slave) in &self.slaves {
            let dest = slave.general_dest(*ip, &self.config);
            send_message(ctx, PtpMessageType::Announce, &encoded, dest);
        }
        self.announce_sequence = self.announce_sequence.wrapping_add(1);
    }

    fn send_sync(&mut self, ctx: &mut GatewayContext<'_>) {
        self.prune();
        let source = self.source();
        for (ip, slave) in &self.slaves {
            let event_dest = slave.event_dest(*ip, &self.config);
            let sync = PtpMessage::sync(source, self.sync_sequence, PtpTimestamp::now());
            send_message(ctx, PtpMessageType::Sync, &sync.encode(), event_dest);

            let precise_t1 = PtpTimestamp::now();
            let follow_up = PtpMessage::follow_up(source, self.sync_sequence, precise_t1);
            let general_dest = slave.general_dest(*ip, &self.config);
            send_message(ctx, PtpMessageType::FollowUp, &follow_up.encode(), general_dest);
        }
        self.sync_sequence = self.sync_sequence.wrapping_add(1);
    }

    fn send_signaling(&mut self, ctx: &mut GatewayContext<'_>) {
        self.prune();
        let msg = PtpMessage::signaling(
            self.source(),
            self.signaling_sequence,
            PtpPortIdentity::ALL,
        );
        let encoded = msg.encode();
        for (ip, slave) in &self.slaves {
            let dest = slave.general_dest(*ip, &self.config);
            send_message(ctx, PtpMessageType::Signaling, &encoded, dest);
        }
        self.signaling_sequence = self.signaling_sequence.wrapping_add(1);
    }

    fn slave_count(&self) -> usize {
        let now = Instant::now();
        self.slaves
            .values()
            .filter(|slave| self.is_live(slave, now))
            .count()
    }
}

/// Send on the port `kind` belongs to. Failures are logged and dropped; the
/// next timer tick retries.
fn send_message(ctx: &GatewayContext<'_>, kind: PtpMessageType, data: &[u8], dest: SocketAddr) {
    match ctx.send(kind.service(), data, dest) {
        Ok(_) => tracing::trace!("PTP: sent {} to {}", kind, dest),
        Err(e) => tracing::warn!("PTP: failed to send {} to {}: {}", kind, dest, e),
    }
}
