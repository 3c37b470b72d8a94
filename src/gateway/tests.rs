use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use super::*;
use crate::callbacks::NoopCallbacks;
use crate::protocol::ptp::{
    PtpHeader, PtpMessage, PtpMessageBody, PtpMessageType, PtpPortIdentity, PtpTimestamp,
};

const CLOCK_ID: u64 = 0xFFFF_0000_0000_0042;
const SLAVE_ID: u64 = 0x0011_22FF_FE33_4455;

#[derive(Default)]
struct DumpRecorder {
    dumps: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Callbacks for DumpRecorder {
    fn hexdump(&self, msg: &str, data: &[u8]) {
        self.dumps
            .lock()
            .unwrap()
            .push((msg.to_string(), data.to_vec()));
    }
}

fn udp() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

struct Rig {
    event_out: Outbound,
    general_out: Outbound,
    peer_event: UdpSocket,
    peer_general: UdpSocket,
    gateway: MasterGateway,
}

impl Rig {
    fn new() -> Self {
        let peer_event = udp();
        let peer_general = udp();
        let config = MasterGatewayConfig {
            event_port: peer_event.local_addr().unwrap().port(),
            general_port: peer_general.local_addr().unwrap().port(),
            ..MasterGatewayConfig::default()
        };
        let mut gateway = MasterGateway::new(config);
        gateway.init(CLOCK_ID).unwrap();

        Self {
            event_out: Outbound::new(udp()).unwrap(),
            general_out: Outbound::new(udp()).unwrap(),
            peer_event,
            peer_general,
            gateway,
        }
    }

    fn peer_event_addr(&self) -> SocketAddr {
        self.peer_event.local_addr().unwrap()
    }

    fn peer_general_addr(&self) -> SocketAddr {
        self.peer_general.local_addr().unwrap()
    }

    /// Feed one datagram to the gateway and return the timers it asked for.
    fn deliver(
        &mut self,
        service: ServiceKind,
        data: &[u8],
        peer: SocketAddr,
    ) -> Vec<MessageTimer> {
        let callbacks = NoopCallbacks;
        let mut ctx = GatewayContext::new(&self.event_out, &self.general_out, &callbacks);
        self.gateway.handle_message(&mut ctx, service, data, peer);
        ctx.into_arm_requests()
    }

    fn signal_from_general(&mut self) -> Vec<MessageTimer> {
        let msg = PtpMessage::signaling(
            PtpPortIdentity::new(SLAVE_ID, 1),
            7,
            PtpPortIdentity::ALL,
        );
        let peer = self.peer_general_addr();
        self.deliver(ServiceKind::General, &msg.encode(), peer)
    }
}

fn recv_message(socket: &UdpSocket) -> (PtpMessage, SocketAddr) {
    let mut buf = [0u8; 256];
    let (len, from) = socket.recv_from(&mut buf).unwrap();
    (PtpMessage::decode(&buf[..len]).unwrap(), from)
}

#[test]
fn test_context_arm_deduplicates() {
    let event = Outbound::new(udp()).unwrap();
    let general = Outbound::new(udp()).unwrap();
    let callbacks = NoopCallbacks;
    let mut ctx = GatewayContext::new(&event, &general, &callbacks);

    ctx.arm(MessageTimer::Sync);
    ctx.arm_all();
    ctx.arm(MessageTimer::Sync);

    assert_eq!(
        ctx.into_arm_requests(),
        vec![MessageTimer::Sync, MessageTimer::Announce, MessageTimer::Signaling]
    );
}

#[test]
fn test_context_sends_from_chosen_service() {
    let event = Outbound::new(udp()).unwrap();
    let general = Outbound::new(udp()).unwrap();
    let callbacks = NoopCallbacks;
    let ctx = GatewayContext::new(&event, &general, &callbacks);
    let peer = udp();

    ctx.send_event(b"e", peer.local_addr().unwrap()).unwrap();
    let mut buf = [0u8; 4];
    let (_, from) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(from, event.local);

    ctx.send_general(b"g", peer.local_addr().unwrap()).unwrap();
    let (_, from) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(from, general.local);
}

#[test]
fn test_new_gateway_has_no_slaves() {
    let rig = Rig::new();
    assert_eq!(rig.gateway.slave_count(), 0);
    assert_eq!(rig.gateway.clock_identity(), CLOCK_ID);
}

#[test]
fn test_signaling_registers_slave_and_arms_timers() {
    let mut rig = Rig::new();

    let armed = rig.signal_from_general();

    assert_eq!(rig.gateway.slave_count(), 1);
    assert_eq!(armed, MessageTimer::ALL.to_vec());
    assert_eq!(rig.gateway.slaves(), vec![rig.peer_general_addr().ip()]);
}

#[test]
fn test_known_slave_does_not_rearm() {
    let mut rig = Rig::new();
    rig.signal_from_general();

    let armed = rig.signal_from_general();

    assert!(armed.is_empty());
    assert_eq!(rig.gateway.slave_count(), 1);
}

#[test]
fn test_delay_req_answered_on_general_port() {
    let mut rig = Rig::new();
    let req = PtpMessage::delay_req(
        PtpPortIdentity::new(SLAVE_ID, 1),
        0x1234,
        PtpTimestamp::new(100, 0),
    );
    let peer = rig.peer_event_addr();

    let armed = rig.deliver(ServiceKind::Event, &req.encode(), peer);
    assert_eq!(armed, MessageTimer::ALL.to_vec());

    let (resp, from) = recv_message(&rig.peer_general);
    assert_eq!(from, rig.general_out.local);
    assert_eq!(resp.header.message_type, PtpMessageType::DelayResp);
    assert_eq!(resp.header.sequence_id, 0x1234);
    assert_eq!(resp.header.source_port_identity.clock_identity, CLOCK_ID);
    match resp.body {
        PtpMessageBody::DelayResp {
            requesting_port_identity,
            receive_timestamp,
        } => {
            assert_eq!(requesting_port_identity, PtpPortIdentity::new(SLAVE_ID, 1));
            assert!(receive_timestamp.seconds > 0);
        }
        other => panic!("Expected Delay_Resp, got {other:?}"),
    }
}

#[test]
fn test_send_sync_is_two_step() {
    let mut rig = Rig::new();
    rig.signal_from_general();

    let callbacks = NoopCallbacks;
    let mut ctx = GatewayContext::new(&rig.event_out, &rig.general_out, &callbacks);
    rig.gateway.send_sync(&mut ctx);

    let (sync, from) = recv_message(&rig.peer_event);
    assert_eq!(from, rig.event_out.local);
    assert_eq!(sync.header.message_type, PtpMessageType::Sync);
    assert_eq!(sync.header.flags & PtpHeader::FLAG_TWO_STEP, PtpHeader::FLAG_TWO_STEP);

    let (follow_up, from) = recv_message(&rig.peer_general);
    assert_eq!(from, rig.general_out.local);
    assert_eq!(follow_up.header.message_type, PtpMessageType::FollowUp);
    assert_eq!(follow_up.header.sequence_id, sync.header.sequence_id);
}

#[test]
fn test_send_announce_names_self_as_grandmaster() {
    let mut rig = Rig::new();
    rig.signal_from_general();

    let callbacks = NoopCallbacks;
    let mut ctx = GatewayContext::new(&rig.event_out, &rig.general_out, &callbacks);
    rig.gateway.send_announce(&mut ctx);
    rig.gateway.send_announce(&mut ctx);

    let (first, _) = recv_message(&rig.peer_general);
    let (second, _) = recv_message(&rig.peer_general);
    assert_eq!(second.header.sequence_id, first.header.sequence_id.wrapping_add(1));
    match first.body {
        PtpMessageBody::Announce {
            grandmaster_identity,
            grandmaster_priority1,
            ..
        } => {
            assert_eq!(grandmaster_identity, CLOCK_ID);
            assert_eq!(grandmaster_priority1, 128);
        }
        other => panic!("Expected Announce, got {other:?}"),
    }
}

#[test]
fn test_send_signaling_targets_all_ports() {
    let mut rig = Rig::new();
    rig.signal_from_general();

    let callbacks = NoopCallbacks;
    let mut ctx = GatewayContext::new(&rig.event_out, &rig.general_out, &callbacks);
    rig.gateway.send_signaling(&mut ctx);

    let (msg, _) = recv_message(&rig.peer_general);
    match msg.body {
        PtpMessageBody::Signaling {
            target_port_identity,
            ..
        } => assert_eq!(target_port_identity, PtpPortIdentity::ALL),
        other => panic!("Expected Signaling, got {other:?}"),
    }
}

#[test]
fn test_sends_without_slaves_are_silent() {
    let mut rig = Rig::new();
    rig.peer_general
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();

    let callbacks = NoopCallbacks;
    let mut ctx = GatewayContext::new(&rig.event_out, &rig.general_out, &callbacks);
    rig.gateway.send_announce(&mut ctx);

    let mut buf = [0u8; 64];
    assert!(rig.peer_general.recv_from(&mut buf).is_err());
}

#[test]
fn test_garbage_is_hexdumped_and_ignored() {
    let mut rig = Rig::new();
    let recorder = DumpRecorder::default();
    let garbage = [0xDE, 0xAD, 0xBE, 0xEF];
    let peer = rig.peer_event_addr();

    let mut ctx = GatewayContext::new(&rig.event_out, &rig.general_out, &recorder);
    rig.gateway
        .handle_message(&mut ctx, ServiceKind::Event, &garbage, peer);

    assert!(ctx.into_arm_requests().is_empty());
    assert_eq!(rig.gateway.slave_count(), 0);
    let dumps = recorder.dumps.lock().unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].1, garbage);
}

#[test]
fn test_foreign_sync_does_not_register_slave() {
    let mut rig = Rig::new();
    let sync = PtpMessage::sync(PtpPortIdentity::new(SLAVE_ID, 1), 1, PtpTimestamp::now());
    let peer = rig.peer_event_addr();

    let armed = rig.deliver(ServiceKind::Event, &sync.encode(), peer);

    assert!(armed.is_empty());
    assert_eq!(rig.gateway.slave_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_slave_times_out() {
    let mut rig = Rig::new();
    rig.signal_from_general();
    assert_eq!(rig.gateway.slave_count(), 1);

    tokio::time::advance(Duration::from_secs(14)).await;
    assert_eq!(rig.gateway.slave_count(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(rig.gateway.slave_count(), 0);

    // A returning slave is a new appearance and re-arms the timers.
    let armed = rig.signal_from_general();
    assert_eq!(armed, MessageTimer::ALL.to_vec());
}
