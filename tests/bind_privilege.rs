//! A failed bind closes everything it opened.

#![cfg(target_os = "linux")]

use std::sync::Mutex;

use airptp::net::{bind_ports, bind_udp};
use airptp::{AirPtpError, DaemonConfig, PtpHandle};

// Descriptor counts are process-wide, so tests here must not overlap.
static FD_LOCK: Mutex<()> = Mutex::new(());

fn open_descriptors() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn test_failed_bind_leaks_no_descriptors() {
    let _serial = FD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let before = open_descriptors();

    match PtpHandle::bind() {
        Err(AirPtpError::Bind { port, .. }) => {
            assert!(port == 319 || port == 320);
        }
        Err(other) => panic!("Expected bind error, got {other:?}"),
        // Running with privilege and free ports: the busy-port test covers this.
        Ok(handle) => {
            handle.release();
            return;
        }
    }

    assert_eq!(open_descriptors(), before);
}

#[test]
fn test_busy_general_port_releases_event_socket() {
    let _serial = FD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let blocker = bind_udp(None, 0, false).unwrap();
    let busy = blocker.local_addr().unwrap().port();
    let config = DaemonConfig::builder().ports(0, busy).build();

    let before = open_descriptors();
    match bind_ports(&config) {
        Err(AirPtpError::Bind { port, .. }) => assert_eq!(port, busy),
        other => panic!("Expected bind error on port {busy}, got {other:?}"),
    }
    assert_eq!(open_descriptors(), before);

    // The blocker is untouched and the port frees up once it goes.
    drop(blocker);
    let ports = bind_ports(&config).unwrap();
    assert_eq!(ports.general().port(), busy);
}
