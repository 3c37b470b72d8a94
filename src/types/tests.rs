use super::*;
use proptest::prelude::*;
use std::time::Duration;

// --- config.rs tests ---

#[test]
fn test_config_defaults() {
    let config = DaemonConfig::default();

    assert_eq!(config.bind_address, None);
    assert_eq!(config.event_port, 319);
    assert_eq!(config.general_port, 320);
    assert!(!config.reuse_address);
    assert_eq!(config.announce_interval, Duration::from_secs(1));
    assert_eq!(config.signaling_interval, Duration::from_secs(1));
    assert_eq!(config.sync_interval, Duration::from_millis(125));
    assert_eq!(config.beacon_refresh_interval, Duration::from_secs(5));
    assert_eq!(config.beacon_name, "/airptp");
    assert_eq!(config.beacon_stale_after, Duration::from_secs(30));
    assert_eq!(config.recv_buf_size, 1024);
}

#[test]
fn test_config_builder() {
    let config = DaemonConfig::builder()
        .bind_address("::1")
        .ports(0, 0)
        .reuse_address(true)
        .message_interval(Duration::from_millis(50))
        .sync_interval(Duration::from_millis(10))
        .beacon_refresh_interval(Duration::from_secs(1))
        .beacon_name("/airptp-test")
        .beacon_stale_after(Duration::from_secs(3))
        .recv_buf_size(512)
        .build();

    assert_eq!(config.bind_address.as_deref(), Some("::1"));
    assert_eq!(config.event_port, 0);
    assert_eq!(config.general_port, 0);
    assert!(config.reuse_address);
    assert_eq!(config.announce_interval, Duration::from_millis(50));
    assert_eq!(config.signaling_interval, Duration::from_millis(50));
    assert_eq!(config.sync_interval, Duration::from_millis(10));
    assert_eq!(config.beacon_refresh_interval, Duration::from_secs(1));
    assert_eq!(config.beacon_name, "/airptp-test");
    assert_eq!(config.beacon_stale_after, Duration::from_secs(3));
    assert_eq!(config.recv_buf_size, 512);
}

// --- identity.rs tests ---

#[test]
fn test_clock_identity_known_values() {
    assert_eq!(clock_identity_from_seed(0x0000_0000_0001), 0xFFFF_0000_0000_0001);
    assert_eq!(clock_identity_from_seed(0), 0xFFFF_0000_0000_0000);
    assert_eq!(
        clock_identity_from_seed(0xDEAD_BEEF),
        0xFFFF_0000_DEAD_BEEF
    );
}

#[test]
fn test_clock_identity_discards_high_seed_bits() {
    assert_eq!(
        clock_identity_from_seed(0x1234_5678_9ABC_DEF0),
        0xFFFF_5678_9ABC_DEF0
    );
}

proptest! {
    #[test]
    fn prop_clock_identity_prefix(seed in any::<u64>()) {
        let id = clock_identity_from_seed(seed);
        prop_assert_eq!(id >> 48, 0xFFFF);
        prop_assert_eq!(id & CLOCK_IDENTITY_SEED_MASK, seed & CLOCK_IDENTITY_SEED_MASK);
    }

    #[test]
    fn prop_clock_identity_distinct_for_distinct_48bit_seeds(
        a in 0u64..=CLOCK_IDENTITY_SEED_MASK,
        b in 0u64..=CLOCK_IDENTITY_SEED_MASK,
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(clock_identity_from_seed(a), clock_identity_from_seed(b));
    }
}

// --- state.rs tests ---

#[test]
fn test_handle_state_forward_only() {
    assert!(HandleState::Unbound.can_advance_to(HandleState::PortsBound));
    assert!(HandleState::PortsBound.can_advance_to(HandleState::Running));
    assert!(HandleState::Running.can_advance_to(HandleState::Stopped));
    assert!(HandleState::PortsBound.can_advance_to(HandleState::Stopped));

    assert!(!HandleState::Stopped.can_advance_to(HandleState::Running));
    assert!(!HandleState::Running.can_advance_to(HandleState::PortsBound));
    assert!(!HandleState::Running.can_advance_to(HandleState::Running));
}

#[test]
fn test_handle_state_display() {
    assert_eq!(HandleState::default().to_string(), "unbound");
    assert_eq!(HandleState::PortsBound.to_string(), "ports-bound");
    assert_eq!(HandleState::Running.to_string(), "running");
    assert_eq!(HandleState::Stopped.to_string(), "stopped");
}
