//! Lifecycle of owner and observer handles through the public API.

use std::sync::Once;
use std::time::Duration;

use airptp::testing::{RecordingGateway, unique_beacon_name};
use airptp::{AirPtpError, DaemonConfig, HandleState, PtpHandle, Role, clock_identity_from_seed};

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info,airptp=debug")
            .with_test_writer()
            .try_init();
    });
}

fn config(label: &str) -> DaemonConfig {
    init();
    DaemonConfig::builder()
        .ports(0, 0)
        .message_interval(Duration::from_millis(20))
        .beacon_name(unique_beacon_name(label))
        .build()
}

fn start(handle: &mut PtpHandle, seed: u64, publish: bool) -> Result<(), AirPtpError> {
    let (gateway, _stats) = RecordingGateway::new();
    handle.start_with_gateway(seed, publish, Box::new(gateway), None)
}

#[test]
fn test_start_stop_start_stop() {
    let mut handle = PtpHandle::bind_with_config(config("sequence")).unwrap();
    assert_eq!(handle.state(), HandleState::PortsBound);

    start(&mut handle, 7, false).unwrap();
    assert_eq!(handle.state(), HandleState::Running);
    assert_eq!(handle.clock_identity().unwrap(), clock_identity_from_seed(7));

    handle.stop();
    assert_eq!(handle.state(), HandleState::Stopped);

    assert!(matches!(
        start(&mut handle, 7, false),
        Err(AirPtpError::InvalidState { .. })
    ));
    handle.stop();
    assert_eq!(handle.state(), HandleState::Stopped);
}

#[test]
fn test_second_bind_fails_while_first_keeps_running() {
    let mut first = PtpHandle::bind_with_config(config("first")).unwrap();
    start(&mut first, 1, false).unwrap();

    let taken = DaemonConfig::builder()
        .ports(first.event_port().unwrap(), first.general_port().unwrap())
        .build();
    let err = PtpHandle::bind_with_config(taken).unwrap_err();
    assert!(matches!(err, AirPtpError::Bind { .. }));
    assert!(err.is_recoverable());

    assert!(first.is_running());
    assert_eq!(first.clock_identity().unwrap(), clock_identity_from_seed(1));
}

#[test]
fn test_observer_sees_owner_until_owner_releases() {
    let config = config("observer");
    let mut owner = PtpHandle::bind_with_config(config.clone()).unwrap();
    start(&mut owner, 0x0000_0000_BEEF, true).unwrap();

    let observer = PtpHandle::discover_with_config(&config).unwrap();
    assert_eq!(observer.role(), Role::Observer);
    assert_eq!(observer.clock_identity().unwrap(), 0xFFFF_0000_0000_BEEF);
    observer.release();

    // Still there after the observer is gone.
    let again = PtpHandle::discover_with_config(&config).unwrap();
    assert_eq!(again.clock_identity().unwrap(), 0xFFFF_0000_0000_BEEF);

    owner.release();
    assert!(matches!(
        PtpHandle::discover_with_config(&config),
        Err(AirPtpError::NotFound)
    ));
}

#[test]
fn test_discover_or_become_owner() {
    let config = config("fallback");

    let handle = match PtpHandle::discover_with_config(&config) {
        Ok(observer) => observer,
        Err(e) => {
            assert!(e.is_not_found());
            let mut owner = PtpHandle::bind_with_config(config.clone()).unwrap();
            start(&mut owner, 3, true).unwrap();
            owner
        }
    };

    assert_eq!(handle.role(), Role::Owner);
    let observer = PtpHandle::discover_with_config(&config).unwrap();
    assert_eq!(
        observer.clock_identity().unwrap(),
        handle.clock_identity().unwrap()
    );
}
