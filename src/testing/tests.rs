use super::*;

#[test]
fn test_unique_beacon_names_differ() {
    let a = unique_beacon_name("x");
    let b = unique_beacon_name("x");
    assert_ne!(a, b);
    assert!(a.starts_with("/airptp-test-x-"));
    assert!(!a[1..].contains('/'));
}

#[test]
fn test_recording_gateway_counts_init() {
    let (mut gateway, stats) = RecordingGateway::new();
    gateway.init(0xFFFF_0000_0000_0009).unwrap();
    assert_eq!(stats.inits(), 1);
    assert_eq!(stats.clock_identity(), 0xFFFF_0000_0000_0009);
}

#[test]
fn test_failing_init_reports_error() {
    let (mut gateway, stats) = RecordingGateway::failing_init();
    assert!(gateway.init(1).is_err());
    assert_eq!(stats.inits(), 1);
}

#[test]
fn test_scripted_slave_count_is_queried() {
    let (gateway, stats) = RecordingGateway::new();
    assert_eq!(gateway.slave_count(), 0);
    stats.set_slaves(2);
    assert_eq!(gateway.slave_count(), 2);
    assert_eq!(stats.slave_queries(), 2);
}

#[test]
fn test_recording_callbacks_capture_thread_name() {
    let callbacks = Arc::new(RecordingCallbacks::default());
    let inner = Arc::clone(&callbacks);
    std::thread::Builder::new()
        .name("named".to_string())
        .spawn(move || {
            inner.thread_name_set("airptp");
            inner.log_message("hello");
        })
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(
        callbacks.thread_names(),
        vec![("airptp".to_string(), Some("named".to_string()))]
    );
    assert_eq!(callbacks.messages(), vec!["hello".to_string()]);
}
