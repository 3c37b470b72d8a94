use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::protocol::ptp::timestamp::PtpTimestamp;

#[test]
fn test_new_clamps_nanoseconds() {
    let ts = PtpTimestamp::new(10, 2_000_000_000);
    assert_eq!(ts.seconds, 10);
    assert_eq!(ts.nanoseconds, PtpTimestamp::NANOS_PER_SEC - 1);
}

#[test]
fn test_now_is_recent() {
    let ts = PtpTimestamp::now();
    // 2020-01-01
    assert!(ts.seconds > 1_577_836_800, "Timestamp too old: {ts}");
    assert!(ts.nanoseconds < PtpTimestamp::NANOS_PER_SEC);
}

#[test]
fn test_from_system_time() {
    let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
    assert_eq!(
        PtpTimestamp::from(time),
        PtpTimestamp::new(1_700_000_000, 123_456_789)
    );
}

#[test]
fn test_before_epoch_is_zero() {
    let time = UNIX_EPOCH - Duration::from_secs(5);
    assert_eq!(PtpTimestamp::from_system_time(time), PtpTimestamp::default());
    assert!(SystemTime::now() > time);
}

#[test]
fn test_encode_layout() {
    let ts = PtpTimestamp::new(1, 0x0102_0304);
    assert_eq!(
        ts.encode_ieee1588(),
        [0, 0, 0, 0, 0, 1, 0x01, 0x02, 0x03, 0x04]
    );
}

#[test]
fn test_encode_drops_seconds_above_48_bits() {
    let ts = PtpTimestamp::new(0xFFFF_0000_0000_0001, 0);
    let decoded = PtpTimestamp::decode_ieee1588(&ts.encode_ieee1588()).unwrap();
    assert_eq!(decoded.seconds, 1);
}

#[test]
fn test_decode_largest_value() {
    let ts = PtpTimestamp::new(PtpTimestamp::MAX_SECONDS_48BIT, 999_999_999);
    let decoded = PtpTimestamp::decode_ieee1588(&ts.encode_ieee1588()).unwrap();
    assert_eq!(decoded, ts);
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let mut wire = PtpTimestamp::new(7, 8).encode_ieee1588().to_vec();
    wire.extend_from_slice(&[0xAA, 0xBB]);
    assert_eq!(
        PtpTimestamp::decode_ieee1588(&wire),
        Some(PtpTimestamp::new(7, 8))
    );
}

#[test]
fn test_decode_too_short() {
    assert!(PtpTimestamp::decode_ieee1588(&[0u8; 9]).is_none());
}

#[test]
fn test_display_pads_nanoseconds() {
    assert_eq!(PtpTimestamp::new(12, 34).to_string(), "12.000000034");
}
