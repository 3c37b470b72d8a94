//! Wire timestamps.
//!
//! A PTP timestamp is 10 bytes on the wire: 48-bit seconds followed by
//! 32-bit nanoseconds, both big-endian. The master has no hardware
//! timestamping and reads the system wall clock instead.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds and nanoseconds as carried in Sync, `Follow_Up`, `Delay_Req`
/// and `Delay_Resp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PtpTimestamp {
    /// Seconds since the Unix epoch; only the low 48 bits reach the wire
    pub seconds: u64,
    /// Nanoseconds within the second, below [`Self::NANOS_PER_SEC`]
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    /// Nanoseconds per second.
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Largest seconds value the wire can carry.
    pub const MAX_SECONDS_48BIT: u64 = (1u64 << 48) - 1;

    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 10;

    /// Build a timestamp; nanoseconds past the end of the second are clamped.
    #[must_use]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds: nanoseconds.min(Self::NANOS_PER_SEC - 1),
        }
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a wall-clock instant. Times before the epoch become zero.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        time.duration_since(UNIX_EPOCH)
            .map(|since| Self::new(since.as_secs(), since.subsec_nanos()))
            .unwrap_or_default()
    }

    /// Encode for the wire, dropping seconds above 48 bits.
    #[must_use]
    pub fn encode_ieee1588(&self) -> [u8; Self::WIRE_SIZE] {
        let seconds = (self.seconds & Self::MAX_SECONDS_48BIT).to_be_bytes();
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[..6].copy_from_slice(&seconds[2..]);
        buf[6..].copy_from_slice(&self.nanoseconds.to_be_bytes());
        buf
    }

    /// Decode the first [`Self::WIRE_SIZE`] bytes of `data`, or `None` if
    /// there are fewer.
    #[must_use]
    pub fn decode_ieee1588(data: &[u8]) -> Option<Self> {
        let wire: &[u8; Self::WIRE_SIZE] = data.get(..Self::WIRE_SIZE)?.try_into().ok()?;
        let mut seconds = [0u8; 8];
        seconds[2..].copy_from_slice(&wire[..6]);
        let mut nanoseconds = [0u8; 4];
        nanoseconds.copy_from_slice(&wire[6..]);
        Some(Self {
            seconds: u64::from_be_bytes(seconds),
            nanoseconds: u32::from_be_bytes(nanoseconds),
        })
    }
}

impl From<SystemTime> for PtpTimestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl fmt::Display for PtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}
