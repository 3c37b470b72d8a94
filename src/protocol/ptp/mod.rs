//! Precision Time Protocol (PTP, IEEE 1588) wire format.
//!
//! ## Standard PTP Ports
//!
//! - **319**: Event messages (Sync, `Delay_Req`) (timestamped).
//! - **320**: General messages (`Follow_Up`, `Delay_Resp`, Announce, Signaling).
//!
//! ## Master Message Flow
//!
//! ```text
//! Master                          Slave
//!   |<---- Signaling --------------- |  (slave asks for unicast service)
//!   |--- Announce ------------------>|
//!   |--- Sync (T1) ----------------->|  (slave records T2)
//!   |--- Follow_Up (precise T1) ---->|
//!   |<---- Delay_Req (T3) ---------- |
//!   |---- Delay_Resp (T4) --------->|
//! ```

pub mod message;
pub mod timestamp;

#[cfg(test)]
mod tests;

/// Standard PTP event port (Sync, `Delay_Req`).
pub const PTP_EVENT_PORT: u16 = 319;

/// Standard PTP general port (`Follow_Up`, `Delay_Resp`, Announce, Signaling).
pub const PTP_GENERAL_PORT: u16 = 320;

// Re-exports for convenient access.
pub use message::{
    ClockQuality, PtpHeader, PtpMessage, PtpMessageBody, PtpMessageType, PtpParseError,
    PtpPortIdentity,
};
pub use timestamp::PtpTimestamp;
