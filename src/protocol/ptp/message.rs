//! PTP message types, parsing, and encoding.
//!
//! IEEE 1588-2008 (v2) framing for the messages a master exchanges with
//! `AirPlay` receivers: Sync, `Delay_Req`, `Follow_Up`, `Delay_Resp`,
//! Announce and Signaling. Every message is a 34-byte common header
//! followed by a type-specific body, all fields big-endian.

use std::fmt;

use super::timestamp::PtpTimestamp;
use crate::net::ServiceKind;

/// PTP message type identifiers (IEEE 1588 Section 13.3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PtpMessageType {
    /// Sync message (master → slave), carries T1.
    Sync = 0x00,
    /// Delay request (slave → master), sent at T3.
    DelayReq = 0x01,
    /// Follow-up (master → slave), carries precise T1.
    FollowUp = 0x08,
    /// Delay response (master → slave), carries T4.
    DelayResp = 0x09,
    /// Announce (master → slave), clock properties.
    Announce = 0x0B,
    /// Signaling, used by receivers to request unicast service.
    Signaling = 0x0C,
}

impl PtpMessageType {
    /// Parse from the lower 4 bits of a byte; the upper bits carry
    /// `transportSpecific` and are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PtpParseError::UnknownMessageType`] for types this crate
    /// does not handle.
    pub fn from_nibble(value: u8) -> Result<Self, PtpParseError> {
        match value & 0x0F {
            0x00 => Ok(Self::Sync),
            0x01 => Ok(Self::DelayReq),
            0x08 => Ok(Self::FollowUp),
            0x09 => Ok(Self::DelayResp),
            0x0B => Ok(Self::Announce),
            0x0C => Ok(Self::Signaling),
            other => Err(PtpParseError::UnknownMessageType(other)),
        }
    }

    /// Port this message type travels on: event messages are timestamped
    /// and use 319, everything else uses 320.
    #[must_use]
    pub fn service(self) -> ServiceKind {
        match self {
            Self::Sync | Self::DelayReq => ServiceKind::Event,
            Self::FollowUp | Self::DelayResp | Self::Announce | Self::Signaling => {
                ServiceKind::General
            }
        }
    }

    /// Deprecated v1 control field value for this message type.
    #[must_use]
    pub fn control_field(self) -> u8 {
        match self {
            Self::Sync => 0x00,
            Self::DelayReq => 0x01,
            Self::FollowUp => 0x02,
            Self::DelayResp => 0x03,
            Self::Announce | Self::Signaling => 0x05,
        }
    }

    fn body_size(self) -> usize {
        match self {
            Self::Sync | Self::DelayReq | Self::FollowUp => PtpTimestamp::WIRE_SIZE,
            Self::DelayResp => PtpTimestamp::WIRE_SIZE + PtpPortIdentity::SIZE,
            Self::Announce => 30,
            Self::Signaling => PtpPortIdentity::SIZE,
        }
    }
}

impl fmt::Display for PtpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "Sync",
            Self::DelayReq => "Delay_Req",
            Self::FollowUp => "Follow_Up",
            Self::DelayResp => "Delay_Resp",
            Self::Announce => "Announce",
            Self::Signaling => "Signaling",
        })
    }
}

/// PTP port identity: 8-byte clock ID + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PtpPortIdentity {
    /// 8-byte clock identity.
    pub clock_identity: u64,
    /// Port number (1-based).
    pub port_number: u16,
}

impl PtpPortIdentity {
    /// Wire size in bytes.
    pub const SIZE: usize = 10;

    /// Wildcard identity addressing every port of every clock.
    pub const ALL: Self = Self {
        clock_identity: u64::MAX,
        port_number: u16::MAX,
    };

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: u64, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Encode as 10 bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..8].copy_from_slice(&self.clock_identity.to_be_bytes());
        buf[8..].copy_from_slice(&self.port_number.to_be_bytes());
        buf
    }

    /// Decode the first 10 bytes of `data`.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut reader = WireReader::new(data);
        reader.port_identity()
    }
}

/// Grandmaster clock quality carried in Announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockQuality {
    /// Clock class (248 = default, not synchronized to a primary reference).
    pub clock_class: u8,
    /// Clock accuracy enumeration (0xFE = unknown).
    pub clock_accuracy: u8,
    /// Scaled log variance (0xFFFF = not computed).
    pub offset_scaled_log_variance: u16,
}

impl Default for ClockQuality {
    fn default() -> Self {
        Self {
            clock_class: 248,
            clock_accuracy: 0xFE,
            offset_scaled_log_variance: 0xFFFF,
        }
    }
}

/// Common 34-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpHeader {
    /// Transport-specific nibble (upper 4 bits of byte 0).
    pub transport_specific: u8,
    /// Message type (lower 4 bits of byte 0).
    pub message_type: PtpMessageType,
    /// PTP version, always 2 once decoded.
    pub version: u8,
    /// Total message length including header, as received.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Flags field.
    pub flags: u16,
    /// Correction field (nanoseconds * 2^16, signed).
    pub correction_field: i64,
    /// Source port identity.
    pub source_port_identity: PtpPortIdentity,
    /// Sequence ID.
    pub sequence_id: u16,
    /// Control field (deprecated in v2, but still present).
    pub control_field: u8,
    /// Log message interval.
    pub log_message_interval: i8,
}

impl PtpHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 34;

    /// The only version this crate speaks.
    pub const PTP_VERSION_2: u8 = 2;

    /// Flag: a `Follow_Up` carries the precise origin timestamp.
    pub const FLAG_TWO_STEP: u16 = 0x0200;

    /// Flag: the timescale is PTP.
    pub const FLAG_PTP_TIMESCALE: u16 = 0x0008;

    /// Header for a new outgoing message with the fixed body length of
    /// `message_type`.
    #[must_use]
    pub fn new(message_type: PtpMessageType, source: PtpPortIdentity, sequence_id: u16) -> Self {
        Self {
            transport_specific: 0,
            message_type,
            version: Self::PTP_VERSION_2,
            message_length: Self::total_length(message_type.body_size()),
            domain_number: 0,
            flags: 0,
            correction_field: 0,
            source_port_identity: source,
            sequence_id,
            control_field: message_type.control_field(),
            log_message_interval: 0,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "PTP bodies are bounded far below u16::MAX"
    )]
    fn total_length(body_length: usize) -> u16 {
        (Self::SIZE + body_length) as u16
    }

    /// Whether the two-step flag is set.
    #[must_use]
    pub fn is_two_step(&self) -> bool {
        self.flags & Self::FLAG_TWO_STEP != 0
    }

    /// Encode to 34 bytes for a message whose body is `body_length` long.
    ///
    /// The length written is always derived from `body_length`.
    #[must_use]
    pub fn encode(&self, body_length: usize) -> [u8; Self::SIZE] {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.push((self.transport_specific << 4) | (self.message_type as u8 & 0x0F));
        out.push(self.version & 0x0F);
        out.extend_from_slice(&Self::total_length(body_length).to_be_bytes());
        out.push(self.domain_number);
        out.push(0);
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.correction_field.to_be_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&self.source_port_identity.encode());
        out.extend_from_slice(&self.sequence_id.to_be_bytes());
        out.push(self.control_field);
        out.extend_from_slice(&self.log_message_interval.to_be_bytes());

        let mut buf = [0u8; Self::SIZE];
        buf.copy_from_slice(&out);
        buf
    }

    /// Decode the header at the start of `data`.
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, an unknown message type or a version other
    /// than 2.
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        let mut reader = WireReader::new(data);
        Self::read(&mut reader).ok_or(PtpParseError::TooShort {
            needed: Self::SIZE,
            have: data.len(),
        })?
    }

    fn read(reader: &mut WireReader<'_>) -> Option<Result<Self, PtpParseError>> {
        if reader.remaining() < Self::SIZE {
            return None;
        }
        let first = reader.u8()?;
        let message_type = match PtpMessageType::from_nibble(first) {
            Ok(message_type) => message_type,
            Err(e) => return Some(Err(e)),
        };
        let version = reader.u8()? & 0x0F;
        if version != Self::PTP_VERSION_2 {
            return Some(Err(PtpParseError::UnsupportedVersion(version)));
        }
        let message_length = reader.u16()?;
        let domain_number = reader.u8()?;
        reader.skip(1)?;
        let flags = reader.u16()?;
        let correction_field = reader.i64()?;
        reader.skip(4)?;

        Some(Ok(Self {
            transport_specific: first >> 4,
            message_type,
            version,
            message_length,
            domain_number,
            flags,
            correction_field,
            source_port_identity: reader.port_identity()?,
            sequence_id: reader.u16()?,
            control_field: reader.u8()?,
            log_message_interval: reader.i8()?,
        }))
    }
}

/// A parsed PTP message with header and typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpMessage {
    /// Message header.
    pub header: PtpHeader,
    /// Message body.
    pub body: PtpMessageBody,
}

/// PTP message body variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtpMessageBody {
    /// Sync: origin timestamp (approximate when two-step).
    Sync {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Follow-up: precise origin timestamp (T1).
    FollowUp {
        /// Precise origin timestamp from the associated Sync.
        precise_origin_timestamp: PtpTimestamp,
    },
    /// Delay request: origin timestamp (T3).
    DelayReq {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Delay response: receive timestamp (T4) and requesting port identity.
    DelayResp {
        /// When the master received the `Delay_Req`.
        receive_timestamp: PtpTimestamp,
        /// Port identity of the requester.
        requesting_port_identity: PtpPortIdentity,
    },
    /// Announce: grandmaster properties.
    Announce {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
        /// Current UTC offset in seconds.
        current_utc_offset: i16,
        /// Grandmaster priority1 (lower = better).
        grandmaster_priority1: u8,
        /// Grandmaster clock quality.
        grandmaster_clock_quality: ClockQuality,
        /// Grandmaster priority2 (lower = better).
        grandmaster_priority2: u8,
        /// Grandmaster clock identity.
        grandmaster_identity: u64,
        /// Steps removed from the grandmaster.
        steps_removed: u16,
        /// Time source enumeration (0xA0 = internal oscillator).
        time_source: u8,
    },
    /// Signaling: target port identity followed by raw TLVs.
    Signaling {
        /// Port the signaling is addressed to.
        target_port_identity: PtpPortIdentity,
        /// Undecoded TLV bytes.
        tlvs: Vec<u8>,
    },
}

impl PtpMessageBody {
    fn read(kind: PtpMessageType, reader: &mut WireReader<'_>) -> Option<Self> {
        let body = match kind {
            PtpMessageType::Sync => Self::Sync {
                origin_timestamp: reader.timestamp()?,
            },
            PtpMessageType::FollowUp => Self::FollowUp {
                precise_origin_timestamp: reader.timestamp()?,
            },
            PtpMessageType::DelayReq => Self::DelayReq {
                origin_timestamp: reader.timestamp()?,
            },
            PtpMessageType::DelayResp => Self::DelayResp {
                receive_timestamp: reader.timestamp()?,
                requesting_port_identity: reader.port_identity()?,
            },
            PtpMessageType::Announce => {
                let origin_timestamp = reader.timestamp()?;
                let current_utc_offset = reader.i16()?;
                reader.skip(1)?;
                Self::Announce {
                    origin_timestamp,
                    current_utc_offset,
                    grandmaster_priority1: reader.u8()?,
                    grandmaster_clock_quality: ClockQuality {
                        clock_class: reader.u8()?,
                        clock_accuracy: reader.u8()?,
                        offset_scaled_log_variance: reader.u16()?,
                    },
                    grandmaster_priority2: reader.u8()?,
                    grandmaster_identity: reader.u64()?,
                    steps_removed: reader.u16()?,
                    time_source: reader.u8()?,
                }
            }
            PtpMessageType::Signaling => Self::Signaling {
                target_port_identity: reader.port_identity()?,
                tlvs: reader.rest().to_vec(),
            },
        };
        Some(body)
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Sync { origin_timestamp }
            | Self::FollowUp {
                precise_origin_timestamp: origin_timestamp,
            }
            | Self::DelayReq { origin_timestamp } => {
                out.extend_from_slice(&origin_timestamp.encode_ieee1588());
            }
            Self::DelayResp {
                receive_timestamp,
                requesting_port_identity,
            } => {
                out.extend_from_slice(&receive_timestamp.encode_ieee1588());
                out.extend_from_slice(&requesting_port_identity.encode());
            }
            Self::Announce {
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality: quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            } => {
                out.extend_from_slice(&origin_timestamp.encode_ieee1588());
                out.extend_from_slice(&current_utc_offset.to_be_bytes());
                out.extend_from_slice(&[0, *grandmaster_priority1]);
                out.extend_from_slice(&[quality.clock_class, quality.clock_accuracy]);
                out.extend_from_slice(&quality.offset_scaled_log_variance.to_be_bytes());
                out.push(*grandmaster_priority2);
                out.extend_from_slice(&grandmaster_identity.to_be_bytes());
                out.extend_from_slice(&steps_removed.to_be_bytes());
                out.push(*time_source);
            }
            Self::Signaling {
                target_port_identity,
                tlvs,
            } => {
                out.extend_from_slice(&target_port_identity.encode());
                out.extend_from_slice(tlvs);
            }
        }
    }
}

impl PtpMessage {
    /// Parse a complete PTP message.
    ///
    /// Bytes beyond the fixed body are ignored, except for Signaling where
    /// they are kept as TLVs.
    ///
    /// # Errors
    ///
    /// Fails if the header is invalid or the body is shorter than its type
    /// requires.
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        let header = PtpHeader::decode(data)?;
        let kind = header.message_type;
        let mut reader = WireReader::new(&data[PtpHeader::SIZE..]);
        let body = PtpMessageBody::read(kind, &mut reader).ok_or(PtpParseError::TooShort {
            needed: PtpHeader::SIZE + kind.body_size(),
            have: data.len(),
        })?;
        Ok(Self { header, body })
    }

    /// Encode to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.header.message_type.body_size());
        self.body.write(&mut body);

        let mut buf = Vec::with_capacity(PtpHeader::SIZE + body.len());
        buf.extend_from_slice(&self.header.encode(body.len()));
        buf.extend_from_slice(&body);
        buf
    }

    /// Create a two-step Sync message.
    #[must_use]
    pub fn sync(source: PtpPortIdentity, sequence_id: u16, timestamp: PtpTimestamp) -> Self {
        let mut header = PtpHeader::new(PtpMessageType::Sync, source, sequence_id);
        header.flags = PtpHeader::FLAG_TWO_STEP;
        Self {
            header,
            body: PtpMessageBody::Sync {
                origin_timestamp: timestamp,
            },
        }
    }

    /// Create the `Follow_Up` for the Sync with the same `sequence_id`.
    #[must_use]
    pub fn follow_up(
        source: PtpPortIdentity,
        sequence_id: u16,
        precise_timestamp: PtpTimestamp,
    ) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::FollowUp, source, sequence_id),
            body: PtpMessageBody::FollowUp {
                precise_origin_timestamp: precise_timestamp,
            },
        }
    }

    /// Create a `Delay_Req`.
    #[must_use]
    pub fn delay_req(source: PtpPortIdentity, sequence_id: u16, timestamp: PtpTimestamp) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::DelayReq, source, sequence_id),
            body: PtpMessageBody::DelayReq {
                origin_timestamp: timestamp,
            },
        }
    }

    /// Create a `Delay_Resp` answering `requesting_port`.
    #[must_use]
    pub fn delay_resp(
        source: PtpPortIdentity,
        sequence_id: u16,
        receive_timestamp: PtpTimestamp,
        requesting_port: PtpPortIdentity,
    ) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::DelayResp, source, sequence_id),
            body: PtpMessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity: requesting_port,
            },
        }
    }

    /// Create an Announce message naming `source` as grandmaster.
    #[must_use]
    pub fn announce(source: PtpPortIdentity, sequence_id: u16, priority1: u8, priority2: u8) -> Self {
        let mut header = PtpHeader::new(PtpMessageType::Announce, source, sequence_id);
        header.flags = PtpHeader::FLAG_PTP_TIMESCALE;
        Self {
            header,
            body: PtpMessageBody::Announce {
                origin_timestamp: PtpTimestamp::now(),
                current_utc_offset: 0,
                grandmaster_priority1: priority1,
                grandmaster_clock_quality: ClockQuality::default(),
                grandmaster_priority2: priority2,
                grandmaster_identity: source.clock_identity,
                steps_removed: 0,
                time_source: 0xA0,
            },
        }
    }

    /// Create a Signaling message without TLVs.
    #[must_use]
    pub fn signaling(source: PtpPortIdentity, sequence_id: u16, target: PtpPortIdentity) -> Self {
        Self::signaling_with_tlvs(source, sequence_id, target, Vec::new())
    }

    /// Create a Signaling message carrying already encoded `tlvs`.
    #[must_use]
    pub fn signaling_with_tlvs(
        source: PtpPortIdentity,
        sequence_id: u16,
        target: PtpPortIdentity,
        tlvs: Vec<u8>,
    ) -> Self {
        let mut header = PtpHeader::new(PtpMessageType::Signaling, source, sequence_id);
        header.message_length = PtpHeader::total_length(PtpPortIdentity::SIZE + tlvs.len());
        Self {
            header,
            body: PtpMessageBody::Signaling {
                target_port_identity: target,
                tlvs,
            },
        }
    }
}

/// Big-endian cursor over a received datagram.
struct WireReader<'a> {
    data: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let (head, rest) = self.data.split_first_chunk::<N>()?;
        self.data = rest;
        Some(*head)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.data = self.data.get(n..)?;
        Some(())
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn i8(&mut self) -> Option<i8> {
        self.take().map(i8::from_be_bytes)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_be_bytes)
    }

    fn i16(&mut self) -> Option<i16> {
        self.take().map(i16::from_be_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_be_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take().map(i64::from_be_bytes)
    }

    fn timestamp(&mut self) -> Option<PtpTimestamp> {
        let wire = self.take::<{ PtpTimestamp::WIRE_SIZE }>()?;
        PtpTimestamp::decode_ieee1588(&wire)
    }

    fn port_identity(&mut self) -> Option<PtpPortIdentity> {
        Some(PtpPortIdentity::new(self.u64()?, self.u16()?))
    }
}

/// Errors from PTP message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PtpParseError {
    /// Packet too short.
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// Unknown message type.
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),
    /// Not a PTPv2 message.
    #[error("unsupported PTP version: {0}")]
    UnsupportedVersion(u8),
}
