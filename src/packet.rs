//! The on-wire [`Packet`] type: `AA 01 02 | type | id | size | payload | checksum`.
//!
//! Adapted from the teacher's length-prefixed frame codec in spirit (build a
//! buffer, compute a trailer, round-trip bytewise) but the wire shape itself
//! is this protocol's own: a fixed 3-byte sync header and a summed checksum
//! trailer rather than a length prefix.

use crate::constants::{HEADER_SYNC, MAX_PAYLOAD_SIZE};
use bytes::{BufMut, BytesMut};

/// The three kinds of packet that travel over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// The device is reporting an error condition.
    Failure = 0,
    /// A command or its acknowledgement.
    Transaction = 1,
    /// A neural-signal sample.
    Stream = 2,
}

impl PacketType {
    /// Decode a raw `packetType` byte, if it names a known variant.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Failure),
            1 => Some(Self::Transaction),
            2 => Some(Self::Stream),
            _ => None,
        }
    }
}

/// First-payload-byte opcode for `Transaction` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Initial handshake.
    Initial = 0x01,
    /// Watchdog keepalive.
    Keepalive = 0x02,
    /// Begin streaming samples.
    StartStream = 0x03,
    /// Stop streaming samples.
    StopStream = 0x04,
    /// Begin therapy (stimulation).
    StartStim = 0x05,
    /// Stop therapy (stimulation).
    StopStim = 0x06,
}

impl Opcode {
    /// Decode a raw opcode byte, if it names a known variant.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Initial),
            0x02 => Some(Self::Keepalive),
            0x03 => Some(Self::StartStream),
            0x04 => Some(Self::StopStream),
            0x05 => Some(Self::StartStim),
            0x06 => Some(Self::StopStim),
            _ => None,
        }
    }
}

/// First-payload-byte error kind for `Failure` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The sum-mod-256 checksum did not match.
    BadChecksum,
    /// `payloadSize` exceeded [`MAX_PAYLOAD_SIZE`].
    TooLong,
    /// `packetType` named an unknown variant.
    BadPackType,
    /// The Transaction opcode was unrecognized.
    BadOpCode,
    /// Advisory: a connect handshake arrived while already connected.
    AlreadyConnected,
    /// Advisory: a `StartStream` arrived while already streaming.
    AlreadyStreaming,
    /// Advisory: a `StopStream` arrived while already stopped.
    AlreadyStopped,
    /// Fatal: the device does not consider the session connected.
    NotConnected,
    /// Advisory: a `StartStim` arrived while therapy was already active.
    AlreadyTherapy,
    /// Advisory: a `StopStim` arrived while therapy was already inactive.
    AlreadyNotTherapy,
}

impl ErrorKind {
    /// Decode a raw error-kind byte, if it names a known variant.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::BadChecksum),
            1 => Some(Self::TooLong),
            2 => Some(Self::BadPackType),
            3 => Some(Self::BadOpCode),
            4 => Some(Self::AlreadyConnected),
            5 => Some(Self::AlreadyStreaming),
            6 => Some(Self::AlreadyStopped),
            7 => Some(Self::NotConnected),
            8 => Some(Self::AlreadyTherapy),
            9 => Some(Self::AlreadyNotTherapy),
            _ => None,
        }
    }

    /// True for error kinds that abort the session and trigger a reconnect.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::BadChecksum | Self::BadOpCode | Self::BadPackType)
    }

    /// True for error kinds that are advisory: reset `*Sent` flags and continue.
    #[must_use]
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            Self::AlreadyConnected
                | Self::AlreadyStreaming
                | Self::AlreadyStopped
                | Self::AlreadyTherapy
                | Self::AlreadyNotTherapy
        )
    }
}

/// A fully framed, checksum-valid packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet category.
    pub packet_type: PacketType,
    /// 8-bit, monotonically increasing per locally-originated packet.
    pub packet_id: u8,
    /// Raw payload bytes (0..=249 long).
    pub payload: Vec<u8>,
}

impl Packet {
    /// Construct a new packet. `payload.len()` must be `<= MAX_PAYLOAD_SIZE`;
    /// this is an internal invariant enforced by callers that build packets
    /// (all payloads here are fixed-size protocol structures), not user input.
    #[must_use]
    pub fn new(packet_type: PacketType, packet_id: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE as usize);
        Self {
            packet_type,
            packet_id,
            payload,
        }
    }

    /// Build a `Transaction` packet carrying a single opcode byte.
    #[must_use]
    pub fn transaction(packet_id: u8, opcode: Opcode) -> Self {
        Self::new(PacketType::Transaction, packet_id, vec![opcode as u8])
    }

    /// Sum-mod-256 checksum of every byte that precedes the checksum byte.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        let mut sum: u8 = 0;
        for b in HEADER_SYNC {
            sum = sum.wrapping_add(b);
        }
        sum = sum.wrapping_add(self.packet_type as u8);
        sum = sum.wrapping_add(self.packet_id);
        sum = sum.wrapping_add(self.payload.len() as u8);
        for b in &self.payload {
            sum = sum.wrapping_add(*b);
        }
        sum
    }

    /// Serialize to the canonical wire representation, trailer included.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(7 + self.payload.len());
        buf.put_slice(&HEADER_SYNC);
        buf.put_u8(self.packet_type as u8);
        buf.put_u8(self.packet_id);
        buf.put_u8(self.payload.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum());
        buf.to_vec()
    }

    /// First payload byte decoded as a `Transaction` opcode, if applicable.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        if self.packet_type != PacketType::Transaction {
            return None;
        }
        self.payload.first().copied().and_then(Opcode::from_u8)
    }

    /// First payload byte decoded as a `Failure` error kind, if applicable.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.packet_type != PacketType::Failure {
            return None;
        }
        self.payload.first().copied().and_then(ErrorKind::from_u8)
    }
}

/// Shared, monotonically-increasing 8-bit packet ID counter.
///
/// Every locally-originated packet (handshake, keepalive, command) draws
/// from this single counter so `packetID` truly increases monotonically
/// per spec §3, regardless of which task wrote the packet.
#[derive(Clone, Default)]
pub struct PacketIdCounter(std::sync::Arc<std::sync::atomic::AtomicU8>);

impl PacketIdCounter {
    /// Build a counter starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicU8::new(0)))
    }

    /// Draw the next ID, wrapping at 256.
    pub fn next(&self) -> u8 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

/// Decoded `Stream` packet payload: device timestamp + raw ADC count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSample {
    /// Device-side tick counter at sample time.
    pub timestamp: u32,
    /// Raw 16-bit ADC reading.
    pub raw: u16,
    /// Converted microvolt value.
    pub microvolts: f64,
}

impl StreamSample {
    /// Decode a 6-byte Stream payload: 32-bit LE timestamp + 16-bit LE raw count.
    ///
    /// Per the design notes, only the 32-bit timestamp variant is implemented;
    /// a historical 64-bit-timestamp decoder is a known defect and is not
    /// reproduced here.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != 6 {
            return None;
        }
        let timestamp = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let raw = u16::from_le_bytes([payload[4], payload[5]]);
        let microvolts = Self::to_microvolts(raw);
        Some(Self {
            timestamp,
            raw,
            microvolts,
        })
    }

    /// Apply the fixed ADC-to-microvolt linear conversion.
    #[must_use]
    pub fn to_microvolts(raw: u16) -> f64 {
        use crate::constants::{MICROVOLT_OFFSET, MICROVOLT_SCALE};
        f64::from(raw) / 65536.0 * MICROVOLT_SCALE + MICROVOLT_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_sum_mod_256() {
        let p = Packet::transaction(1, Opcode::Initial);
        let bytes = p.to_bytes();
        let expected: u8 = bytes[..bytes.len() - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(*bytes.last().unwrap(), expected);
    }

    #[test]
    fn handshake_packet_matches_spec_header_and_body() {
        // S1: host writes AA 01 02 01 00 01 01 <checksum>
        let p = Packet::transaction(0, Opcode::Initial);
        let bytes = p.to_bytes();
        assert_eq!(&bytes[..bytes.len() - 1], &[0xAA, 0x01, 0x02, 0x01, 0x00, 0x01, 0x01]);
        assert_eq!(*bytes.last().unwrap(), p.checksum());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let p = Packet::new(PacketType::Stream, 42, vec![1, 2, 3, 4, 5, 6]);
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), 7 + 6);
        assert_eq!(bytes[3], PacketType::Stream as u8);
        assert_eq!(bytes[4], 42);
        assert_eq!(bytes[5], 6);
    }

    #[test]
    fn stream_sample_decodes_little_endian() {
        let sample = StreamSample::decode(&[0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(sample.timestamp, 0);
        assert_eq!(sample.raw, 0);
        assert!((sample.microvolts - (-1885.0033)).abs() < 1e-3);
    }

    #[test]
    fn stream_sample_rejects_wrong_length() {
        assert!(StreamSample::decode(&[0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn error_kind_fatal_vs_advisory_split() {
        assert!(ErrorKind::BadChecksum.is_fatal());
        assert!(ErrorKind::BadOpCode.is_fatal());
        assert!(ErrorKind::AlreadyConnected.is_advisory());
        assert!(ErrorKind::AlreadyStreaming.is_advisory());
        assert!(!ErrorKind::NotConnected.is_fatal());
        assert!(!ErrorKind::NotConnected.is_advisory());
    }
}
