//! Byte-at-a-time incremental decoder with header resync.
//!
//! Generalized from the teacher's `FrameDecoder::feed()` (which buffers a
//! byte slice and returns completed length-prefixed frames) to a strict
//! byte-wise state machine, since this wire format needs resync-on-header-
//! mismatch rather than length-prefix buffering.

use crate::constants::{HEADER_SYNC, MAX_PAYLOAD_SIZE, RESET_TIMEOUT};
use crate::packet::{Packet, PacketType};

/// Incremental, resyncing packet decoder. Feed it one byte at a time.
pub struct PacketFactory {
    current_byte: usize,
    header: [u8; 3],
    packet_type: u8,
    packet_id: u8,
    payload_size: usize,
    payload: Vec<u8>,
    checksum: Option<u8>,
    resets_since_success: u32,
}

impl Default for PacketFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFactory {
    /// Start a fresh factory at byte position 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_byte: 0,
            header: [0; 3],
            packet_type: 0,
            packet_id: 0,
            payload_size: 0,
            payload: Vec::new(),
            checksum: None,
            resets_since_success: 0,
        }
    }

    fn reset_for_resync(&mut self) {
        self.current_byte = 0;
        self.payload.clear();
        self.checksum = None;
        self.resets_since_success = self.resets_since_success.saturating_add(1);
    }

    /// Feed one byte. Returns `true` once [`Self::is_ready`] becomes true;
    /// the caller must then call [`Self::take`] and discard this factory.
    pub fn push_byte(&mut self, byte: u8) -> bool {
        if self.checksum.is_some() {
            // Already complete; callers must have discarded us. Treat any
            // further feed as the start of a new resync scan defensively.
            self.reset_for_resync();
        }

        match self.current_byte {
            0..=2 => {
                if byte == HEADER_SYNC[self.current_byte] {
                    self.header[self.current_byte] = byte;
                    self.current_byte += 1;
                } else {
                    // Header mismatch: discard progress and rescan. If this
                    // byte itself matches position 0, restart there instead
                    // of losing it.
                    self.reset_for_resync();
                    if byte == HEADER_SYNC[0] {
                        self.header[0] = byte;
                        self.current_byte = 1;
                    }
                }
            }
            3 => {
                self.packet_type = byte;
                self.current_byte += 1;
            }
            4 => {
                self.packet_id = byte;
                self.current_byte += 1;
            }
            5 => {
                self.payload_size = byte as usize;
                self.payload.reserve_exact(self.payload_size);
                self.current_byte += 1;
            }
            n if n < 6 + self.payload_size => {
                self.payload.push(byte);
                self.current_byte += 1;
            }
            _ => {
                self.checksum = Some(byte);
                self.current_byte += 1;
            }
        }

        self.is_ready()
    }

    /// Checksum byte assigned and it validates against the accumulated bytes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self.checksum {
            Some(0) => false,
            Some(cksum) => cksum == self.computed_checksum(),
            None => false,
        }
    }

    /// Too many resyncs without a successful packet.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        !self.is_ready() && self.resets_since_success >= RESET_TIMEOUT
    }

    /// Resync attempts observed since the last successfully completed packet.
    #[must_use]
    pub fn resets_since_success(&self) -> u32 {
        self.resets_since_success
    }

    fn computed_checksum(&self) -> u8 {
        let mut sum: u8 = 0;
        for b in self.header {
            sum = sum.wrapping_add(b);
        }
        sum = sum.wrapping_add(self.packet_type);
        sum = sum.wrapping_add(self.packet_id);
        sum = sum.wrapping_add(self.payload_size as u8);
        for b in &self.payload {
            sum = sum.wrapping_add(*b);
        }
        sum
    }

    /// Consume the factory into a validated [`Packet`]. Only meaningful once
    /// [`Self::is_ready`] is true.
    #[must_use]
    pub fn take(self) -> Option<Packet> {
        if !self.is_ready() {
            return None;
        }
        let packet_type = PacketType::from_u8(self.packet_type)?;
        if self.payload_size as u8 > MAX_PAYLOAD_SIZE {
            return None;
        }
        Some(Packet::new(packet_type, self.packet_id, self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Opcode;

    fn feed_all(factory: &mut PacketFactory, bytes: &[u8]) -> Option<Packet> {
        for &b in bytes {
            if factory.push_byte(b) {
                return std::mem::replace(factory, PacketFactory::new()).take();
            }
        }
        None
    }

    #[test]
    fn decodes_clean_handshake_packet() {
        let p = Packet::transaction(0, Opcode::Initial);
        let bytes = p.to_bytes();
        let mut factory = PacketFactory::new();
        let decoded = feed_all(&mut factory, &bytes).expect("packet should complete");
        assert_eq!(decoded, p);
    }

    #[test]
    fn resyncs_past_leading_garbage() {
        // S3-style: junk bytes, then a valid stream packet.
        let p = Packet::new(crate::packet::PacketType::Stream, 7, vec![0, 0, 0, 0, 0, 0]);
        let mut wire = vec![0xFF, 0xFF];
        wire.extend(p.to_bytes());

        let mut factory = PacketFactory::new();
        let decoded = feed_all(&mut factory, &wire).expect("packet should complete after resync");
        assert_eq!(decoded, p);
    }

    #[test]
    fn zero_checksum_byte_never_ready() {
        // A packet whose checksum byte is literally 0 must never be ready,
        // regardless of whether the sum would otherwise validate.
        let mut factory = PacketFactory::new();
        let bytes = [HEADER_SYNC[0], HEADER_SYNC[1], HEADER_SYNC[2], 1, 0, 0, 0];
        for &b in &bytes {
            factory.push_byte(b);
        }
        assert!(!factory.is_ready());
    }

    #[test]
    fn is_failed_after_reset_timeout_garbage() {
        let mut factory = PacketFactory::new();
        for _ in 0..(RESET_TIMEOUT + 1) {
            factory.push_byte(0xFF);
        }
        assert!(factory.is_failed());
    }

    #[test]
    fn bad_checksum_is_rejected_without_consuming_next_header() {
        let p = Packet::transaction(3, Opcode::Keepalive);
        let mut bytes = p.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1); // corrupt checksum

        let mut factory = PacketFactory::new();
        for &b in &bytes {
            factory.push_byte(b);
        }
        assert!(!factory.is_ready());
    }
}
