//! Protocol and timing constants.
//!
//! Grouped the way the teacher crate groups its `Duration` constants: one
//! section per concern, no magic numbers duplicated elsewhere in the crate.

use std::time::Duration;

// ─── Wire format ────────────────────────────────────────────────────────────

/// Fixed 3-byte packet header, byte-exact.
pub const HEADER_SYNC: [u8; 3] = [0xAA, 0x01, 0x02];

/// Largest allowed `payloadSize` value.
pub const MAX_PAYLOAD_SIZE: u8 = 249;

// ─── Link timing ────────────────────────────────────────────────────────────

/// Serial read timeout; also the Listener's blocking-read ceiling and the
/// Keepalive period.
pub const MAX_TIMEOUT: Duration = Duration::from_millis(5000);

/// Idle poll sleep used whenever a queue is empty or no bytes are available.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial write timeout.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Baud rate for the serial link.
pub const BAUD_RATE: u32 = 115_200;

/// Upper bound the Supervisor waits for tasks to drain on kill.
pub const KILL_TIMEOUT: Duration = Duration::from_millis(500);

/// Approximate device-side quiescence wait during reconnect.
pub const RECONNECT_QUIESCENCE: Duration = Duration::from_secs(3);

/// Backoff between `sendConnect` handshake attempts.
pub const HANDSHAKE_BACKOFF: Duration = Duration::from_secs(1);

// ─── Retry / failure thresholds ────────────────────────────────────────────

/// Consecutive PacketFactory resets before the Listener declares framing failure.
pub const RESET_TIMEOUT: u32 = 50;

/// Consecutive Listener framing timeouts before the task exits.
pub const TIMEOUT_TIMEOUT: u32 = 3;

/// Consecutive `NotConnected` responses before the Supervisor gives up.
pub const RECONNECT_TIMEOUT: u32 = 3;

/// Handshake attempts in `sendConnect`.
pub const HANDSHAKE_ATTEMPTS: u32 = 3;

// ─── Classifier / signal window ────────────────────────────────────────────

/// Sliding window capacity, in samples.
pub const WINDOW_SIZE: usize = 178;

/// FFT bins used by the classifier.
pub const CLASSIFIER_BINS: usize = 45;

/// Default samples between predictions.
pub const DEFAULT_SAMPLE_RATE: u32 = 2;

/// Default predictions-history capacity.
pub const DEFAULT_PREDICTION_CAPACITY: usize = 5;

/// Fixed classifier intercept; part of the wire-level protocol spec.
pub const CLASSIFIER_INTERCEPT: f64 = -4.204_528_957_411_403;

/// ADC-to-microvolt linear conversion: `raw / 65536 * SCALE + OFFSET`.
pub const MICROVOLT_SCALE: f64 = 3932.0;
/// See [`MICROVOLT_SCALE`].
pub const MICROVOLT_OFFSET: f64 = -1885.003_295_898_437_3;

// ─── Rolling CSV log ────────────────────────────────────────────────────────

/// File size threshold that triggers CSV rotation.
pub const CSV_ROTATE_BYTES: u64 = 2 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_ordered() {
        assert!(MIN_TIMEOUT < WRITE_TIMEOUT);
        assert!(WRITE_TIMEOUT < MAX_TIMEOUT);
        assert!(KILL_TIMEOUT <= MAX_TIMEOUT);
    }

    #[test]
    fn payload_size_fits_declared_range() {
        assert!(MAX_PAYLOAD_SIZE <= 249);
    }

    #[test]
    fn window_and_bins_are_sane() {
        assert!(CLASSIFIER_BINS < WINDOW_SIZE);
        assert!(DEFAULT_PREDICTION_CAPACITY > 0);
    }
}
