//! Crate-level error taxonomy.
//!
//! Tasks never unwind past their thread boundary (see `tasks::task`); they
//! convert failures into a `TaskOutcome` instead. This enum is for operations
//! that *do* have a caller able to act on the failure: port I/O, framing,
//! device-reported protocol errors, and configuration.

use crate::packet::ErrorKind;
use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong below the public API surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port I/O failure (not a timeout; see [`Error::Timeout`]).
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// The PacketFactory could not resynchronize on the header within the
    /// configured reset budget.
    #[error("framing failure: {resets} resyncs without a valid packet")]
    Framing {
        /// Resync attempts observed before giving up.
        resets: u32,
    },

    /// The device reported a protocol-level failure.
    #[error("device reported protocol error: {0:?}")]
    Protocol(ErrorKind),

    /// A read or handshake attempt exceeded its deadline.
    #[error("timed out waiting for the device")]
    Timeout,

    /// No candidate serial port accepted the handshake.
    #[error("no serial port completed the handshake")]
    NoPortAvailable,

    /// Configuration file could not be loaded, parsed, or persisted.
    #[error("configuration error: {0}")]
    Config(String),
}
