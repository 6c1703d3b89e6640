//! Serial port abstraction.
//!
//! Grounded on `other_examples`' sds011 driver, the only pack file that talks
//! to a physical serial device via the `serialport` crate.

use crate::constants::{BAUD_RATE, MAX_TIMEOUT, WRITE_TIMEOUT};
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Minimal interface the rest of the crate needs from a serial connection.
/// Implemented for a real `serialport` handle and for an in-memory loopback
/// double used in tests.
pub trait SerialLink: Send {
    /// Read exactly one byte, blocking up to the link's read timeout.
    /// `Ok(None)` means the timeout elapsed with no byte available.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Write the full buffer, blocking up to the link's write timeout.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Discard any buffered input and output bytes.
    fn discard_buffers(&mut self) -> Result<()>;
}

/// A `serialport`-backed link at the protocol's fixed `115200 8N1` settings.
pub struct SerialPortLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPortLink {
    /// Open `path` at the protocol's fixed settings (`115200 8N1`, write
    /// timeout 500 ms, read timeout 5000 ms).
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(MAX_TIMEOUT)
            .open()?;
        let mut link = Self { port };
        link.port.set_timeout(WRITE_TIMEOUT).ok();
        Ok(link)
    }

    /// Enumerate candidate serial ports for `connect()` to try in order.
    pub fn available_ports() -> Result<Vec<String>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl SerialLink for SerialPortLink {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read_exact(&mut buf) {
            Ok(()) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port
            .set_timeout(WRITE_TIMEOUT)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Write::write_all(&mut self.port, buf).map_err(Error::Io)?;
        self.port
            .set_timeout(MAX_TIMEOUT)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }

    fn discard_buffers(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

/// An in-memory loopback serial double: bytes written are immediately
/// available to be read back, FIFO. Used by scenario tests (S1-S6) in lieu
/// of a physical device.
pub struct LoopbackPort {
    inbound: std::collections::VecDeque<u8>,
    pub written: Vec<u8>,
    /// If set, `read_byte` returns this error once, then clears it.
    pub next_error: Option<std::io::ErrorKind>,
}

impl Default for LoopbackPort {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackPort {
    /// Build an empty loopback port.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inbound: std::collections::VecDeque::new(),
            written: Vec::new(),
            next_error: None,
        }
    }

    /// Queue bytes to be returned by future `read_byte` calls, e.g. to
    /// simulate a device echoing the handshake or streaming samples.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }
}

impl SerialLink for LoopbackPort {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        if let Some(kind) = self.next_error.take() {
            return Err(Error::Io(std::io::Error::new(kind, "simulated failure")));
        }
        Ok(self.inbound.pop_front())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn discard_buffers(&mut self) -> Result<()> {
        self.inbound.clear();
        self.written.clear();
        Ok(())
    }
}

/// A shared, mutex-guarded handle to the active link.
///
/// Grounded on `broker/connection.rs`'s write-mutex around its `UnixStream`;
/// generalized here to guard the whole link (read included) rather than
/// splitting reader/writer file descriptors, since the test double cannot
/// portably clone into independent halves. This is strictly safe with
/// respect to spec §5's "single writer at a time... single reader" resource
/// model (only one holder of any kind at a time is a stronger guarantee),
/// at the cost of a writer occasionally waiting out a Listener read that is
/// mid-timeout; acceptable given `MIN_TIMEOUT`-scale polling elsewhere.
#[derive(Clone)]
pub struct LinkHandle(Arc<Mutex<Box<dyn SerialLink>>>);

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle").finish_non_exhaustive()
    }
}

impl LinkHandle {
    /// Wrap a link implementation for sharing across tasks.
    #[must_use]
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self(Arc::new(Mutex::new(link)))
    }

    /// Read one byte under the shared lock.
    pub fn read_byte(&self) -> Result<Option<u8>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).read_byte()
    }

    /// Write a full buffer under the shared lock.
    pub fn write_all(&self, buf: &[u8]) -> Result<()> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).write_all(buf)
    }

    /// Discard buffered input/output under the shared lock.
    pub fn discard_buffers(&self) -> Result<()> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).discard_buffers()
    }
}
