//! Byte-level transport to the radio module
//!
//! The handshake and the session loops talk to a [`Transport`] rather than
//! to a serial port directly, so they can be driven by a scripted transport
//! in tests.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use super::TransportError;

/// Abstraction over the serial link
pub trait Transport: Read + Write + Send {
    /// Set the timeout applied to each read
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Get number of bytes available to read
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Transport handle shared between the session loops
///
/// Every write happens under the lock. A handshake keeps the lock for the
/// whole INQ/ACK/telegram exchange. The serial reader takes the lock only
/// through [`SharedTransport::lock_for_read`], which yields to any writer
/// already waiting, so a tight read loop cannot starve writers.
#[derive(Clone)]
pub struct SharedTransport {
    inner: Arc<Mutex<Box<dyn Transport>>>,
    waiting_writers: Arc<AtomicUsize>,
}

impl SharedTransport {
    /// Share `transport` between the session loops
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
            waiting_writers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take exclusive access, waiting as long as needed
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Transport>>, TransportError> {
        self.waiting_writers.fetch_add(1, Ordering::SeqCst);
        let guard = self.inner.lock();
        self.waiting_writers.fetch_sub(1, Ordering::SeqCst);
        guard.map_err(|_| TransportError::LockPoisoned)
    }

    /// Take access for a background read, or `None` if a writer is waiting
    pub fn lock_for_read(
        &self,
    ) -> Result<Option<MutexGuard<'_, Box<dyn Transport>>>, TransportError> {
        if self.waiting_writers.load(Ordering::SeqCst) > 0 {
            return Ok(None);
        }
        match self.inner.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(TransportError::LockPoisoned),
        }
    }
}

/// Read a single byte, waiting at most `timeout`
///
/// Returns `Ok(None)` when nothing arrived in time.
pub fn read_byte(transport: &mut dyn Transport, timeout: Duration) -> io::Result<Option<u8>> {
    transport.set_timeout(timeout)?;
    let mut buf = [0u8; 1];
    loop {
        match transport.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e),
        }
    }
}

/// Serial port wrapper implementing Transport
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Port name as reported by the driver
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }
}
