//! Serial reader loop: serial -> display
//!
//! Every inbound byte is shown as `\xNN`. When the radio polls this side
//! with INQ the loop answers with two ACK bytes while still holding the
//! transport, so the reply cannot be split by another writer.
//!
//! The transport is only held while input is pending. An idle link is
//! polled with [`Transport::bytes_to_read`] so keystrokes are never queued
//! behind a blocking read.

use std::io::Write;
use std::thread;
use std::time::Duration;

use super::{emit, Output, SessionError, StopHandle};
use crate::protocol::transport::read_byte;
use crate::protocol::{FrameScanner, SharedTransport, Transport, TransportError, ACK, INQ};

/// Backoff while a writer holds or waits for the transport
const YIELD_DELAY: Duration = Duration::from_millis(1);

/// Upper bound on the sleep between polls of an idle link
const MAX_IDLE_DELAY: Duration = Duration::from_millis(5);

pub(super) struct ReaderLoop {
    transport: SharedTransport,
    stop: StopHandle,
    output: Output,
    poll: Duration,
    scanner: FrameScanner,
}

impl ReaderLoop {
    pub(super) fn new(
        transport: SharedTransport,
        stop: StopHandle,
        output: Output,
        poll: Duration,
    ) -> Self {
        Self {
            transport,
            stop,
            output,
            poll,
            scanner: FrameScanner::new(),
        }
    }

    /// Read until stopped; a transport failure stops the whole session
    pub(super) fn run(mut self) -> Result<(), SessionError> {
        while self.stop.is_alive() {
            let (byte, acked) = match self.poll_once() {
                Ok(Some(read)) => read,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("serial reader failed: {}", e);
                    self.stop.stop();
                    return Err(e.into());
                }
            };
            self.display(byte, acked)?;
        }
        Ok(())
    }

    /// One bounded read; answers INQ before releasing the transport
    fn poll_once(&mut self) -> Result<Option<(u8, bool)>, TransportError> {
        let Some(mut transport) = self.transport.lock_for_read()? else {
            thread::sleep(YIELD_DELAY);
            return Ok(None);
        };

        if transport.bytes_to_read()? == 0 {
            drop(transport);
            thread::sleep(self.poll.min(MAX_IDLE_DELAY));
            return Ok(None);
        }

        let Some(byte) = read_byte(&mut **transport, self.poll)? else {
            return Ok(None);
        };
        tracing::trace!(byte = format_args!("{:#04x}", byte), "received");

        if byte != INQ {
            return Ok(Some((byte, false)));
        }
        transport.write_all(&[ACK, ACK])?;
        transport.flush()?;
        tracing::debug!("answered INQ with ACK");
        Ok(Some((byte, true)))
    }

    fn display(&mut self, byte: u8, acked: bool) -> Result<(), SessionError> {
        let mut text = format!("\\x{:02x} ", byte);
        if acked {
            text.push_str("ACK\n");
        }
        if let Err(e) = emit(&self.output, text.as_bytes()) {
            self.stop.stop();
            return Err(e);
        }

        match self.scanner.push(byte) {
            Some(Ok(command)) => tracing::info!(command = %command, "received telegram"),
            Some(Err(e)) => tracing::debug!("discarded inbound frame: {}", e),
            None => {}
        }
        Ok(())
    }
}
