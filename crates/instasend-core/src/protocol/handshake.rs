//! INQ/ACK handshake
//!
//! Before a telegram may be written the sender asks for the medium with
//! [`INQ`] and waits for [`ACK`]. A busy or absent device answers with
//! something else or not at all, and the telegram is then not sent.
//!
//! ```text
//! Idle --INQ--> AwaitingAck --ACK--> Transmitting --flush--> Complete
//!                   |                     |
//!                   +--> Failed <---------+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use super::transport::read_byte;
use super::{
    HandshakeError, HandshakeFailure, Telegram, Transport, TransportError, ACK,
    DEFAULT_ACK_DEADLINE_MS, DEFAULT_READ_TIMEOUT_MS, INQ,
};

/// Handshake timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Timeout of a single read attempt while waiting for ACK
    pub read_timeout_ms: u64,
    /// Overall deadline for the ACK
    pub ack_deadline_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            ack_deadline_ms: DEFAULT_ACK_DEADLINE_MS,
        }
    }
}

impl HandshakeConfig {
    /// Timeout of a single read attempt
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Overall time allowed for the ACK
    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Idle,
    /// INQ written, waiting for ACK
    AwaitingAck,
    /// ACK received, writing the telegram
    Transmitting,
    /// Telegram written and flushed
    Complete,
    /// The device refused or the write failed
    Failed(HandshakeFailure),
    /// The transport failed while reading; escalated to the caller
    Aborted,
}

impl HandshakeState {
    /// Whether the exchange is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Complete | HandshakeState::Failed(_) | HandshakeState::Aborted
        )
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Idle => write!(f, "idle"),
            HandshakeState::AwaitingAck => write!(f, "awaiting ACK"),
            HandshakeState::Transmitting => write!(f, "transmitting"),
            HandshakeState::Complete => write!(f, "complete"),
            HandshakeState::Failed(reason) => write!(f, "failed ({})", reason),
            HandshakeState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Drives one INQ -> ACK -> telegram exchange
///
/// The caller must hold exclusive access to the transport for the whole
/// exchange so no other reader consumes the ACK and no other writer lands
/// between INQ and the telegram.
#[derive(Debug)]
pub struct Handshake {
    config: HandshakeConfig,
    state: HandshakeState,
}

impl Handshake {
    /// A fresh handshake in the `Idle` state
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
            state: HandshakeState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the exchange for `telegram`
    ///
    /// Nothing is retried: a telegram that failed mid-write is not re-sent.
    pub fn execute(
        &mut self,
        transport: &mut dyn Transport,
        telegram: &Telegram,
    ) -> Result<(), HandshakeError> {
        self.state = HandshakeState::Idle;

        if let Err(e) = write_all_and_flush(transport, &[INQ]) {
            return Err(self.fail(HandshakeFailure::WriteError, Some(e)));
        }
        self.transition(HandshakeState::AwaitingAck);

        self.await_ack(transport)?;
        self.transition(HandshakeState::Transmitting);

        if let Err(e) = write_all_and_flush(transport, telegram.as_bytes()) {
            return Err(self.fail(HandshakeFailure::WriteError, Some(e)));
        }
        self.transition(HandshakeState::Complete);
        tracing::debug!(telegram = %telegram, "telegram sent");
        Ok(())
    }

    fn await_ack(&mut self, transport: &mut dyn Transport) -> Result<(), HandshakeError> {
        let read_timeout = self.config.read_timeout();
        let deadline = Instant::now() + self.config.ack_deadline();

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(HandshakeFailure::Timeout, None));
            }
            let wait = (deadline - now).min(read_timeout);

            match read_byte(transport, wait) {
                Ok(Some(ACK)) => return Ok(()),
                Ok(Some(other)) => {
                    return Err(self.fail(HandshakeFailure::UnexpectedResponse(other), None))
                }
                Ok(None) => {
                    tracing::trace!(waited_ms = wait.as_millis() as u64, "no reply yet");
                }
                Err(e) => {
                    self.transition(HandshakeState::Aborted);
                    return Err(HandshakeError::Transport(TransportError::Io(e)));
                }
            }
        }
    }

    fn transition(&mut self, next: HandshakeState) {
        tracing::debug!(from = %self.state, to = %next, "handshake transition");
        self.state = next;
    }

    fn fail(&mut self, reason: HandshakeFailure, source: Option<std::io::Error>) -> HandshakeError {
        self.transition(HandshakeState::Failed(reason));
        HandshakeError::Failed { reason, source }
    }
}

fn write_all_and_flush(transport: &mut dyn Transport, data: &[u8]) -> std::io::Result<()> {
    transport.write_all(data)?;
    transport.flush()
}
