//! Protocol errors

use thiserror::Error;

/// Errors raised while parsing a user command string such as `a4on`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Nothing but whitespace was given
    #[error("Empty command")]
    Empty,

    /// Fewer than group, channel and action
    #[error("Command too short: '{0}' (expected group, channel and on/off)")]
    TooShort(String),

    /// Group letter other than a, b or c
    #[error("Invalid group '{0}': expected a, b or c")]
    InvalidGroup(char),

    /// Channel character other than 1-8
    #[error("Invalid channel '{0}': expected a digit 1-8")]
    InvalidChannel(char),

    /// Numeric channel outside 1-8
    #[error("Channel {0} out of range: expected 1-8")]
    ChannelOutOfRange(u8),

    /// Suffix other than `on` or `off`
    #[error("Invalid action '{0}': expected 'on' or 'off'")]
    InvalidAction(String),
}

/// Errors raised while validating a received telegram
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    /// Not exactly 12 bytes
    #[error("Invalid telegram length: expected 12 bytes, got {0}")]
    InvalidLength(usize),

    /// First three bytes are not `55 16 00`
    #[error("Invalid telegram header: {0:02x?}")]
    InvalidHeader([u8; 3]),

    /// Last byte is not `AA`
    #[error("Invalid telegram terminator: {0:#04x}")]
    InvalidTerminator(u8),

    /// Bytes 0..=10 do not sum to zero
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over bytes 0..10
        expected: u8,
        /// Checksum carried by the frame
        actual: u8,
    },

    /// Device byte names no command
    #[error("Invalid device byte: {0:#04x}")]
    InvalidDeviceByte(u8),
}

/// Why a handshake was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// No ACK arrived before the deadline
    Timeout,
    /// The peer answered INQ with something other than ACK
    UnexpectedResponse(u8),
    /// Writing INQ or the telegram failed
    WriteError,
}

impl std::fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeFailure::Timeout => write!(f, "timeout waiting for ACK"),
            HandshakeFailure::UnexpectedResponse(byte) => {
                write!(f, "unexpected response {:#04x}", byte)
            }
            HandshakeFailure::WriteError => write!(f, "write error"),
        }
    }
}

/// Errors returned by the handshake controller
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The device refused, stayed silent or the write failed
    #[error("Handshake failed: {reason}")]
    Failed {
        /// Why the exchange was abandoned
        reason: HandshakeFailure,
        /// Underlying write error, if any
        #[source]
        source: Option<std::io::Error>,
    },

    /// Reading the reply failed
    #[error("Transport error during handshake: {0}")]
    Transport(#[from] TransportError),
}

impl HandshakeError {
    /// The failure reason, if the device refused or the write failed
    pub fn failure(&self) -> Option<HandshakeFailure> {
        match self {
            HandshakeError::Failed { reason, .. } => Some(*reason),
            HandshakeError::Transport(_) => None,
        }
    }
}

/// Transport-level errors. These are not recoverable within a session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The port could not be opened or configured
    #[error("Could not open port {port}: {reason}")]
    Open {
        /// Port path as given
        port: String,
        /// Driver error text
        reason: String,
    },

    /// A thread panicked while holding the transport
    #[error("Transport lock poisoned")]
    LockPoisoned,

    /// Read, write or flush failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::InvalidGroup('x');
        assert_eq!(err.to_string(), "Invalid group 'x': expected a, b or c");
    }

    #[test]
    fn test_handshake_failure_display() {
        let err = HandshakeError::Failed {
            reason: HandshakeFailure::UnexpectedResponse(0x15),
            source: None,
        };
        assert_eq!(err.to_string(), "Handshake failed: unexpected response 0x15");
        assert_eq!(
            err.failure(),
            Some(HandshakeFailure::UnexpectedResponse(0x15))
        );
    }

    #[test]
    fn test_transport_error_is_not_a_failure() {
        let err = HandshakeError::from(TransportError::LockPoisoned);
        assert!(err.failure().is_none());
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HandshakeError>();
        assert_send_sync::<TransportError>();
    }
}
