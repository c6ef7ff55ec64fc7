//! Telegram Protocol
//!
//! Implements the Insta RX/TX binary telegram protocol: command encoding,
//! the 12-byte telegram frame with its additive checksum, and the INQ/ACK
//! handshake that must precede every transmission.
//!
//! The medium is half-duplex. A sender writes [`INQ`] and may only write its
//! telegram after the peer answers with [`ACK`].

pub mod command;
mod error;
pub mod handshake;
pub mod serial;
pub mod telegram;
pub mod transport;

pub use command::{Action, Command, Group};
pub use error::{CommandError, HandshakeError, HandshakeFailure, TelegramError, TransportError};
pub use handshake::{Handshake, HandshakeConfig, HandshakeState};
pub use serial::{list_ports, open_port, FlowControl, Parity, PortInfo, PortSettings};
pub use telegram::{FrameScanner, Telegram};
pub use transport::{SerialChannel, SharedTransport, Transport};

/// Request to transmit on the shared medium
pub const INQ: u8 = 0xFA;

/// Permission to transmit granted
pub const ACK: u8 = 0x05;

/// Default baud rate of the radio module
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-read timeout on the serial port in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 700;

/// Default overall deadline for the ACK reply in milliseconds (three read attempts)
pub const DEFAULT_ACK_DEADLINE_MS: u64 = 2100;
