//! # instasend Core Library
//!
//! Serial control of Insta RX/TX radio modules.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Command parsing and 12-byte telegram encoding/decoding
//! - The INQ/ACK handshake required before every transmission
//! - Serial port access behind a mockable transport
//! - An interactive session with a keyboard loop and a serial reader
//! - Raw console input for POSIX terminals and Windows consoles
//!
//! ## Example
//!
//! ```rust,ignore
//! use instasend_core::prelude::*;
//!
//! let settings = PortSettings { path: "/dev/ttyUSB0".into(), ..Default::default() };
//! let mut port = open_port(&settings)?;
//! let command: Command = "a1on".parse()?;
//! send_once(&mut port, &command, &HandshakeConfig::default())?;
//! ```

pub mod config;
pub mod console;
pub mod protocol;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, LinkConfig};
    pub use crate::console::{platform_console, Console, ConsoleGuard, ConsoleKind};
    pub use crate::protocol::{
        list_ports, open_port, Action, Command, Group, Handshake, HandshakeConfig,
        HandshakeError, HandshakeFailure, HandshakeState, PortSettings, Telegram, Transport,
        TransportError,
    };
    pub use crate::session::{send_once, NewlineMode, Session, SessionConfig, SessionError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
