//! Session errors

use thiserror::Error;

use crate::protocol::{HandshakeError, TransportError};

/// Errors surfaced by the session orchestrator and its loops
#[derive(Error, Debug)]
pub enum SessionError {
    /// The handshake failed or hit a transport error
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The serial link failed
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Console setup or input failed
    #[error("Console error: {0}")]
    Console(std::io::Error),

    /// Writing to the display failed
    #[error("Display error: {0}")]
    Display(std::io::Error),

    /// `start` was called on a running session
    #[error("Session already running")]
    AlreadyRunning,

    /// A loop thread could not be started
    #[error("Failed to spawn {0} loop: {1}")]
    Spawn(&'static str, std::io::Error),

    /// A loop thread panicked
    #[error("{0} loop panicked")]
    Panicked(&'static str),

    /// A loop was still running at the join deadline
    #[error("{0} loop did not stop within the join timeout")]
    JoinTimeout(&'static str),
}

impl SessionError {
    /// Whether this error means the transport is unusable
    pub fn is_transport_failure(&self) -> bool {
        match self {
            SessionError::Transport(_) => true,
            SessionError::Handshake(HandshakeError::Transport(_)) => true,
            _ => false,
        }
    }
}
