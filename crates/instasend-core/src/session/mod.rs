//! Session orchestration
//!
//! A session either sends one command and returns ([`send_once`]) or keeps
//! the link open for interactive control ([`Session`]). The interactive mode
//! runs two loops on their own threads:
//!
//! - the keyboard loop forwards keystrokes to the radio and handles the
//!   exit and menu keys
//! - the serial reader displays inbound bytes and answers the radio's INQ
//!   with ACK
//!
//! Outbound writes are issued directly by the keyboard loop and by the
//! handshake; there is no separate writer queue. Both loops stop
//! cooperatively once the shared `alive` flag is cleared.

mod error;
mod keyboard;
mod reader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::console::Console;
use crate::protocol::{
    Command, Handshake, HandshakeConfig, HandshakeError, PortSettings, SharedTransport, Telegram,
    Transport,
};

pub use error::SessionError;
use keyboard::KeyboardLoop;
use reader::ReaderLoop;

/// Default exit key: Ctrl+]
pub const DEFAULT_EXIT_CHAR: u8 = 0x1D;

/// Default menu key: Ctrl+T
pub const DEFAULT_MENU_CHAR: u8 = 0x14;

/// Default poll interval of the loops in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// How a typed newline is sent to the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NewlineMode {
    /// Line feed only
    Lf,
    /// Carriage return only
    Cr,
    /// Carriage return and line feed
    #[default]
    CrLf,
}

impl NewlineMode {
    /// Bytes written for one newline
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            NewlineMode::Lf => b"\n",
            NewlineMode::Cr => b"\r",
            NewlineMode::CrLf => b"\r\n",
        }
    }

    /// Next mode in the LF -> CR -> CR/LF cycle
    pub fn next(&self) -> Self {
        match self {
            NewlineMode::Lf => NewlineMode::Cr,
            NewlineMode::Cr => NewlineMode::CrLf,
            NewlineMode::CrLf => NewlineMode::Lf,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            NewlineMode::Lf => 0,
            NewlineMode::Cr => 1,
            NewlineMode::CrLf => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => NewlineMode::Lf,
            1 => NewlineMode::Cr,
            _ => NewlineMode::CrLf,
        }
    }
}

impl fmt::Display for NewlineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewlineMode::Lf => write!(f, "LF"),
            NewlineMode::Cr => write!(f, "CR"),
            NewlineMode::CrLf => write!(f, "CR/LF"),
        }
    }
}

/// Session behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Echo typed characters locally
    pub echo: bool,
    /// Newline translation for typed newlines
    pub newline_mode: NewlineMode,
    /// Key that ends the session
    pub exit_char: u8,
    /// Key that escapes into the local menu
    pub menu_char: u8,
    /// INQ/ACK timing
    pub handshake: HandshakeConfig,
    /// Bound on every blocking read in the loops
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            echo: false,
            newline_mode: NewlineMode::CrLf,
            exit_char: DEFAULT_EXIT_CHAR,
            menu_char: DEFAULT_MENU_CHAR,
            handshake: HandshakeConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Loop poll interval, at least 1 ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// State shared by the orchestrator and both loops
#[derive(Debug)]
pub struct SessionState {
    alive: AtomicBool,
    echo: AtomicBool,
    newline_mode: AtomicU8,
}

impl SessionState {
    /// Initial state of a session that has not started yet
    pub fn new(echo: bool, newline_mode: NewlineMode) -> Self {
        Self {
            alive: AtomicBool::new(false),
            echo: AtomicBool::new(echo),
            newline_mode: AtomicU8::new(newline_mode.to_u8()),
        }
    }

    /// Whether the loops should keep running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Whether typed keys are echoed locally
    pub fn echo(&self) -> bool {
        self.echo.load(Ordering::SeqCst)
    }

    /// Flip local echo, returning the new value
    pub fn toggle_echo(&self) -> bool {
        !self.echo.fetch_xor(true, Ordering::SeqCst)
    }

    /// Current newline translation
    pub fn newline_mode(&self) -> NewlineMode {
        NewlineMode::from_u8(self.newline_mode.load(Ordering::SeqCst))
    }

    /// Advance to the next newline mode, returning it
    pub fn cycle_newline_mode(&self) -> NewlineMode {
        let next = self.newline_mode().next();
        self.newline_mode.store(next.to_u8(), Ordering::SeqCst);
        next
    }
}

/// Handle that ends a session; cloned into the loops
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<SessionState>,
}

impl StopHandle {
    /// Clear the `alive` flag
    pub fn stop(&self) {
        if self.state.is_alive() {
            tracing::debug!("session stop requested");
        }
        self.state.set_alive(false);
    }

    /// Whether the session is still running
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }
}

/// Where the loops print inbound bytes, echo and menu output
pub type Output = Arc<Mutex<Box<dyn Write + Send>>>;

/// Output writing to the process stdout
pub fn stdout_output() -> Output {
    Arc::new(Mutex::new(Box::new(std::io::stdout())))
}

pub(crate) fn emit(output: &Output, data: &[u8]) -> Result<(), SessionError> {
    let mut out = output
        .lock()
        .map_err(|_| SessionError::Display(std::io::Error::other("output lock poisoned")))?;
    out.write_all(data).map_err(SessionError::Display)?;
    out.flush().map_err(SessionError::Display)
}

/// Describe a key for menus and banners
pub fn key_description(c: u8) -> String {
    if c < 32 {
        format!("Ctrl+{}", (b'@' + c) as char)
    } else {
        format!("{:?}", c as char)
    }
}

/// Run the handshake for `command` on an exclusively held transport
pub fn send_once(
    transport: &mut dyn Transport,
    command: &Command,
    config: &HandshakeConfig,
) -> Result<(), HandshakeError> {
    let telegram = Telegram::encode(command);
    tracing::info!(command = %command, telegram = %telegram, "sending command");
    Handshake::new(*config).execute(transport, &telegram)
}

/// Run the handshake for `command` while holding the shared transport
///
/// The lock is held for the whole exchange: the serial reader is suspended
/// so it cannot consume the ACK, and no keyboard write can interleave.
pub(crate) fn transmit(
    transport: &SharedTransport,
    command: &Command,
    config: &HandshakeConfig,
) -> Result<(), HandshakeError> {
    let mut guard = transport.lock()?;
    send_once(&mut **guard, command, config)
}

/// Interactive session
pub struct Session {
    transport: SharedTransport,
    config: SessionConfig,
    port: Option<PortSettings>,
    command: Option<Command>,
    state: Arc<SessionState>,
    output: Output,
    reader: Option<JoinHandle<Result<(), SessionError>>>,
    keyboard: Option<JoinHandle<Result<(), SessionError>>>,
}

impl Session {
    /// Create a session over `transport` (not yet started)
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let state = Arc::new(SessionState::new(config.echo, config.newline_mode));
        Self {
            transport: SharedTransport::new(transport),
            config,
            port: None,
            command: None,
            state,
            output: stdout_output(),
            reader: None,
            keyboard: None,
        }
    }

    /// Send display output somewhere other than stdout
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Command sent by the menu's send key
    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Port settings shown by the menu's info key
    pub fn with_port_settings(mut self, port: PortSettings) -> Self {
        self.port = Some(port);
        self
    }

    /// Shared session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the loops are still running
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Handle that can end the session from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: self.state.clone(),
        }
    }

    /// Send `command` through the handshake
    ///
    /// A transport failure ends the session; a refused handshake does not.
    pub fn send_command(&self, command: &Command) -> Result<(), SessionError> {
        match transmit(&self.transport, command, &self.config.handshake) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = SessionError::from(e);
                if err.is_transport_failure() {
                    tracing::error!("transport failed during handshake: {}", err);
                    self.stop();
                }
                Err(err)
            }
        }
    }

    /// Launch the serial reader and keyboard loops
    pub fn start(&mut self, console: Box<dyn Console>) -> Result<(), SessionError> {
        if self.reader.is_some() || self.keyboard.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        self.state.set_alive(true);
        tracing::info!("session started");

        let reader = ReaderLoop::new(
            self.transport.clone(),
            self.stop_handle(),
            self.output.clone(),
            self.config.poll_interval(),
        );
        self.reader = Some(self.spawn("serial-reader", move || reader.run())?);

        let keyboard = KeyboardLoop {
            transport: self.transport.clone(),
            state: self.state.clone(),
            stop: self.stop_handle(),
            output: self.output.clone(),
            config: self.config.clone(),
            port: self.port.clone(),
            command: self.command,
            menu_pending: false,
        };
        self.keyboard = Some(self.spawn("keyboard", move || keyboard.run(console))?);
        Ok(())
    }

    fn spawn<F>(
        &self,
        name: &'static str,
        body: F,
    ) -> Result<JoinHandle<Result<(), SessionError>>, SessionError>
    where
        F: FnOnce() -> Result<(), SessionError> + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| {
                self.stop();
                SessionError::Spawn(name, e)
            })
    }

    /// Ask both loops to finish at their next check point
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Wait for the reader, then the keyboard loop, up to `timeout` in total
    ///
    /// Returns the first loop error, if any. A loop still running at the
    /// deadline stays owned by the session and can be joined again.
    pub fn join(&mut self, timeout: Duration) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        let reader = join_bounded(&mut self.reader, "serial reader", deadline);
        let keyboard = join_bounded(&mut self.keyboard, "keyboard", deadline);
        if self.reader.is_none() && self.keyboard.is_none() {
            tracing::info!("session ended");
        }
        reader.and(keyboard)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_bounded(
    slot: &mut Option<JoinHandle<Result<(), SessionError>>>,
    name: &'static str,
    deadline: Instant,
) -> Result<(), SessionError> {
    let Some(handle) = slot.as_ref() else {
        return Ok(());
    };
    while !handle.is_finished() {
        let now = Instant::now();
        if now >= deadline {
            return Err(SessionError::JoinTimeout(name));
        }
        thread::sleep((deadline - now).min(Duration::from_millis(5)));
    }
    match slot.take().map(JoinHandle::join) {
        Some(Ok(result)) => result,
        Some(Err(_)) => Err(SessionError::Panicked(name)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_cycle() {
        assert_eq!(NewlineMode::Lf.next(), NewlineMode::Cr);
        assert_eq!(NewlineMode::Cr.next(), NewlineMode::CrLf);
        assert_eq!(NewlineMode::CrLf.next(), NewlineMode::Lf);
        assert_eq!(NewlineMode::CrLf.bytes(), b"\r\n");
    }

    #[test]
    fn test_state_toggles() {
        let state = SessionState::new(false, NewlineMode::Lf);
        assert!(!state.is_alive());
        assert!(state.toggle_echo());
        assert!(state.echo());
        assert!(!state.toggle_echo());
        assert_eq!(state.cycle_newline_mode(), NewlineMode::Cr);
        assert_eq!(state.newline_mode(), NewlineMode::Cr);
    }

    #[test]
    fn test_key_description() {
        assert_eq!(key_description(0x1D), "Ctrl+]");
        assert_eq!(key_description(0x14), "Ctrl+T");
        assert_eq!(key_description(b'q'), "'q'");
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.exit_char, 0x1D);
        assert_eq!(config.menu_char, 0x14);
        assert_eq!(config.newline_mode, NewlineMode::CrLf);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_newline_mode_serde_names() {
        let json = serde_json::to_string(&NewlineMode::CrLf).unwrap();
        assert_eq!(json, "\"CRLF\"");
        let mode: NewlineMode = serde_json::from_str("\"CR\"").unwrap();
        assert_eq!(mode, NewlineMode::Cr);
    }
}
