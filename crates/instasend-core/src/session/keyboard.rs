//! Keyboard loop: console -> serial

use std::io::{self, Write};
use std::sync::Arc;

use super::{
    emit, key_description, transmit, Output, SessionConfig, SessionError, SessionState, StopHandle,
};
use crate::console::{Console, ConsoleGuard};
use crate::protocol::{Command, PortSettings, SharedTransport, TransportError};

const MENU_SEND: u8 = b's';
const MENU_INFO: u8 = b'i';
const MENU_INFO_TAB: u8 = 0x09;
const MENU_ECHO: u8 = 0x05;
const MENU_NEWLINE: u8 = 0x0C;
const MENU_HELP: [u8; 3] = [b'h', b'?', 0x08];

pub(super) struct KeyboardLoop {
    pub(super) transport: SharedTransport,
    pub(super) state: Arc<SessionState>,
    pub(super) stop: StopHandle,
    pub(super) output: Output,
    pub(super) config: SessionConfig,
    pub(super) port: Option<PortSettings>,
    pub(super) command: Option<Command>,
    pub(super) menu_pending: bool,
}

impl KeyboardLoop {
    /// Forward keys until the exit key, a stop request or a transport failure
    pub(super) fn run(mut self, console: Box<dyn Console>) -> Result<(), SessionError> {
        let mut console = match ConsoleGuard::acquire(console) {
            Ok(guard) => guard,
            Err(e) => {
                self.stop.stop();
                return Err(SessionError::Console(e));
            }
        };
        let poll = self.config.poll_interval();

        while self.stop.is_alive() {
            let unit = match console.read_unit(poll) {
                Ok(Some(unit)) => unit,
                Ok(None) => continue,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::info!("console input closed, ending session");
                    self.stop.stop();
                    break;
                }
                Err(e) => {
                    self.stop.stop();
                    return Err(SessionError::Console(e));
                }
            };

            if let Err(e) = self.handle_unit(unit) {
                tracing::error!("keyboard loop failed: {}", e);
                self.stop.stop();
                return Err(e);
            }
        }
        Ok(())
    }

    fn handle_unit(&mut self, unit: u8) -> Result<(), SessionError> {
        if self.menu_pending {
            self.menu_pending = false;
            return self.handle_menu(unit);
        }

        if unit == self.config.exit_char {
            tracing::debug!("exit key pressed");
            self.stop.stop();
        } else if unit == self.config.menu_char {
            self.menu_pending = true;
        } else if unit == b'\n' {
            self.send(self.state.newline_mode().bytes())?;
            // local echo is a real newline in any case
            if self.state.echo() {
                emit(&self.output, b"\n")?;
            }
        } else {
            self.send(&[unit])?;
            if self.state.echo() {
                emit(&self.output, &[unit])?;
            }
        }
        Ok(())
    }

    fn handle_menu(&mut self, unit: u8) -> Result<(), SessionError> {
        if unit == self.config.menu_char || unit == self.config.exit_char {
            // send the special character itself
            self.send(&[unit])?;
            if self.state.echo() {
                emit(&self.output, &[unit])?;
            }
            return Ok(());
        }

        match unit {
            MENU_SEND => self.send_configured_command(),
            MENU_INFO | MENU_INFO_TAB => emit(&self.output, self.info_text().as_bytes()),
            MENU_ECHO => {
                let echo = self.state.toggle_echo();
                let text = format!("--- local echo {} ---\n", active(echo));
                emit(&self.output, text.as_bytes())
            }
            MENU_NEWLINE => {
                let mode = self.state.cycle_newline_mode();
                emit(&self.output, format!("--- line feed {} ---\n", mode).as_bytes())
            }
            u if MENU_HELP.contains(&u) => emit(&self.output, self.help_text().as_bytes()),
            other => {
                let text = format!("--- unknown menu character {} ---\n", key_description(other));
                emit(&self.output, text.as_bytes())
            }
        }
    }

    fn send_configured_command(&mut self) -> Result<(), SessionError> {
        let Some(command) = self.command else {
            return emit(&self.output, b"--- no command configured ---\n");
        };

        emit(&self.output, format!("--- sending {} ---\n", command).as_bytes())?;
        match transmit(&self.transport, &command, &self.config.handshake) {
            Ok(()) => emit(&self.output, b"--- command sent ---\n"),
            Err(e) => {
                let err = SessionError::from(e);
                if err.is_transport_failure() {
                    return Err(err);
                }
                tracing::warn!(command = %command, "command not sent: {}", err);
                emit(&self.output, format!("--- {} ---\n", err).as_bytes())
            }
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut transport = self.transport.lock()?;
        transport.write_all(data).map_err(TransportError::Io)?;
        transport.flush().map_err(TransportError::Io)?;
        Ok(())
    }

    fn info_text(&self) -> String {
        let mut text = String::new();
        if let Some(port) = &self.port {
            text.push_str(&format!("\n--- Settings: {}\n", port));
        }
        text.push_str(&format!("--- local echo: {}\n", active(self.state.echo())));
        text.push_str(&format!("--- linefeed: {}\n", self.state.newline_mode()));
        if let Some(command) = &self.command {
            text.push_str(&format!("--- command: {}\n", command));
        }
        text
    }

    fn help_text(&self) -> String {
        format!(
            "\n--- instasend - help\n\
             ---\n\
             --- {exit:<8} Exit program\n\
             --- {menu:<8} Menu escape key, followed by:\n\
             --- Menu keys:\n\
             ---       {menu:<8} Send the menu character itself to remote\n\
             ---       {exit:<8} Send the exit character to remote\n\
             ---       {send:<8} Send the configured command\n\
             ---       {info:<8} Show info\n\
             --- Toggles:\n\
             ---       {echo:<8} local echo\n\
             ---       {lf:<8} line feed\n",
            exit = key_description(self.config.exit_char),
            menu = key_description(self.config.menu_char),
            send = key_description(MENU_SEND),
            info = key_description(MENU_INFO),
            echo = key_description(MENU_ECHO),
            lf = key_description(MENU_NEWLINE),
        )
    }
}

fn active(on: bool) -> &'static str {
    if on {
        "active"
    } else {
        "inactive"
    }
}
