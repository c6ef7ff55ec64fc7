// instasend -- send switching commands to Insta RX/TX radio modules over a
// serial port, either once or from an interactive terminal session.
//
// Usage:
//   instasend --port /dev/ttyUSB0 --cmd a1on
//   instasend /dev/ttyUSB0 9600 --cmd c8off
//   instasend -p COM2 -c b3on --interactive --echo
//   instasend --config link.json -c a2off -DD
//   instasend --list-ports

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use instasend_core::config::LinkConfig;
use instasend_core::console::platform_console;
use instasend_core::protocol::{list_ports, open_port, Command, FlowControl, Parity, Transport};
use instasend_core::session::{key_description, send_once, NewlineMode, Session, SessionError};

/// How long each join attempt waits before the session is polled again
const JOIN_SLICE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Send commands to Insta RX/TX radio modules over a serial port.
#[derive(Parser, Debug)]
#[command(name = "instasend", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM2).
    #[arg(short, long, conflicts_with = "port_arg")]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, conflicts_with = "baud_arg")]
    baud: Option<u32>,

    /// Serial port path, positional form of --port.
    #[arg(value_name = "PORT")]
    port_arg: Option<String>,

    /// Baud rate, positional form of --baud.
    #[arg(value_name = "BAUD")]
    baud_arg: Option<u32>,

    /// Command to send: group a-c, channel 1-8, then on or off (e.g. a1on).
    #[arg(short, long, required_unless_present = "list_ports")]
    cmd: Option<Command>,

    /// Keep the port open as an interactive terminal after sending.
    #[arg(short, long)]
    interactive: bool,

    /// Echo typed characters locally.
    #[arg(short, long)]
    echo: bool,

    /// Send CR for a typed newline.
    #[arg(long, conflicts_with = "lf")]
    cr: bool,

    /// Send LF for a typed newline.
    #[arg(long)]
    lf: bool,

    /// Parity: N, E or O.
    #[arg(long)]
    parity: Option<Parity>,

    /// Enable RTS/CTS flow control.
    #[arg(long, conflicts_with = "xonxoff")]
    rtscts: bool,

    /// Enable software flow control.
    #[arg(long)]
    xonxoff: bool,

    /// Initial RTS line state (0 or 1).
    #[arg(long, value_parser = parse_line_state)]
    rts: Option<bool>,

    /// Initial DTR line state (0 or 1).
    #[arg(long, value_parser = parse_line_state)]
    dtr: Option<bool>,

    /// Character code of the exit key (decimal or 0x hex, default Ctrl+]).
    #[arg(long, value_parser = parse_char_code)]
    exit_char: Option<u8>,

    /// Character code of the menu key (decimal or 0x hex, default Ctrl+T).
    #[arg(long, value_parser = parse_char_code)]
    menu_char: Option<u8>,

    /// Overall time to wait for the module's ACK, in milliseconds.
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// JSON configuration file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Raise log verbosity (repeat for more).
    #[arg(short = 'D', long, action = ArgAction::Count)]
    debug: u8,

    /// Suppress the banner and informational messages.
    #[arg(short, long)]
    quiet: bool,
}

/// Parse a line state given as "0" or "1".
fn parse_line_state(s: &str) -> std::result::Result<bool, String> {
    match s.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("expected 0 or 1, got '{other}'")),
    }
}

/// Parse a character code like "29" or "0x1d" into a u8.
fn parse_char_code(s: &str) -> std::result::Result<u8, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex code: {e}")),
        None => s.parse::<u8>().map_err(|e| format!("invalid character code: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(debug: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match debug {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Configuration file values with command-line overrides applied
fn link_config(cli: &Cli) -> Result<LinkConfig> {
    let mut config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("could not load configuration {}", path.display()))?,
        None => LinkConfig::default(),
    };

    if let Some(port) = cli.port.as_ref().or(cli.port_arg.as_ref()) {
        config.port.path = port.clone();
    }
    if let Some(baud) = cli.baud.or(cli.baud_arg) {
        config.port.baud_rate = baud;
    }
    if let Some(parity) = cli.parity {
        config.port.parity = parity;
    }
    if cli.rtscts {
        config.port.flow_control = FlowControl::Hardware;
    } else if cli.xonxoff {
        config.port.flow_control = FlowControl::Software;
    }
    if cli.rts.is_some() {
        config.port.rts = cli.rts;
    }
    if cli.dtr.is_some() {
        config.port.dtr = cli.dtr;
    }

    let session = &mut config.session;
    if cli.echo {
        session.echo = true;
    }
    if cli.cr {
        session.newline_mode = NewlineMode::Cr;
    } else if cli.lf {
        session.newline_mode = NewlineMode::Lf;
    }
    if let Some(c) = cli.exit_char {
        session.exit_char = c;
    }
    if let Some(c) = cli.menu_char {
        session.menu_char = c;
    }
    if let Some(ms) = cli.ack_timeout_ms {
        session.handshake.ack_deadline_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    if cli.list_ports {
        for port in list_ports() {
            println!("{port}");
        }
        return Ok(());
    }

    let config = link_config(&cli)?;
    let command = cli.cmd.context("no command given (use --cmd)")?;

    let mut port = open_port(&config.port)?;

    if !cli.quiet {
        eprintln!("--- instasend on {} ---", config.port);
        if cli.interactive {
            eprintln!(
                "--- Quit: {}  |  Menu: {} | Help: {} followed by {} ---",
                key_description(config.session.exit_char),
                key_description(config.session.menu_char),
                key_description(config.session.menu_char),
                key_description(0x08),
            );
        }
    }

    if cli.interactive {
        run_interactive(Box::new(port), &config, command)?;
    } else if let Err(e) = send_once(&mut port, &command, &config.session.handshake) {
        tracing::error!(command = %command, "{}", e);
    }

    if !cli.quiet {
        eprintln!("\n--- exit ---");
    }
    Ok(())
}

fn run_interactive(
    port: Box<dyn Transport>,
    config: &LinkConfig,
    command: Command,
) -> Result<()> {
    let console = platform_console().context("could not open the console")?;
    let mut session = Session::new(port, config.session.clone())
        .with_command(command)
        .with_port_settings(config.port.clone());

    session.start(console)?;
    if let Err(e) = session.send_command(&command) {
        tracing::error!(command = %command, "{}", e);
    }

    loop {
        match session.join(JOIN_SLICE) {
            Ok(()) => break,
            Err(SessionError::JoinTimeout(_)) => continue,
            Err(e) => {
                tracing::error!("session ended: {}", e);
                break;
            }
        }
    }
    Ok(())
}
