//! Serial port handling
//!
//! Opens and configures the serial link to the radio module.

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::{SerialChannel, TransportError, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Parity::None),
            "E" | "EVEN" => Ok(Parity::Even),
            "O" | "ODD" => Ok(Parity::Odd),
            other => Err(format!("invalid parity '{}': expected N, E or O", other)),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(f, "{}", c)
    }
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowControl::None => write!(f, "none"),
            FlowControl::Software => write!(f, "XON/XOFF"),
            FlowControl::Hardware => write!(f, "RTS/CTS"),
        }
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
    /// Flow control
    pub flow_control: FlowControl,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Initial RTS line state (left untouched when unset)
    pub rts: Option<bool>,
    /// Initial DTR line state (left untouched when unset)
    pub dtr: Option<bool>,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            path: default_port_name().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            flow_control: FlowControl::None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            rts: None,
            dtr: None,
        }
    }
}

impl PortSettings {
    /// Timeout applied to each read on the opened port
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {},8,{},1  flow control: {}",
            self.path, self.baud_rate, self.parity, self.flow_control
        )
    }
}

#[cfg(windows)]
fn default_port_name() -> &'static str {
    "COM2"
}

#[cfg(not(windows))]
fn default_port_name() -> &'static str {
    "/dev/ttyUSB0"
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// Sort key so that ttyACM* ports come first, then ttyUSB*, then the rest
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // USB adapters the enumeration API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open and configure the serial port described by `settings`
pub fn open_port(settings: &PortSettings) -> Result<SerialChannel, TransportError> {
    let open_err = |e: serialport::Error| TransportError::Open {
        port: settings.path.clone(),
        reason: e.to_string(),
    };

    let mut port = serialport::new(&settings.path, settings.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(settings.parity.into())
        .flow_control(settings.flow_control.into())
        .timeout(settings.read_timeout())
        .open()
        .map_err(open_err)?;

    configure_lines(port.as_mut(), settings).map_err(open_err)?;

    tracing::debug!(port = %settings.path, settings = %settings, "serial port opened");
    Ok(SerialChannel::new(port))
}

/// Apply the requested initial RTS/DTR states
fn configure_lines(port: &mut dyn SerialPort, settings: &PortSettings) -> serialport::Result<()> {
    if let Some(dtr) = settings.dtr {
        port.write_data_terminal_ready(dtr)?;
        tracing::info!("forcing DTR {}", if dtr { "active" } else { "inactive" });
    }
    if let Some(rts) = settings.rts {
        port.write_request_to_send(rts)?;
        tracing::info!("forcing RTS {}", if rts { "active" } else { "inactive" });
    }
    Ok(())
}
