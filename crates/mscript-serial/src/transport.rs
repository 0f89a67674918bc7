//! Line-oriented transport to the instrument
//!
//! The protocol is strict command/response over a duplex byte channel:
//! every write is followed by blocking line reads bounded by a timeout.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Baud rate used by MethodSCRIPT instruments
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Upper bound of a single blocking read on the port; the line deadline is
/// checked between reads
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout for writes to the port
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No line received within {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Connection closed")]
    Closed,
    #[error("No serial port found")]
    NoPortFound,
}

/// Duplex byte channel with line-feed delimited reads
pub trait LineTransport {
    /// Write bytes as-is
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to and including the next `\n`, waiting at most `timeout`
    fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

impl<T: LineTransport + ?Sized> LineTransport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_line(timeout)
    }
}

/// Serial flow control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
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

/// Serial port settings. 8N1 framing is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name; auto-detected when not set
    pub port: Option<String>,
    pub baud_rate: u32,
    pub flow_control: FlowControl,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: FlowControl::None,
        }
    }
}

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// List the serial ports of this machine
pub fn available_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            description: describe_port_type(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe_port_type(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial");
            match usb.manufacturer.as_deref() {
                Some(manufacturer) => format!(
                    "{} ({}) [{:04x}:{:04x}]",
                    product, manufacturer, usb.vid, usb.pid
                ),
                None => format!("{} [{:04x}:{:04x}]", product, usb.vid, usb.pid),
            }
        }
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "Unknown".to_string(),
    }
}

/// Pick a port when none is configured: the last enumerated one that is not
/// excluded
pub fn find_port(exclude: Option<&str>) -> Result<String, TransportError> {
    let ports = available_ports()?;
    select_port(&ports, exclude).ok_or(TransportError::NoPortFound)
}

fn select_port(ports: &[PortInfo], exclude: Option<&str>) -> Option<String> {
    ports
        .iter()
        .rev()
        .find(|p| Some(p.name.as_str()) != exclude)
        .map(|p| p.name.clone())
}

/// Bytes received from the port, split into `\n` terminated lines
#[derive(Debug, Default)]
struct LineBuffer {
    /// Bytes received after the last returned line
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line including its terminator
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let rest = self.pending.split_off(end + 1);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}

/// [`LineTransport`] over a serial port
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    buffer: LineBuffer,
}

impl SerialTransport {
    /// Open the configured (or auto-detected) port
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let name = match &settings.port {
            Some(port) => port.clone(),
            None => {
                let port = find_port(None)?;
                info!(port = %port, "Auto-detected serial port");
                port
            }
        };

        let port = serialport::new(&name, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(settings.flow_control.into())
            .timeout(POLL_INTERVAL)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;

        debug!(
            port = %name,
            baud_rate = settings.baud_rate,
            flow_control = ?settings.flow_control,
            "Opened serial port"
        );

        Ok(Self {
            port,
            name,
            buffer: LineBuffer::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl LineTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        trace!(port = %self.name, len = bytes.len(), "Writing");
        self.port.set_timeout(WRITE_TIMEOUT)?;
        let result = self.port.write_all(bytes).and_then(|_| self.port.flush());
        self.port.set_timeout(POLL_INTERVAL)?;
        result.map_err(|e| match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout(WRITE_TIMEOUT),
            _ => TransportError::Io(e),
        })
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(line);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout(timeout));
            }
            match self.port.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.buffer.extend(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}
