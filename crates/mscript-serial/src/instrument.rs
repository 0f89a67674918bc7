//! Instrument queries outside of script execution

use mscript_core::device::DeviceType;
use mscript_core::observer::{ProtocolObserver, TracingObserver};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::transport::{LineTransport, TransportError};

/// Bound for query replies
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(4);

/// Query commands
pub mod commands {
    /// Firmware version (multi-line, ends with `*`)
    pub const VERSION: &str = "t";
    /// MethodSCRIPT version
    pub const MSCRIPT_VERSION: &str = "v";
    /// Serial number
    pub const SERIAL: &str = "i";
    /// Load the script stored in flash
    pub const LOAD_FROM_FLASH: &str = "Lmscr";
    /// Run the loaded script
    pub const RUN: &str = "r";
    /// Read a register (`G` + 2 decimal digits)
    pub const GET_REGISTER: &str = "G";
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: String, reply: String },
    #[error("Device reported {reply:?} for {command}")]
    DeviceProtocol { command: String, reply: String },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Identification of a connected instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentInfo {
    pub firmware_version: String,
    pub device_type: DeviceType,
    pub mscript_version: String,
    pub serial_number: String,
}

/// Command/response queries against an instrument
pub struct Instrument<T> {
    transport: T,
    observer: Box<dyn ProtocolObserver>,
    timeout: Duration,
}

impl<T: LineTransport> Instrument<T> {
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Box::new(TracingObserver))
    }

    pub fn with_observer(transport: T, observer: Box<dyn ProtocolObserver>) -> Self {
        Self {
            transport,
            observer,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, command: &str) -> Result<(), QueryError> {
        self.observer.line_sent(command);
        self.transport.write(format!("{}\n", command).as_bytes())?;
        Ok(())
    }

    fn read(&mut self, command: &str) -> Result<String, QueryError> {
        let bytes = self.transport.read_line(self.timeout)?;
        let line = String::from_utf8_lossy(&bytes).into_owned();
        self.observer.line_received(&line);
        if line.contains('!') {
            return Err(QueryError::DeviceProtocol {
                command: command.to_string(),
                reply: line.trim_end().to_string(),
            });
        }
        Ok(line)
    }

    /// Send a command and return its single reply line with the echoed
    /// command character removed
    fn query_line(&mut self, command: &str) -> Result<String, QueryError> {
        self.send(command)?;
        let line = self.read(command)?;
        strip_echo(&line, command).ok_or_else(|| QueryError::UnexpectedReply {
            command: command.to_string(),
            reply: line.trim_end().to_string(),
        })
    }

    /// Firmware version. The reply may span several lines and ends with a
    /// line ending in `*`; lines are joined with a space.
    pub fn firmware_version(&mut self) -> Result<String, QueryError> {
        let command = commands::VERSION;
        self.send(command)?;
        let mut lines = Vec::new();
        loop {
            let line = self.read(command)?;
            let line = line.trim_end();
            let done = line.ends_with('*');
            lines.push(line.trim_end_matches('*').trim_end().to_string());
            if done {
                break;
            }
        }
        let version = lines.join(" ");
        let version = strip_echo(&version, command).ok_or_else(|| QueryError::UnexpectedReply {
            command: command.to_string(),
            reply: version.clone(),
        })?;
        debug!(version = %version, "Firmware version");
        Ok(version)
    }

    pub fn device_type(&mut self) -> Result<DeviceType, QueryError> {
        Ok(DeviceType::from_firmware_version(&self.firmware_version()?))
    }

    /// The version query succeeds and names a known instrument
    pub fn is_connected(&mut self) -> bool {
        matches!(self.device_type(), Ok(device) if device != DeviceType::Unknown)
    }

    pub fn mscript_version(&mut self) -> Result<String, QueryError> {
        self.query_line(commands::MSCRIPT_VERSION)
    }

    pub fn serial_number(&mut self) -> Result<String, QueryError> {
        self.query_line(commands::SERIAL)
    }

    pub fn info(&mut self) -> Result<InstrumentInfo, QueryError> {
        let firmware_version = self.firmware_version()?;
        Ok(InstrumentInfo {
            device_type: DeviceType::from_firmware_version(&firmware_version),
            firmware_version,
            mscript_version: self.mscript_version()?,
            serial_number: self.serial_number()?,
        })
    }

    /// Read register `register` (0..=99)
    pub fn register(&mut self, register: u8) -> Result<String, QueryError> {
        let command = format!("{}{:02}", commands::GET_REGISTER, register);
        self.send(&command)?;
        let line = self.read(&command)?;
        Ok(line.trim_end().to_string())
    }

    /// Clear the device's command parser by sending an empty line
    pub fn flush(&mut self) -> Result<(), QueryError> {
        self.send("")?;
        match self.transport.read_line(self.timeout) {
            Ok(_) | Err(TransportError::Timeout(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the script stored in flash. The device sends no reply.
    pub fn load_script_from_flash(&mut self) -> Result<(), QueryError> {
        self.send(commands::LOAD_FROM_FLASH)
    }

    /// Load and run the script stored in flash. Its output can be collected
    /// like that of a sent script.
    pub fn run_script_from_flash(&mut self) -> Result<(), QueryError> {
        self.load_script_from_flash()?;
        self.send(commands::RUN)
    }
}

/// Remove the echoed command prefix and line terminator
fn strip_echo(reply: &str, command: &str) -> Option<String> {
    reply
        .trim_end()
        .strip_prefix(command)
        .map(|rest| rest.to_string())
}
