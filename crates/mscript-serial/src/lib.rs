//! MethodSCRIPT Serial - device communication for MethodSCRIPT instruments
//!
//! Everything here is synchronous: one command in flight at a time, each
//! followed by blocking line reads. Run it on a blocking thread from async
//! code.

pub mod bootloader;
pub mod instrument;
pub mod script;
pub mod transport;

#[cfg(test)]
mod mock;

pub use bootloader::{BootloaderUploader, UploadError, UploadOptions, UploadReport};
pub use instrument::{Instrument, InstrumentInfo, QueryError};
pub use script::{Script, ScriptError, ScriptTransmitter};
pub use transport::{
    available_ports, find_port, FlowControl, LineTransport, PortInfo, SerialSettings,
    SerialTransport, TransportError,
};
