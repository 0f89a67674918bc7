//! Firmware upload through the instrument bootloader
//!
//! Upload sequence:
//! 1. `endfw` to clean up a stale session (device errors and silence ignored)
//! 2. `startfw` erases flash
//! 3. one `data` command per chunk, each acknowledged before the next
//! 4. `endfw` finishes the upload
//! 5. `boot` starts the new firmware; no reply is read
//!
//! A reply containing `!` aborts the upload. Chunks are never retried.

use mscript_core::firmware::{self, commands, FirmwareError, UploadState, MAX_CHUNK_SIZE};
use mscript_core::observer::{ProtocolObserver, TracingObserver};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::transport::{LineTransport, TransportError};

/// Default bound for one bootloader reply; erasing flash takes a while
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Device reported {reply:?} after {command}{}", chunk_suffix(.chunk))]
    DeviceProtocol {
        command: &'static str,
        reply: String,
        chunk: Option<usize>,
    },
    #[error("No reply to {command} within {timeout:?}")]
    TransportTimeout {
        command: &'static str,
        timeout: Duration,
    },
    #[error("Transport error: {0}")]
    Transport(TransportError),
    #[error(transparent)]
    Firmware(#[from] FirmwareError),
}

fn chunk_suffix(chunk: &Option<usize>) -> String {
    match chunk {
        Some(index) => format!(" (chunk {})", index),
        None => String::new(),
    }
}

impl UploadError {
    /// Chunk being sent when the device reported an error
    pub fn chunk(&self) -> Option<usize> {
        match self {
            UploadError::DeviceProtocol { chunk, .. } => *chunk,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Payload bytes per `data` command (1..=50)
    pub chunk_size: usize,
    /// Bound for each reply
    pub read_timeout_secs: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            read_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
        }
    }
}

impl UploadOptions {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Summary of a completed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub chunks: usize,
    pub bytes: usize,
}

/// Drives the bootloader state machine over a transport
pub struct BootloaderUploader<T> {
    transport: T,
    options: UploadOptions,
    observer: Box<dyn ProtocolObserver>,
    state: UploadState,
}

impl<T: LineTransport> BootloaderUploader<T> {
    pub fn new(transport: T, options: UploadOptions) -> Self {
        Self::with_observer(transport, options, Box::new(TracingObserver))
    }

    pub fn with_observer(
        transport: T,
        options: UploadOptions,
        observer: Box<dyn ProtocolObserver>,
    ) -> Self {
        Self {
            transport,
            options,
            observer,
            state: UploadState::Idle,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Upload a firmware image and reboot the device into it.
    ///
    /// On failure the uploader is left in [`UploadState::Errored`].
    pub fn upload(&mut self, image: &[u8]) -> Result<UploadReport, UploadError> {
        match self.run(image) {
            Ok(report) => {
                self.set_state(UploadState::Done);
                info!(chunks = report.chunks, bytes = report.bytes, "Firmware upload complete");
                Ok(report)
            }
            Err(e) => {
                let chunk = match self.state {
                    UploadState::Uploading { chunk, .. } => Some(chunk),
                    _ => e.chunk(),
                };
                error!(error = %e, chunk = ?chunk, "Firmware upload failed");
                self.set_state(UploadState::Errored {
                    message: e.to_string(),
                    chunk,
                });
                Err(e)
            }
        }
    }

    fn run(&mut self, image: &[u8]) -> Result<UploadReport, UploadError> {
        let chunks = firmware::chunks(image, self.options.chunk_size)?;
        let total = chunks.len();

        match self.transact(commands::END, commands::END, None) {
            Ok(_) => {}
            Err(UploadError::DeviceProtocol { reply, .. }) => {
                warn!(reply = %reply, "Ignoring error from stale session cleanup");
            }
            Err(UploadError::TransportTimeout { timeout, .. }) => {
                warn!(timeout = ?timeout, "No reply to stale session cleanup, continuing");
            }
            Err(e) => return Err(e),
        }

        self.set_state(UploadState::Erasing);
        info!("Erasing");
        self.transact(commands::START, commands::START, None)?;

        info!(chunks = total, bytes = image.len(), "Uploading");
        for chunk in &chunks {
            self.set_state(UploadState::Uploading {
                chunk: chunk.index,
                total,
            });
            self.transact(commands::DATA, &chunk.command(), Some(chunk.index))?;
            debug!(chunk = chunk.index, total = total, "Chunk accepted");
        }

        self.set_state(UploadState::Finishing);
        info!("Finishing upload");
        self.transact(commands::END, commands::END, None)?;

        self.set_state(UploadState::Rebooting);
        info!("Rebooting");
        self.send(commands::BOOT)?;

        Ok(UploadReport {
            chunks: total,
            bytes: image.len(),
        })
    }

    fn send(&mut self, line: &str) -> Result<(), UploadError> {
        self.observer.line_sent(line);
        self.transport
            .write(format!("{}\n", line).as_bytes())
            .map_err(UploadError::Transport)
    }

    /// Send one command and require a reply without `!`
    fn transact(
        &mut self,
        command: &'static str,
        line: &str,
        chunk: Option<usize>,
    ) -> Result<String, UploadError> {
        self.send(line)?;
        let reply = self
            .transport
            .read_line(self.options.read_timeout())
            .map_err(|e| match e {
                TransportError::Timeout(timeout) => {
                    UploadError::TransportTimeout { command, timeout }
                }
                other => UploadError::Transport(other),
            })?;
        let reply = String::from_utf8_lossy(&reply).into_owned();
        self.observer.line_received(&reply);

        if reply.contains('!') {
            return Err(UploadError::DeviceProtocol {
                command,
                reply: reply.trim_end().to_string(),
                chunk,
            });
        }
        Ok(reply)
    }

    fn set_state(&mut self, state: UploadState) {
        self.observer.upload_state(&state);
        self.state = state;
    }
}
