//! Protocol observers
//!
//! Components take an observer at construction and report what they send,
//! receive and decode through it. All hooks default to doing nothing.

use tracing::{debug, trace};

use crate::firmware::UploadState;
use crate::package::DataPackage;

pub trait ProtocolObserver: Send {
    /// A line was written to the device
    fn line_sent(&mut self, _line: &str) {}

    /// A line was received from the device
    fn line_received(&mut self, _line: &str) {}

    /// A data package was added to curve `curve` (0-based)
    fn package_decoded(&mut self, _curve: usize, _package: &DataPackage) {}

    /// The bootloader upload moved to a new state
    fn upload_state(&mut self, _state: &UploadState) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProtocolObserver for NoopObserver {}

/// Observer forwarding every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProtocolObserver for TracingObserver {
    fn line_sent(&mut self, line: &str) {
        trace!(line = line.trim_end(), "Sent line");
    }

    fn line_received(&mut self, line: &str) {
        trace!(line = line.trim_end(), "Received line");
    }

    fn package_decoded(&mut self, curve: usize, package: &DataPackage) {
        debug!(curve = curve, values = package.len(), "Decoded data package");
    }

    fn upload_state(&mut self, state: &UploadState) {
        debug!(?state, "Upload state changed");
    }
}
