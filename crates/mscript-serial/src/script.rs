//! MethodSCRIPT transmission and result collection

use mscript_core::curve::{AggregateError, CurveAggregator, ResultSet};
use mscript_core::observer::{ProtocolObserver, TracingObserver};
use mscript_core::package::{ParseOptions, ResponseLine};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::transport::{LineTransport, TransportError};

/// Default bound for one response line of a running script
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Device reported an error: {line}")]
    DeviceProtocol { line: String },
    #[error("No response line within {timeout:?}")]
    TransportTimeout { timeout: Duration },
    #[error("Transport error: {0}")]
    Transport(TransportError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<TransportError> for ScriptError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(timeout) => ScriptError::TransportTimeout { timeout },
            other => ScriptError::Transport(other),
        }
    }
}

/// A script as the ordered text lines sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<String>,
}

impl Script {
    /// Split text into lines, each terminated by a single `\n`
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .split_inclusive('\n')
            .map(|line| {
                let line = line.strip_suffix('\n').unwrap_or(line);
                let line = line.strip_suffix('\r').unwrap_or(line);
                format!("{}\n", line)
            })
            .collect();
        Self { lines }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_text(&text))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Sends scripts and collects their output
pub struct ScriptTransmitter<T> {
    transport: T,
    observer: Box<dyn ProtocolObserver>,
}

impl<T: LineTransport> ScriptTransmitter<T> {
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Box::new(TracingObserver))
    }

    pub fn with_observer(transport: T, observer: Box<dyn ProtocolObserver>) -> Self {
        Self {
            transport,
            observer,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Write each line verbatim, one write per line, without waiting for
    /// any acknowledgement
    pub fn send<I, S>(&mut self, lines: I) -> Result<(), TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for line in lines {
            let line = line.as_ref();
            self.observer.line_sent(line);
            self.transport.write(line.as_bytes())?;
            count += 1;
        }
        debug!(lines = count, "Script sent");
        Ok(())
    }

    pub fn send_script(&mut self, script: &Script) -> Result<(), TransportError> {
        self.send(script.lines())
    }

    /// Read response lines into `aggregator` until the empty line ending the
    /// output.
    ///
    /// A line containing `!` is a device error. Whatever was collected
    /// before any error stays in the aggregator.
    pub fn collect(
        &mut self,
        aggregator: &mut CurveAggregator,
        timeout: Duration,
    ) -> Result<(), ScriptError> {
        while !aggregator.is_finished() {
            let bytes = self.transport.read_line(timeout)?;
            let line = String::from_utf8_lossy(&bytes);
            self.observer.line_received(&line);

            if line.contains('!') {
                let line = line.trim_end().to_string();
                warn!(line = %line, "Device reported an error");
                return Err(ScriptError::DeviceProtocol { line });
            }
            if let ResponseLine::CurveEnd(terminator) = aggregator.push_line(&line)? {
                debug!(terminator = %terminator, "Curve ended");
            }
        }
        Ok(())
    }

    /// Send a script and collect its complete result set
    pub fn run(
        &mut self,
        script: &Script,
        options: ParseOptions,
        timeout: Duration,
    ) -> Result<ResultSet, ScriptError> {
        let mut aggregator = CurveAggregator::new(options);
        self.send_script(script)?;
        self.collect(&mut aggregator, timeout)?;
        let results = aggregator.into_results();
        info!(
            curves = results.curve_count(),
            packages = results.package_count(),
            "Script finished"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;

    const SCRIPT: &str = "e\nvar i\nset_pgstat_mode 3\nloop i < 2\npck_start\npck_end\nendloop\n\n";

    #[test]
    fn test_script_from_text() {
        let script = Script::from_text("e\r\nvar c\nsend_string \"x\"");
        assert_eq!(script.lines(), &["e\n", "var c\n", "send_string \"x\"\n"]);
        assert_eq!(Script::from_text(SCRIPT).len(), 8);
        assert!(Script::from_text("").is_empty());
    }

    #[test]
    fn test_send_writes_one_line_per_write() {
        let script = Script::from_text(SCRIPT);
        let mut transmitter = ScriptTransmitter::new(ScriptedTransport::new());
        transmitter.send_script(&script).unwrap();
        let transport = transmitter.into_inner();
        assert_eq!(transport.written, script.lines());
        // No reads happen while sending
        assert_eq!(transport.written.last().map(String::as_str), Some("\n"));
    }

    #[test]
    fn test_run_collects_curves() {
        let transport = ScriptedTransport::new().replies([
            "e",
            "M0000",
            "Pda8000001 ;ba8000064n,14,288",
            "Pda8000002 ;ba8000065n,10,288",
            "*",
            "Pda8000003 ;ba8000066n",
            "*",
            "",
            "Pda8000004 ;ba8000067n",
        ]);
        let mut transmitter = ScriptTransmitter::new(transport);
        let results = transmitter
            .run(
                &Script::from_text(SCRIPT),
                ParseOptions::default(),
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(results.curve_count(), 2);
        assert_eq!(results.package_count(), 3);
        assert_eq!(results.column(0), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_device_error_keeps_partial_results() {
        let transport = ScriptedTransport::new().replies([
            "Pba8000001 ",
            "*",
            "Pba8000002 ",
            "!0004: Line 3, Col 1",
        ]);
        let mut transmitter = ScriptTransmitter::new(transport);
        let mut aggregator = CurveAggregator::new(ParseOptions::default());
        let err = transmitter
            .collect(&mut aggregator, Duration::from_secs(1))
            .unwrap_err();
        match err {
            ScriptError::DeviceProtocol { line } => assert_eq!(line, "!0004: Line 3, Col 1"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(aggregator.results().curve_count(), 2);
    }

    #[test]
    fn test_timeout_is_reported() {
        let transport = ScriptedTransport::new().reply("Pba8000001 ").timeout();
        let mut transmitter = ScriptTransmitter::new(transport);
        let mut aggregator = CurveAggregator::new(ParseOptions::default());
        let err = transmitter
            .collect(&mut aggregator, Duration::from_millis(250))
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::TransportTimeout { timeout } if timeout == Duration::from_millis(250)
        ));
        assert_eq!(aggregator.results().package_count(), 1);
    }

    #[test]
    fn test_malformed_package_aborts_collection() {
        let transport = ScriptedTransport::new().replies(["Pba8000001 ", "PbaZZZZZZZ ", ""]);
        let mut transmitter = ScriptTransmitter::new(transport);
        let mut aggregator = CurveAggregator::new(ParseOptions::default());
        let err = transmitter
            .collect(&mut aggregator, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Aggregate(AggregateError::Decode { line: 2, .. })
        ));
    }
}
