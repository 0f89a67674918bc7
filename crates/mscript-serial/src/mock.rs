//! In-memory transport replaying canned replies

use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::{LineTransport, TransportError};

pub(crate) enum Reply {
    Line(String),
    Timeout,
}

/// Records every write and answers reads from a queue. An exhausted queue
/// behaves like a silent device.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    pub written: Vec<String>,
    replies: VecDeque<Reply>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply line; `\n` is appended
    pub fn reply(mut self, line: &str) -> Self {
        self.replies.push_back(Reply::Line(format!("{}\n", line)));
        self
    }

    pub fn replies<'a>(mut self, lines: impl IntoIterator<Item = &'a str>) -> Self {
        for line in lines {
            self = self.reply(line);
        }
        self
    }

    pub fn timeout(mut self) -> Self {
        self.replies.push_back(Reply::Timeout);
        self
    }

    /// Written commands with their line feed removed
    pub fn commands(&self) -> Vec<&str> {
        self.written.iter().map(|w| w.trim_end_matches('\n')).collect()
    }
}

impl LineTransport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.written.push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self.replies.pop_front() {
            Some(Reply::Line(line)) => Ok(line.into_bytes()),
            Some(Reply::Timeout) | None => Err(TransportError::Timeout(timeout)),
        }
    }
}
