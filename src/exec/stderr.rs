//! Shared, lazily read handle over captured standard error.

use std::io::{self, Read};
use std::sync::Arc;

/// Captured standard error of a remote command.
///
/// Cloning is cheap; every clone has its own read cursor. Reading is
/// optional: callers attach it to an error message only when needed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StderrStream {
    bytes: Arc<[u8]>,
    position: usize,
}

impl StderrStream {
    /// Wraps captured bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
            position: 0,
        }
    }

    /// Total number of captured bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole capture decoded lossily as UTF-8, regardless of the read
    /// cursor.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<Vec<u8>> for StderrStream {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl Read for StderrStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut remaining = self.bytes.get(self.position..).unwrap_or_default();
        let read = remaining.read(buf)?;
        self.position += read;
        Ok(read)
    }
}
