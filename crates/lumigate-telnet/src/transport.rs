//! Transport abstraction for the maintenance shell

use async_trait::async_trait;
use std::time::Duration;

use crate::TransportError;

/// Result of [`Transport::expect`]: which pattern matched and everything read
/// up to and including it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Index into the pattern slice of the pattern that matched
    pub pattern: usize,
    /// Data read so far, matched pattern included
    pub data: Vec<u8>,
}

/// Byte-stream transport the session client runs on.
///
/// The shell protocol has no message framing; the only way to find a command
/// boundary is to watch the stream for known byte sequences. Implementations
/// must return read data *including* the matched delimiter and must fail with
/// [`TransportError::Timeout`] when the deadline passes without a match.
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes to the stream.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read until any of `patterns` appears in the stream.
    ///
    /// Patterns are tried against every position; the earliest occurrence
    /// wins, with the lower pattern index breaking ties.
    async fn expect(
        &mut self,
        patterns: &[&[u8]],
        timeout: Duration,
    ) -> Result<Match, TransportError>;

    /// Read until `delimiter` appears in the stream.
    async fn read_until(
        &mut self,
        delimiter: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(self.expect(&[delimiter], timeout).await?.data)
    }

    /// Shut the stream down. Any in-flight read on another handle fails.
    async fn close(&mut self) -> Result<(), TransportError>;
}
