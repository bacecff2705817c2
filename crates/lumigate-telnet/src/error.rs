//! Transport-specific error types

use thiserror::Error;
use std::io;

/// Errors produced by the byte-stream transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to reach the remote maintenance shell
    #[error("Connect failed: {0}")]
    Connect(String),

    /// A read or connect deadline expired
    #[error("Operation timed out")]
    Timeout,

    /// The peer closed the stream mid-read
    #[error("Connection closed by peer")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
