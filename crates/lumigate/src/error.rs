//! Error types for the Lumigate library

use lumigate_telnet::TransportError;
use thiserror::Error;

/// Main error type for shell session operations
#[derive(Debug, Error)]
pub enum ShellError {
    /// Transport-level failure: connect, timeout, stream closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device asked for a password; password logins are not supported
    /// and never retried
    #[error("Password login is not supported")]
    PasswordRequired,

    /// A response did not have the expected shape: unparsable version,
    /// malformed file content, invalid base64 payload
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<TransportError> for ShellError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(msg) => Self::Connection(msg),
            TransportError::Timeout => Self::Connection("operation timed out".to_string()),
            TransportError::Closed => {
                Self::Connection("connection closed by peer".to_string())
            }
            TransportError::Io(e) => Self::Connection(e.to_string()),
        }
    }
}
