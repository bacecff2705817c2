//! # Lumigate Telnet Transport
//!
//! Byte-stream transport layer for the Lumigate maintenance-shell client.

#![warn(missing_docs)]

/// Transport abstraction
pub mod transport;

/// TCP transport implementation
pub mod tcp;

/// Transport-specific error types
pub mod error;

pub use transport::{Match, Transport};
pub use tcp::TcpTransport;
pub use error::TransportError;
