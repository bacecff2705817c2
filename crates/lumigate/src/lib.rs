//! # Lumigate
//!
//! Client for the maintenance shell of Lumi multimode gateways.
//!
//! The gateway exposes a line-oriented interactive shell over telnet with no
//! message framing at all; command boundaries exist only as known prompt byte
//! sequences in the stream. This crate owns that protocol: the login
//! handshake, prompt-delimited command execution, base64 retrieval of binary
//! files over the text channel, and a catalog of device operations gated on
//! the firmware version. A small NTP probe for clock-skew detection rides
//! along.

#![warn(missing_docs)]

pub use lumigate_telnet as telnet;

/// Firmware capability matrix
pub mod caps;

/// Error types for the Lumigate library
pub mod error;

/// Clock-skew probe against a plain NTP server
pub mod ntp;

/// Authenticated maintenance-shell session and device operations
pub mod session;

mod commands;

pub use error::ShellError;
pub use session::ShellSession;

/// Result type alias for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;
