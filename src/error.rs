use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
/// Failure to open a transport.
pub enum ConnectionError {
    #[error("Invalid connection parameter: {0}")]
    /// A configuration value could not be used.
    InvalidConfig(String),
    #[error("Serial port error: {0}")]
    /// The OS refused to open the serial device.
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    /// The OS refused to open the socket or file.
    Io(#[from] std::io::Error),
    #[error("Unsupported connection option: {0}")]
    /// Option recognised but not available in this build.
    Unsupported(&'static str),
}

#[derive(Error, Debug)]
/// Failure on an open transport.
pub enum TransportError {
    #[error("End of stream")]
    /// Replay file exhausted.
    EndOfStream,
    #[error("Transport is closed")]
    /// Read or write after `close()`.
    Closed,
    #[error("No peer to write to")]
    /// Datagram transport has not heard from anyone yet.
    NoPeer,
    #[error("I/O error: {0}")]
    /// Hard I/O failure (device unplugged, socket reset).
    Io(#[from] std::io::Error),
}

#[derive(Error, Clone, Debug, PartialEq)]
/// Failure to decode a framed message.
pub enum ParseError {
    #[error("Checksum mismatch: expected {expected:#x}, found {found:#x}")]
    /// Integrity check failed.
    Checksum {
        /// Computed checksum
        expected: u32,
        /// Checksum carried by the frame
        found: u32,
    },
    #[error("Unknown message identity {0}")]
    /// Identity not present in the protocol's message table.
    UnknownMessage(String),
    #[error("Invalid payload length for {name}: expected {expected}, found {found}")]
    /// Declared or actual length does not fit the message layout.
    Length {
        /// Message name
        name: &'static str,
        /// Minimum length required
        expected: usize,
        /// Length received
        found: usize,
    },
    #[error("Invalid field {0}")]
    /// A field could not be converted.
    Field(String),
    #[error("Pattern not found")]
    /// Text did not match the expected layout.
    PatternNotFound,
}

#[derive(Error, Debug)]
/// Failure to shut down a read loop.
pub enum StreamError {
    #[error("Read loop did not stop within {0:?}")]
    /// Worker still running after the join timeout.
    StopTimeout(Duration),
    #[error("Read loop worker panicked")]
    /// Worker thread panicked.
    Panicked,
}
