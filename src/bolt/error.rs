//! Bolt protocol error types.
//!
//! These cover the wire itself: I/O, framing, handshake and PackStream.
//! Server-reported failures are not represented here; they are carried
//! as FAILURE metadata up to the driver layer.

use std::io;

use thiserror::Error;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Debug, Error)]
pub enum BoltError {
    /// I/O error on the underlying channel
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// PackStream serialization error
    #[error("PackStream error: {0}")]
    PackStream(#[from] PackStreamError),

    /// Protocol error (unexpected message, malformed body)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reassembled message exceeds the configured limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Peer closed the channel
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation on a wire that has already been closed locally
    #[error("Wire already closed")]
    WireClosed,
}

impl BoltError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        BoltError::Protocol(msg.into())
    }

    /// True when the channel itself failed (as opposed to bad bytes).
    pub fn is_transport(&self) -> bool {
        matches!(self, BoltError::Io(_) | BoltError::ConnectionClosed | BoltError::WireClosed)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Invalid magic number received
    #[error("Invalid magic number: expected {expected:02X?}, received {received:02X?}")]
    InvalidMagic { expected: [u8; 4], received: [u8; 4] },

    /// Server answered with all zeros
    #[error("No compatible protocol version found")]
    NoCompatibleVersion,

    /// Server picked a version this client does not implement
    #[error("Unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// Invalid handshake data (wrong size, too many proposals)
    #[error("Invalid handshake data: {0}")]
    InvalidData(String),

    /// Connection closed during handshake
    #[error("Connection closed during handshake")]
    ConnectionClosed,
}
