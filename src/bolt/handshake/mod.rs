//! Bolt protocol handshake implementation.
//!
//! The Bolt handshake consists of:
//! 1. Client sends 4-byte magic number (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals `[0, range, minor, major]`
//!    (highest first, unused slots zero)
//! 3. Server responds with `[0, 0, minor, major]`, or all zeros if none match

mod negotiation;
mod version;

pub use negotiation::{accept, build_client_handshake, handshake, parse_server_response, Handshake};
pub use version::{BoltVersion, VersionProposal, DEFAULT_PROPOSALS};

pub use super::error::HandshakeError;

/// Bolt protocol magic number: 0x6060B017
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the complete handshake message from client (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of server response (negotiated version)
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// Proposal slots in one handshake.
pub const MAX_PROPOSALS: usize = 4;
