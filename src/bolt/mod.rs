//! # Bolt Protocol Implementation
//!
//! Low-level client side of the Bolt protocol, versions 1.0 through 4.3.
//!
//! ## Overview
//!
//! - **PackStream** - Binary serialization format for all values
//! - **Codec** - Chunked message framing for Tokio
//! - **Wire** - Buffered byte channel with shared broken/closed state
//! - **Handshake** - Version negotiation (client and server side)
//! - **Message** - Symbolic message kinds and per-version tag tables
//! - **Protocol** - Per-version behavior records
//!
//! ## Note
//!
//! Most users should use the high-level [`crate::driver`] module instead of
//! interacting with the Bolt protocol directly.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod protocol;
pub mod wire;

pub use codec::{peek_message, BoltCodec, MAX_CHUNK_SIZE};
pub use error::{BoltError, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, VersionProposal, BOLT_MAGIC, DEFAULT_PROPOSALS};
pub use message::{
    AccessMode, AuthToken, FailureMetadata, MessageKind, MessageTable, QueryStats, Request,
    Response, RoutingInfo, SuccessMetadata,
};
pub use packstream::{PackStreamError, PackStreamMap, PackStreamStructure, PackStreamValue};
pub use protocol::{HelloStyle, ProtocolSpec, PullStyle, RouteStyle, TxStyle};
pub use wire::{Channel, Wire, WireState};
