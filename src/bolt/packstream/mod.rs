//! PackStream serialization format.
//!
//! PackStream is the binary value encoding carried inside Bolt messages.
//! This module knows nothing about the protocol or the network: it maps
//! [`PackStreamValue`] to bytes and back.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**
//! - **Integer**: tiny, 8, 16, 32 and 64-bit widths, narrowest chosen
//! - **Float**: 64-bit IEEE 754
//! - **String** / **Bytes**: length-prefixed
//! - **List** / **Map**: tiny, 8, 16 and 32-bit size classes
//! - **Structure**: a tag byte plus ordered fields
//!
//! Structures with unknown tags always decode successfully. Hydrating
//! them into graph, temporal or spatial values happens one layer up.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, decode_message, UnpackStream, MAX_NESTING_DEPTH};
pub use encoder::{encode, encode_message, PackStreamEncoder};
pub use marker::tag;
pub use types::{PackStreamMap, PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Map key was not a string
    InvalidMapKey,
    /// Size does not fit the widest size class
    ValueTooLarge(&'static str, usize),
    /// Structure fields do not match the expected layout
    InvalidStructure(String),
    /// Lists, maps and structures nested past the decoder's limit
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(kind, size) => {
                write!(f, "{} too large to encode: {}", kind, size)
            }
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::NestingTooDeep(limit) => {
                write!(f, "PackStream values nested deeper than {} levels", limit)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}
