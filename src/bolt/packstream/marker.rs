//! PackStream marker bytes and structure tags.
//!
//! Every encoded value starts with a marker byte. For the sized kinds
//! (strings, bytes, lists, maps) the marker also selects how the length
//! is carried: inline in the low nibble, or in a following 8, 16 or
//! 32-bit big-endian field.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const TINY_STRING: u8 = 0x80;
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const TINY_LIST: u8 = 0x90;
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const TINY_MAP: u8 = 0xA0;
pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const TINY_STRUCT: u8 = 0xB0;
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// Largest field count that fits in a tiny struct marker.
pub const MAX_STRUCT_FIELDS: usize = 15;

/// Marker set for one sized kind.
///
/// `tiny` is `None` for kinds without an inline length form (bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedMarkers {
    pub name: &'static str,
    pub tiny: Option<u8>,
    pub size_8: u8,
    pub size_16: u8,
    pub size_32: u8,
}

pub const STRING_MARKERS: SizedMarkers = SizedMarkers {
    name: "String",
    tiny: Some(TINY_STRING),
    size_8: STRING_8,
    size_16: STRING_16,
    size_32: STRING_32,
};

pub const BYTES_MARKERS: SizedMarkers = SizedMarkers {
    name: "Bytes",
    tiny: None,
    size_8: BYTES_8,
    size_16: BYTES_16,
    size_32: BYTES_32,
};

pub const LIST_MARKERS: SizedMarkers = SizedMarkers {
    name: "List",
    tiny: Some(TINY_LIST),
    size_8: LIST_8,
    size_16: LIST_16,
    size_32: LIST_32,
};

pub const MAP_MARKERS: SizedMarkers = SizedMarkers {
    name: "Map",
    tiny: Some(TINY_MAP),
    size_8: MAP_8,
    size_16: MAP_16,
    size_32: MAP_32,
};

/// Size class chosen for a sized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Tiny(u8),
    Size8(u8),
    Size16(u8),
    Size32(u8),
}

impl SizedMarkers {
    /// Pick the narrowest marker able to carry `size`, or `None` if the
    /// size does not fit in 32 bits.
    pub fn classify(&self, size: usize) -> Option<SizeClass> {
        match (self.tiny, size) {
            (Some(tiny), 0..=0x0F) => Some(SizeClass::Tiny(tiny | size as u8)),
            (_, 0..=0xFF) => Some(SizeClass::Size8(self.size_8)),
            (_, 0x100..=0xFFFF) => Some(SizeClass::Size16(self.size_16)),
            (_, n) if n as u64 <= u32::MAX as u64 => Some(SizeClass::Size32(self.size_32)),
            _ => None,
        }
    }
}

/// Structure tags understood by the default hydration table.
pub mod tag {
    pub const NODE: u8 = b'N';
    pub const RELATIONSHIP: u8 = b'R';
    pub const UNBOUND_RELATIONSHIP: u8 = b'r';
    pub const PATH: u8 = b'P';

    pub const DATE: u8 = b'D';
    pub const TIME: u8 = b'T';
    pub const LOCAL_TIME: u8 = b't';
    pub const DATE_TIME: u8 = b'F';
    pub const DATE_TIME_ZONE_ID: u8 = b'f';
    pub const LOCAL_DATE_TIME: u8 = b'd';
    pub const DURATION: u8 = b'E';

    pub const POINT_2D: u8 = b'X';
    pub const POINT_3D: u8 = b'Y';
}

/// True for the inline integer range -16..=127.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

/// Low nibble of a tiny marker.
#[inline]
pub fn low_nibble(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// High nibble of a marker, used to identify tiny sized kinds.
#[inline]
pub fn high_nibble(marker: u8) -> u8 {
    marker & 0xF0
}
