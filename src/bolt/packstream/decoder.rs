//! PackStream decoder.
//!
//! A single-pass recursive-descent reader over a byte slice. The read
//! position is an explicit offset, so decoding can begin anywhere in a
//! buffer (message bodies start at offset 2, after the struct marker
//! and the tag byte).

use bytes::Buf;

use super::marker::*;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Deepest nesting of lists, maps and structures accepted from the wire.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Reads values from `data` starting at `offset`.
#[derive(Debug, Clone)]
pub struct UnpackStream<'a> {
    data: &'a [u8],
    offset: usize,
    depth: usize,
}

impl<'a> UnpackStream<'a> {
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset, depth: 0 }
    }

    /// Current read offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value and advance past it.
    ///
    /// Structures are returned raw whatever their tag; turning them into
    /// domain values is left to the hydration layer.
    pub fn unpack_next(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.read_u8()?;

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        match high_nibble(marker) {
            TINY_STRING => return self.read_string(low_nibble(marker)),
            TINY_LIST => return self.read_list(low_nibble(marker)),
            TINY_MAP => return self.read_map(low_nibble(marker)),
            TINY_STRUCT => return self.read_structure(low_nibble(marker)),
            _ => {}
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(self.take(8)?.get_f64())),

            INT_8 => Ok(PackStreamValue::Integer(self.take(1)?.get_i8() as i64)),
            INT_16 => Ok(PackStreamValue::Integer(self.take(2)?.get_i16() as i64)),
            INT_32 => Ok(PackStreamValue::Integer(self.take(4)?.get_i32() as i64)),
            INT_64 => Ok(PackStreamValue::Integer(self.take(8)?.get_i64())),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.take(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_size(marker - STRING_8)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_size(marker - LIST_8)?;
                self.read_list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_size(marker - MAP_8)?;
                self.read_map(len)
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.read_size(marker - STRUCT_8)?;
                self.read_structure(len)
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    /// Read a length field: width 0 => u8, 1 => u16, 2 => u32.
    fn read_size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        Ok(match width {
            0 => self.read_u8()? as usize,
            1 => self.take(2)?.get_u16() as usize,
            _ => self.take(4)?.get_u32() as usize,
        })
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(|s| PackStreamValue::String(s.to_string()))
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))
    }

    fn descend(&mut self) -> Result<(), PackStreamError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.unpack_next()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::List(items))
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let mut map = PackStreamMap::new();
        for _ in 0..len {
            let key = match self.unpack_next()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.unpack_next()?;
            // Later duplicates win.
            map.insert(key, value);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Map(map))
    }

    fn read_structure(&mut self, fields: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let tag = self.read_u8()?;
        let mut values = Vec::with_capacity(fields.min(64));
        for _ in 0..fields {
            values.push(self.unpack_next()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, values)))
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.remaining() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
}

/// Decode one value from the start of `data`.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    UnpackStream::new(data, 0).unpack_next()
}

/// Split a message body into its tag and fields.
///
/// The field count comes from the low nibble of the leading struct
/// marker, exactly as the sender wrote it.
pub fn decode_message(body: &[u8]) -> Result<(u8, Vec<PackStreamValue>), PackStreamError> {
    if body.len() < 2 {
        return Err(PackStreamError::UnexpectedEof);
    }
    if high_nibble(body[0]) != TINY_STRUCT {
        return Err(PackStreamError::InvalidStructure(format!(
            "message must start with a struct marker, found 0x{:02X}",
            body[0]
        )));
    }
    let count = low_nibble(body[0]);
    let mut stream = UnpackStream::new(body, 2);
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(stream.unpack_next()?);
    }
    Ok((body[1], fields))
}
