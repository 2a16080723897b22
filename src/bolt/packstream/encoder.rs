//! PackStream encoder.

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Writes PackStream values onto the end of a borrowed buffer.
///
/// Borrowing lets a message body be packed straight into an outbound
/// buffer that already holds earlier messages.
pub struct PackStreamEncoder<'a> {
    buffer: &'a mut BytesMut,
}

impl<'a> PackStreamEncoder<'a> {
    pub fn new(buffer: &'a mut BytesMut) -> Self {
        Self { buffer }
    }

    /// Number of bytes in the underlying buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Encode any value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.encode_null(),
            PackStreamValue::Boolean(b) => self.encode_bool(*b),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => self.encode_float(*f),
            PackStreamValue::Bytes(b) => return self.encode_bytes(b),
            PackStreamValue::String(s) => return self.encode_string(s),
            PackStreamValue::List(l) => return self.encode_list(l),
            PackStreamValue::Map(m) => return self.encode_map(m),
            PackStreamValue::Structure(s) => return self.encode_structure(s),
        }
        Ok(())
    }

    pub fn encode_null(&mut self) {
        self.buffer.put_u8(NULL);
    }

    pub fn encode_bool(&mut self, value: bool) {
        self.buffer.put_u8(if value { TRUE } else { FALSE });
    }

    /// Encode an integer in the narrowest of the five widths.
    pub fn encode_int(&mut self, value: i64) {
        match value {
            -0x10..=0x7F => self.buffer.put_i8(value as i8),
            -0x80..=-0x11 => {
                self.buffer.put_u8(INT_8);
                self.buffer.put_i8(value as i8);
            }
            -0x8000..=0x7FFF => {
                self.buffer.put_u8(INT_16);
                self.buffer.put_i16(value as i16);
            }
            -0x8000_0000..=0x7FFF_FFFF => {
                self.buffer.put_u8(INT_32);
                self.buffer.put_i32(value as i32);
            }
            _ => {
                self.buffer.put_u8(INT_64);
                self.buffer.put_i64(value);
            }
        }
    }

    pub fn encode_float(&mut self, value: f64) {
        self.buffer.put_u8(FLOAT_64);
        self.buffer.put_f64(value);
    }

    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        self.write_header(&BYTES_MARKERS, value.len())?;
        self.buffer.put_slice(value);
        Ok(())
    }

    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        let bytes = value.as_bytes();
        self.write_header(&STRING_MARKERS, bytes.len())?;
        self.buffer.put_slice(bytes);
        Ok(())
    }

    pub fn encode_list(&mut self, values: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_header(&LIST_MARKERS, values.len())?;
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    pub fn encode_map(&mut self, map: &PackStreamMap) -> Result<(), PackStreamError> {
        self.write_header(&MAP_MARKERS, map.len())?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a structure. Only the tiny form is ever written.
    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        self.encode_structure_header(s.tag, s.fields.len())?;
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    /// Write the `B0+n, tag` prefix shared by structures and message bodies.
    pub fn encode_structure_header(&mut self, tag: u8, fields: usize) -> Result<(), PackStreamError> {
        if fields > MAX_STRUCT_FIELDS {
            return Err(PackStreamError::ValueTooLarge("Structure", fields));
        }
        self.buffer.put_u8(TINY_STRUCT | fields as u8);
        self.buffer.put_u8(tag);
        Ok(())
    }

    fn write_header(&mut self, markers: &SizedMarkers, size: usize) -> Result<(), PackStreamError> {
        match markers.classify(size) {
            Some(SizeClass::Tiny(marker)) => self.buffer.put_u8(marker),
            Some(SizeClass::Size8(marker)) => {
                self.buffer.put_u8(marker);
                self.buffer.put_u8(size as u8);
            }
            Some(SizeClass::Size16(marker)) => {
                self.buffer.put_u8(marker);
                self.buffer.put_u16(size as u16);
            }
            Some(SizeClass::Size32(marker)) => {
                self.buffer.put_u8(marker);
                self.buffer.put_u32(size as u32);
            }
            None => return Err(PackStreamError::ValueTooLarge(markers.name, size)),
        }
        Ok(())
    }
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut buffer = BytesMut::with_capacity(64);
    PackStreamEncoder::new(&mut buffer).encode(value)?;
    Ok(buffer)
}

/// Append a message body (`B0+n, tag, fields...`) to `buffer`.
pub fn encode_message(
    buffer: &mut BytesMut,
    tag: u8,
    fields: &[PackStreamValue],
) -> Result<(), PackStreamError> {
    let mut encoder = PackStreamEncoder::new(buffer);
    encoder.encode_structure_header(tag, fields.len())?;
    for field in fields {
        encoder.encode(field)?;
    }
    Ok(())
}
