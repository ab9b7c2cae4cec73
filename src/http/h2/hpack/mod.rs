//! HPACK header compression (RFC 7541)
//!
//! One [`DynamicTable`] exists per direction of a connection. The encoder
//! table mirrors the peer's decoder and the decoder table mirrors the peer's
//! encoder, so header blocks must go through [`encode`] and [`decode`]
//! strictly in wire order. A block skipped or processed twice desynchronizes
//! the tables for the rest of the connection.
//!
//! [`Encoder`] and [`Decoder`] wrap a table with the connection-level
//! concerns: table size updates driven by SETTINGS_HEADER_TABLE_SIZE, the
//! sensitive-header policy and the header list bound.

pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod table;

pub use decoder::{decode, Decoder};
pub use encoder::{encode, Encoder};
pub use table::{DynamicTable, STATIC_TABLE};

use crate::http::h2::error::{Error, ErrorCode, Result};
use bytes::{Buf, BufMut, Bytes};
use std::fmt;

/// Per-entry overhead in table size accounting (RFC 7541 Section 4.1)
pub const ENTRY_OVERHEAD: usize = 32;

/// A header name/value pair
///
/// Names built through [`HeaderField::new`] are lowercased. Fields produced by
/// the decoder keep the bytes exactly as received so the connection can reject
/// malformed responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    name: Bytes,
    value: Bytes,
}

impl HeaderField {
    /// Create a field, lowercasing the name
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        let name = name.into();
        let name = if name.iter().any(u8::is_ascii_uppercase) {
            Bytes::from(name.to_ascii_lowercase())
        } else {
            name
        };
        HeaderField {
            name,
            value: value.into(),
        }
    }

    /// Create a field without touching the name
    pub(crate) fn raw(name: Bytes, value: Bytes) -> Self {
        HeaderField { name, value }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Whether this is a pseudo-header (`:method`, `:status`, ...)
    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }

    /// Size of this field for table accounting: name + value + 32
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }

    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.name, self.value)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

impl<N: Into<Bytes>, V: Into<Bytes>> From<(N, V)> for HeaderField {
    fn from((name, value): (N, V)) -> Self {
        HeaderField::new(name, value)
    }
}

/// Which literals the encoder is allowed to add to the dynamic table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexingPolicy {
    /// Every literal uses incremental indexing
    #[default]
    Permissive,
    /// Credentials and cookies are sent as never-indexed literals so they
    /// never enter a compression context (RFC 7541 Section 7.1.3)
    ProtectSensitive,
}

impl IndexingPolicy {
    pub(crate) fn is_sensitive(self, name: &[u8]) -> bool {
        match self {
            IndexingPolicy::Permissive => false,
            IndexingPolicy::ProtectSensitive => matches!(
                name,
                b"authorization" | b"proxy-authorization" | b"cookie" | b"set-cookie"
            ),
        }
    }
}

fn compression_error(reason: &str) -> Error {
    Error::format(ErrorCode::CompressionError, reason)
}

/// Encode `value` as an HPACK integer with an N-bit prefix (RFC 7541 Section 5.1).
///
/// `pattern` holds the representation bits above the prefix.
pub(crate) fn encode_int<B: BufMut>(value: usize, prefix_bits: u8, pattern: u8, dst: &mut B) {
    let max = (1usize << prefix_bits) - 1;
    if value < max {
        dst.put_u8(pattern | value as u8);
        return;
    }

    dst.put_u8(pattern | max as u8);
    let mut rest = value - max;
    while rest >= 128 {
        dst.put_u8(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    dst.put_u8(rest as u8);
}

/// Decode an HPACK integer with an N-bit prefix, advancing `src`
pub(crate) fn decode_int(src: &mut &[u8], prefix_bits: u8) -> Result<usize> {
    if !src.has_remaining() {
        return Err(compression_error("truncated integer"));
    }
    let max = (1usize << prefix_bits) - 1;
    let mut value = (src.get_u8() as usize) & max;
    if value < max {
        return Ok(value);
    }

    let mut shift = 0u32;
    loop {
        if !src.has_remaining() {
            return Err(compression_error("truncated integer"));
        }
        let byte = src.get_u8();
        // Reject integers wider than 28 bits
        if shift > 21 {
            return Err(compression_error("integer overflow"));
        }
        value += ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Encode a string literal, Huffman coded when that is shorter
pub(crate) fn encode_string<B: BufMut>(src: &[u8], dst: &mut B) {
    let huffman_len = huffman::encoded_len(src);
    if huffman_len < src.len() {
        encode_int(huffman_len, 7, 0x80, dst);
        huffman::encode(src, dst);
    } else {
        encode_int(src.len(), 7, 0x00, dst);
        dst.put_slice(src);
    }
}

/// Decode a string literal, advancing `src`
pub(crate) fn decode_string(src: &mut &[u8]) -> Result<Bytes> {
    let huffman_coded = match src.first() {
        Some(&first) => first & 0x80 != 0,
        None => return Err(compression_error("truncated string literal")),
    };
    let len = decode_int(src, 7)?;
    if len > src.remaining() {
        return Err(compression_error("string literal longer than header block"));
    }

    let block: &[u8] = *src;
    let (raw, rest) = block.split_at(len);
    *src = rest;
    if huffman_coded {
        Ok(Bytes::from(huffman::decode(raw)?))
    } else {
        Ok(Bytes::copy_from_slice(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_bytes(value: usize, prefix_bits: u8) -> Vec<u8> {
        let mut dst: Vec<u8> = Vec::new();
        encode_int(value, prefix_bits, 0, &mut dst);
        dst
    }

    #[test]
    fn test_rfc7541_c1_integers() {
        assert_eq!(int_bytes(10, 5), [0x0a]);
        assert_eq!(int_bytes(1337, 5), [0x1f, 0x9a, 0x0a]);
        assert_eq!(int_bytes(42, 8), [0x2a]);
    }

    #[test]
    fn test_integer_boundaries() {
        for &(value, prefix) in &[(0, 7), (126, 7), (127, 7), (128, 7), (62, 6), (63, 6), (4096, 5), (15, 4), (16, 4)] {
            let bytes = int_bytes(value, prefix);
            let mut src = &bytes[..];
            assert_eq!(decode_int(&mut src, prefix).unwrap(), value);
            assert!(src.is_empty());
        }
    }

    #[test]
    fn test_integer_truncated_and_overflow() {
        let mut src: &[u8] = &[0x1f, 0x9a];
        assert!(decode_int(&mut src, 5).is_err());

        let mut src: &[u8] = &[0x1f, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let err = decode_int(&mut src, 5).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CompressionError));
    }

    #[test]
    fn test_string_literal_length_past_block() {
        let mut src: &[u8] = &[0x05, b'a', b'b'];
        assert!(decode_string(&mut src).is_err());
    }

    #[test]
    fn test_string_literal_huffman_choice() {
        let mut dst: Vec<u8> = Vec::new();
        encode_string(b"www.example.com", &mut dst);
        assert_eq!(dst[0], 0x8c);

        // Single rare byte is longer once coded
        let mut dst: Vec<u8> = Vec::new();
        encode_string(&[0x00], &mut dst);
        assert_eq!(dst, [0x01, 0x00]);

        let mut src = &dst[..];
        assert_eq!(&decode_string(&mut src).unwrap()[..], &[0x00]);
    }

    #[test]
    fn test_header_field_lowercases_name() {
        let field = HeaderField::new("Content-Type", "text/HTML");
        assert_eq!(field.name(), b"content-type");
        assert_eq!(field.value(), b"text/HTML");
        assert_eq!(field.size(), 12 + 9 + 32);
        assert!(!field.is_pseudo());
        assert!(HeaderField::new(":path", "/").is_pseudo());
    }

    #[test]
    fn test_sensitive_policy() {
        assert!(!IndexingPolicy::Permissive.is_sensitive(b"authorization"));
        assert!(IndexingPolicy::ProtectSensitive.is_sensitive(b"cookie"));
        assert!(!IndexingPolicy::ProtectSensitive.is_sensitive(b"accept"));
    }
}
