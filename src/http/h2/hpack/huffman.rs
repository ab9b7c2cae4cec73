//! Huffman coding for HPACK string literals (RFC 7541 Appendix B)
//!
//! Encoding pads the final byte with the most significant bits of EOS
//! (all 1-bits). Decoding rejects EOS inside the string, padding longer than
//! 7 bits, and padding that is not all 1-bits.

use crate::http::h2::error::{Error, ErrorCode, Result};
use bytes::BufMut;
use std::sync::OnceLock;

/// `(code, bit length)` per symbol, index 256 is EOS
static CODES: [(u32, u8); 257] = [
    (0x1ff8, 13), (0x7fffd8, 23), (0xfffffe2, 28), (0xfffffe3, 28), // 0
    (0xfffffe4, 28), (0xfffffe5, 28), (0xfffffe6, 28), (0xfffffe7, 28), // 4
    (0xfffffe8, 28), (0xffffea, 24), (0x3ffffffc, 30), (0xfffffe9, 28), // 8
    (0xfffffea, 28), (0x3ffffffd, 30), (0xfffffeb, 28), (0xfffffec, 28), // 12
    (0xfffffed, 28), (0xfffffee, 28), (0xfffffef, 28), (0xffffff0, 28), // 16
    (0xffffff1, 28), (0xffffff2, 28), (0x3ffffffe, 30), (0xffffff3, 28), // 20
    (0xffffff4, 28), (0xffffff5, 28), (0xffffff6, 28), (0xffffff7, 28), // 24
    (0xffffff8, 28), (0xffffff9, 28), (0xffffffa, 28), (0xffffffb, 28), // 28
    (0x14, 6), (0x3f8, 10), (0x3f9, 10), (0xffa, 12), // 32
    (0x1ff9, 13), (0x15, 6), (0xf8, 8), (0x7fa, 11), // 36
    (0x3fa, 10), (0x3fb, 10), (0xf9, 8), (0x7fb, 11), // 40
    (0xfa, 8), (0x16, 6), (0x17, 6), (0x18, 6), // 44
    (0x0, 5), (0x1, 5), (0x2, 5), (0x19, 6), // 48
    (0x1a, 6), (0x1b, 6), (0x1c, 6), (0x1d, 6), // 52
    (0x1e, 6), (0x1f, 6), (0x5c, 7), (0xfb, 8), // 56
    (0x7ffc, 15), (0x20, 6), (0xffb, 12), (0x3fc, 10), // 60
    (0x1ffa, 13), (0x21, 6), (0x5d, 7), (0x5e, 7), // 64
    (0x5f, 7), (0x60, 7), (0x61, 7), (0x62, 7), // 68
    (0x63, 7), (0x64, 7), (0x65, 7), (0x66, 7), // 72
    (0x67, 7), (0x68, 7), (0x69, 7), (0x6a, 7), // 76
    (0x6b, 7), (0x6c, 7), (0x6d, 7), (0x6e, 7), // 80
    (0x6f, 7), (0x70, 7), (0x71, 7), (0x72, 7), // 84
    (0xfc, 8), (0x73, 7), (0xfd, 8), (0x1ffb, 13), // 88
    (0x7fff0, 19), (0x1ffc, 13), (0x3ffc, 14), (0x22, 6), // 92
    (0x7ffd, 15), (0x3, 5), (0x23, 6), (0x4, 5), // 96
    (0x24, 6), (0x5, 5), (0x25, 6), (0x26, 6), // 100
    (0x27, 6), (0x6, 5), (0x74, 7), (0x75, 7), // 104
    (0x28, 6), (0x29, 6), (0x2a, 6), (0x7, 5), // 108
    (0x2b, 6), (0x76, 7), (0x2c, 6), (0x8, 5), // 112
    (0x9, 5), (0x2d, 6), (0x77, 7), (0x78, 7), // 116
    (0x79, 7), (0x7a, 7), (0x7b, 7), (0x7ffe, 15), // 120
    (0x7fc, 11), (0x3ffd, 14), (0x1ffd, 13), (0xffffffc, 28), // 124
    (0xfffe6, 20), (0x3fffd2, 22), (0xfffe7, 20), (0xfffe8, 20), // 128
    (0x3fffd3, 22), (0x3fffd4, 22), (0x3fffd5, 22), (0x7fffd9, 23), // 132
    (0x3fffd6, 22), (0x7fffda, 23), (0x7fffdb, 23), (0x7fffdc, 23), // 136
    (0x7fffdd, 23), (0x7fffde, 23), (0xffffeb, 24), (0x7fffdf, 23), // 140
    (0xffffec, 24), (0xffffed, 24), (0x3fffd7, 22), (0x7fffe0, 23), // 144
    (0xffffee, 24), (0x7fffe1, 23), (0x7fffe2, 23), (0x7fffe3, 23), // 148
    (0x7fffe4, 23), (0x1fffdc, 21), (0x3fffd8, 22), (0x7fffe5, 23), // 152
    (0x3fffd9, 22), (0x7fffe6, 23), (0x7fffe7, 23), (0xffffef, 24), // 156
    (0x3fffda, 22), (0x1fffdd, 21), (0xfffe9, 20), (0x3fffdb, 22), // 160
    (0x3fffdc, 22), (0x7fffe8, 23), (0x7fffe9, 23), (0x1fffde, 21), // 164
    (0x7fffea, 23), (0x3fffdd, 22), (0x3fffde, 22), (0xfffff0, 24), // 168
    (0x1fffdf, 21), (0x3fffdf, 22), (0x7fffeb, 23), (0x7fffec, 23), // 172
    (0x1fffe0, 21), (0x1fffe1, 21), (0x3fffe0, 22), (0x1fffe2, 21), // 176
    (0x7fffed, 23), (0x3fffe1, 22), (0x7fffee, 23), (0x7fffef, 23), // 180
    (0xfffea, 20), (0x3fffe2, 22), (0x3fffe3, 22), (0x3fffe4, 22), // 184
    (0x7ffff0, 23), (0x3fffe5, 22), (0x3fffe6, 22), (0x7ffff1, 23), // 188
    (0x3ffffe0, 26), (0x3ffffe1, 26), (0xfffeb, 20), (0x7fff1, 19), // 192
    (0x3fffe7, 22), (0x7ffff2, 23), (0x3fffe8, 22), (0x1ffffec, 25), // 196
    (0x3ffffe2, 26), (0x3ffffe3, 26), (0x3ffffe4, 26), (0x7ffffde, 27), // 200
    (0x7ffffdf, 27), (0x3ffffe5, 26), (0xfffff1, 24), (0x1ffffed, 25), // 204
    (0x7fff2, 19), (0x1fffe3, 21), (0x3ffffe6, 26), (0x7ffffe0, 27), // 208
    (0x7ffffe1, 27), (0x3ffffe7, 26), (0x7ffffe2, 27), (0xfffff2, 24), // 212
    (0x1fffe4, 21), (0x1fffe5, 21), (0x3ffffe8, 26), (0x3ffffe9, 26), // 216
    (0xffffffd, 28), (0x7ffffe3, 27), (0x7ffffe4, 27), (0x7ffffe5, 27), // 220
    (0xfffec, 20), (0xfffff3, 24), (0xfffed, 20), (0x1fffe6, 21), // 224
    (0x3fffe9, 22), (0x1fffe7, 21), (0x1fffe8, 21), (0x7ffff3, 23), // 228
    (0x3fffea, 22), (0x3fffeb, 22), (0x1ffffee, 25), (0x1ffffef, 25), // 232
    (0xfffff4, 24), (0xfffff5, 24), (0x3ffffea, 26), (0x7ffff4, 23), // 236
    (0x3ffffeb, 26), (0x7ffffe6, 27), (0x3ffffec, 26), (0x3ffffed, 26), // 240
    (0x7ffffe7, 27), (0x7ffffe8, 27), (0x7ffffe9, 27), (0x7ffffea, 27), // 244
    (0x7ffffeb, 27), (0xffffffe, 28), (0x7ffffec, 27), (0x7ffffed, 27), // 248
    (0x7ffffee, 27), (0x7ffffef, 27), (0x7fffff0, 27), (0x3ffffee, 26), // 252
    (0x3fffffff, 30), // 256
];

const EOS: u16 = 256;

/// Node of the binary decode tree. Child index 0 means "no child": the root
/// is never anybody's child.
#[derive(Clone, Copy)]
enum Node {
    Branch { zero: u16, one: u16 },
    Symbol(u16),
}

fn decode_tree() -> &'static [Node] {
    static TREE: OnceLock<Vec<Node>> = OnceLock::new();
    TREE.get_or_init(build_tree)
}

fn build_tree() -> Vec<Node> {
    let mut nodes = Vec::with_capacity(512);
    nodes.push(Node::Branch { zero: 0, one: 0 });

    for (sym, &(code, len)) in CODES.iter().enumerate() {
        let mut at = 0usize;
        for shift in (0..len).rev() {
            let bit = (code >> shift) & 1;
            let (zero, one) = match nodes[at] {
                Node::Branch { zero, one } => (zero, one),
                // The table is prefix-free
                Node::Symbol(_) => unreachable!("prefix collision in Huffman table"),
            };
            let existing = if bit == 0 { zero } else { one };

            let next = if shift == 0 {
                nodes.push(Node::Symbol(sym as u16));
                (nodes.len() - 1) as u16
            } else if existing == 0 {
                nodes.push(Node::Branch { zero: 0, one: 0 });
                (nodes.len() - 1) as u16
            } else {
                existing
            };

            if existing == 0 || shift == 0 {
                nodes[at] = if bit == 0 {
                    Node::Branch { zero: next, one }
                } else {
                    Node::Branch { zero, one: next }
                };
            }
            at = next as usize;
        }
    }

    nodes
}

/// Number of bytes `src` occupies once Huffman coded
pub fn encoded_len(src: &[u8]) -> usize {
    let bits: usize = src.iter().map(|&b| CODES[b as usize].1 as usize).sum();
    bits.div_ceil(8)
}

/// Huffman code `src` and append it to `dst`
pub fn encode<B: BufMut>(src: &[u8], dst: &mut B) {
    let mut acc: u64 = 0;
    let mut pending = 0u32;

    for &byte in src {
        let (code, len) = CODES[byte as usize];
        acc = (acc << len) | code as u64;
        pending += len as u32;

        while pending >= 8 {
            pending -= 8;
            dst.put_u8((acc >> pending) as u8);
        }
    }

    if pending > 0 {
        let pad = 8 - pending;
        acc = (acc << pad) | ((1u64 << pad) - 1);
        dst.put_u8(acc as u8);
    }
}

/// Decode a Huffman coded string literal
pub fn decode(src: &[u8]) -> Result<Vec<u8>> {
    let tree = decode_tree();
    // Every code is at least 5 bits long
    let mut out = Vec::with_capacity(src.len() * 8 / 5);

    let mut at = 0usize;
    // Bits consumed since the last emitted symbol, and whether they were all 1s
    let mut tail_bits = 0u32;
    let mut tail_ones = true;

    for &byte in src {
        for shift in (0..8).rev() {
            let bit = (byte >> shift) & 1;
            let next = match tree[at] {
                Node::Branch { zero, one } => {
                    if bit == 0 {
                        zero
                    } else {
                        one
                    }
                }
                Node::Symbol(_) => unreachable!("walk restarts at the root after a symbol"),
            };
            if next == 0 {
                return Err(Error::format(ErrorCode::CompressionError, "invalid Huffman code"));
            }

            tail_bits += 1;
            tail_ones &= bit == 1;

            match tree[next as usize] {
                Node::Symbol(EOS) => {
                    return Err(Error::format(
                        ErrorCode::CompressionError,
                        "EOS symbol inside Huffman string",
                    ));
                }
                Node::Symbol(sym) => {
                    out.push(sym as u8);
                    at = 0;
                    tail_bits = 0;
                    tail_ones = true;
                }
                Node::Branch { .. } => at = next as usize,
            }
        }
    }

    if tail_bits > 7 {
        return Err(Error::format(
            ErrorCode::CompressionError,
            "Huffman padding longer than 7 bits",
        ));
    }
    if !tail_ones {
        return Err(Error::format(
            ErrorCode::CompressionError,
            "Huffman padding is not an EOS prefix",
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(src: &[u8]) -> Vec<u8> {
        let mut dst: Vec<u8> = Vec::new();
        encode(src, &mut dst);
        dst
    }

    #[test]
    fn test_rfc7541_c4_strings() {
        assert_eq!(
            encoded(b"www.example.com"),
            [0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff]
        );
        assert_eq!(encoded(b"no-cache"), [0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf]);
        assert_eq!(
            encoded(b"custom-key"),
            [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f]
        );
        assert_eq!(
            encoded(b"custom-value"),
            [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf]
        );
    }

    #[test]
    fn test_roundtrip() {
        let cases: &[&[u8]] = &[
            b"",
            b"a",
            b"302",
            b"private",
            b"Mon, 21 Oct 2013 20:13:21 GMT",
            b"https://www.example.com",
            b"foo=ASDJKHQKBZXOQWEOPIUAXQWEOIU; max-age=3600; version=1",
        ];
        for &case in cases {
            let enc = encoded(case);
            assert_eq!(enc.len(), encoded_len(case));
            assert_eq!(decode(&enc).unwrap(), case);
        }
    }

    #[test]
    fn test_all_byte_values() {
        let input: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encoded(&input)).unwrap(), input);
    }

    #[test]
    fn test_padding_must_be_ones() {
        // 'a' is 00011 (5 bits); pad with zeros instead of ones
        assert!(decode(&[0b0001_1000]).is_err());
        assert_eq!(decode(&[0b0001_1111]).unwrap(), b"a");
    }

    #[test]
    fn test_padding_longer_than_seven_bits() {
        // 'a' followed by a full byte of 1s: 13 padding bits
        assert!(decode(&[0b0001_1111, 0xff]).is_err());
        assert!(decode(&[0xff]).is_err());
    }

    #[test]
    fn test_eos_rejected() {
        // EOS is 30 one-bits; four 0xff bytes contain it
        let err = decode(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CompressionError));
    }
}
