//! HPACK interoperability tests
//!
//! Header blocks produced by our encoder must decode with the independent
//! `hpack` crate and vice versa, with both sides' tables staying in step
//! across a sequence of blocks.

use h2wire::http::h2::hpack::{self as wire, DynamicTable, HeaderField, IndexingPolicy};

fn field(name: &str, value: &str) -> HeaderField {
    HeaderField::new(name.to_string(), value.to_string())
}

fn pairs(fields: &[HeaderField]) -> Vec<(Vec<u8>, Vec<u8>)> {
    fields.iter().map(|f| (f.name().to_vec(), f.value().to_vec())).collect()
}

/// The three requests of RFC 7541 Appendix C.3/C.4
fn request_sequence() -> Vec<Vec<HeaderField>> {
    vec![
        vec![
            field(":method", "GET"),
            field(":scheme", "http"),
            field(":path", "/"),
            field(":authority", "www.example.com"),
        ],
        vec![
            field(":method", "GET"),
            field(":scheme", "http"),
            field(":path", "/"),
            field(":authority", "www.example.com"),
            field("cache-control", "no-cache"),
        ],
        vec![
            field(":method", "GET"),
            field(":scheme", "https"),
            field(":path", "/index.html"),
            field(":authority", "www.example.com"),
            field("custom-key", "custom-value"),
        ],
    ]
}

/// Responses in the style of RFC 7541 Appendix C.5, which force evictions
/// from a 256-octet table
fn response_sequence() -> Vec<Vec<HeaderField>> {
    vec![
        vec![
            field(":status", "302"),
            field("cache-control", "private"),
            field("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            field("location", "https://www.example.com"),
        ],
        vec![
            field(":status", "307"),
            field("cache-control", "private"),
            field("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            field("location", "https://www.example.com"),
        ],
        vec![
            field(":status", "200"),
            field("cache-control", "private"),
            field("date", "Mon, 21 Oct 2013 20:13:22 GMT"),
            field("location", "https://www.example.com"),
            field("content-encoding", "gzip"),
            field("set-cookie", "foo=ASDJKHQKBZXOQWEOPIUAXQWEOIU; max-age=3600; version=1"),
        ],
    ]
}

#[test]
fn test_our_blocks_decode_with_hpack_crate() {
    let mut encoder = wire::Encoder::new(4096);
    let mut decoder = hpack::Decoder::new();

    for fields in request_sequence().iter().chain(response_sequence().iter()) {
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(fields, &mut block);
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, pairs(fields));
    }
}

#[test]
fn test_hpack_crate_blocks_decode_with_ours() {
    let mut encoder = hpack::Encoder::new();
    let mut decoder = wire::Decoder::new(4096);

    for fields in request_sequence().iter().chain(response_sequence().iter()) {
        let block = encoder.encode(fields.iter().map(|f| (f.name(), f.value())));
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(pairs(&decoded), pairs(fields));
    }
}

#[test]
fn test_rfc7541_c3_exact_bytes() {
    // C.3.1: without Huffman the first request is fully determined
    let expected: &[u8] = b"\x82\x86\x84\x41\x0fwww.example.com";
    let mut table = DynamicTable::new(4096);
    let fields = wire::decode(expected, &mut table).unwrap();
    assert_eq!(pairs(&fields), pairs(&request_sequence()[0]));
    assert_eq!(table.size(), 57);

    let mut reference = hpack::Decoder::new();
    assert_eq!(reference.decode(expected).unwrap(), pairs(&fields));
}

#[test]
fn test_rfc7541_c4_huffman_sequence() {
    let blocks: [&[u8]; 3] = [
        b"\x82\x86\x84\x41\x8c\xf1\xe3\xc2\xe5\xf2\x3a\x6b\xa0\xab\x90\xf4\xff",
        b"\x82\x86\x84\xbe\x58\x86\xa8\xeb\x10\x64\x9c\xbf",
        b"\x82\x87\x85\xbf\x40\x88\x25\xa8\x49\xe9\x5b\xa9\x7d\x7f\x89\x25\xa8\x49\xe9\x5b\xb8\xe8\xb4\xbf",
    ];

    // Our encoder reproduces the RFC bytes exactly
    let mut encoder = wire::Encoder::new(4096);
    for (fields, expected) in request_sequence().iter().zip(blocks.iter()) {
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(fields, &mut block);
        assert_eq!(&block[..], *expected);
    }
    assert_eq!(encoder.table().size(), 164);

    // Both decoders agree on them
    let mut ours = wire::Decoder::new(4096);
    let mut reference = hpack::Decoder::new();
    for (fields, block) in request_sequence().iter().zip(blocks.iter()) {
        let decoded = ours.decode(block).unwrap();
        assert_eq!(pairs(&decoded), pairs(fields));
        assert_eq!(reference.decode(block).unwrap(), pairs(fields));
    }
    assert_eq!(ours.table().size(), 164);
}

#[test]
fn test_tables_stay_in_step_with_evictions() {
    let mut decoder_table = DynamicTable::new(256);
    let mut encoder_table = DynamicTable::new(256);

    for fields in response_sequence() {
        let mut block: Vec<u8> = Vec::new();
        wire::encode(&fields, &mut encoder_table, IndexingPolicy::Permissive, &mut block);
        let decoded = wire::decode(&block, &mut decoder_table).unwrap();
        assert_eq!(decoded, fields);

        assert!(encoder_table.size() <= 256);
        assert_eq!(encoder_table.size(), decoder_table.size());
        let ours: Vec<&HeaderField> = encoder_table.iter().collect();
        let theirs: Vec<&HeaderField> = decoder_table.iter().collect();
        assert_eq!(ours, theirs);
    }
}

#[test]
fn test_protected_fields_never_indexed() {
    let mut encoder = wire::Encoder::with_policy(4096, IndexingPolicy::ProtectSensitive);
    let fields = vec![field("authorization", "Bearer secret"), field("accept", "*/*")];

    let mut block: Vec<u8> = Vec::new();
    encoder.encode(&fields, &mut block);
    assert_eq!(encoder.table().len(), 1);

    let mut reference = hpack::Decoder::new();
    assert_eq!(reference.decode(&block).unwrap(), pairs(&fields));
}
