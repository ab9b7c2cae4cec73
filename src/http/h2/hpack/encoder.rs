//! HPACK encoder

use super::table::{DynamicTable, Match};
use super::{encode_int, encode_string, HeaderField, IndexingPolicy};
use bytes::BufMut;

/// Encode `fields` into `dst`, updating `table` exactly as the peer's
/// decoder will.
///
/// Per field: an identical entry is emitted as an index; otherwise a literal
/// with an indexed name when one exists. Literals are added to the table with
/// incremental indexing unless `policy` marks the field sensitive (sent never
/// indexed) or the field could not fit in the table at all (sent without
/// indexing).
pub fn encode<'a, I, B>(fields: I, table: &mut DynamicTable, policy: IndexingPolicy, dst: &mut B)
where
    I: IntoIterator<Item = &'a HeaderField>,
    B: BufMut,
{
    for field in fields {
        encode_field(field, table, policy, dst);
    }
}

fn encode_field<B: BufMut>(field: &HeaderField, table: &mut DynamicTable, policy: IndexingPolicy, dst: &mut B) {
    let found = table.find(field.name(), field.value());

    if let Match::Full(index) = found {
        // Indexed header field, 1xxxxxxx
        encode_int(index, 7, 0x80, dst);
        return;
    }

    let name_index = match found {
        Match::Name(index) => index,
        _ => 0,
    };

    let (prefix_bits, pattern, index) = if policy.is_sensitive(field.name()) {
        // Never indexed, 0001xxxx
        (4, 0x10, false)
    } else if field.size() > table.max_size() {
        // Without indexing, 0000xxxx
        (4, 0x00, false)
    } else {
        // Incremental indexing, 01xxxxxx
        (6, 0x40, true)
    };

    encode_int(name_index, prefix_bits, pattern, dst);
    if name_index == 0 {
        encode_string(field.name(), dst);
    }
    encode_string(field.value(), dst);

    if index {
        table.insert(field.clone());
    }
}

/// Encoder side of a connection: the encoder table plus pending table size
/// updates requested by the peer's SETTINGS_HEADER_TABLE_SIZE.
#[derive(Debug)]
pub struct Encoder {
    table: DynamicTable,
    policy: IndexingPolicy,
    /// Smallest and latest size requested since the last block
    pending_resize: Option<(usize, usize)>,
}

impl Encoder {
    /// Create an encoder for a peer advertising `max_table_size`
    pub fn new(max_table_size: usize) -> Self {
        Self::with_policy(max_table_size, IndexingPolicy::default())
    }

    pub fn with_policy(max_table_size: usize, policy: IndexingPolicy) -> Self {
        Encoder {
            table: DynamicTable::new(max_table_size),
            policy,
            pending_resize: None,
        }
    }

    pub fn policy(&self) -> IndexingPolicy {
        self.policy
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Record a new SETTINGS_HEADER_TABLE_SIZE from the peer.
    ///
    /// The change is signalled at the start of the next header block; if the
    /// size went down and back up in between, the smallest value is signalled
    /// first so the peer evicts the same entries we do (RFC 7541 Section 4.2).
    pub fn set_max_table_size(&mut self, size: usize) {
        self.pending_resize = match self.pending_resize {
            Some((smallest, _)) => Some((smallest.min(size), size)),
            None if size == self.table.max_size() => None,
            None => Some((size, size)),
        };
    }

    /// Encode one header block
    pub fn encode<'a, I, B>(&mut self, fields: I, dst: &mut B)
    where
        I: IntoIterator<Item = &'a HeaderField>,
        B: BufMut,
    {
        if let Some((smallest, latest)) = self.pending_resize.take() {
            if smallest < latest {
                self.emit_size_update(smallest, dst);
            }
            self.emit_size_update(latest, dst);
        }

        encode(fields, &mut self.table, self.policy, dst);
    }

    fn emit_size_update<B: BufMut>(&mut self, size: usize, dst: &mut B) {
        log::trace!("hpack: dynamic table size update to {}", size);
        self.table.set_limit(size);
        self.table.set_max_size(size);
        // Dynamic table size update, 001xxxxx
        encode_int(size, 5, 0x20, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::hpack::Decoder;

    fn fields(pairs: &[(&'static str, &'static str)]) -> Vec<HeaderField> {
        pairs.iter().map(|&(n, v)| HeaderField::new(n, v)).collect()
    }

    #[test]
    fn test_rfc7541_c4_first_request() {
        // RFC 7541 C.4.1
        let mut encoder = Encoder::new(4096);
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(
            &fields(&[
                (":method", "GET"),
                (":scheme", "http"),
                (":path", "/"),
                (":authority", "www.example.com"),
            ]),
            &mut block,
        );
        assert_eq!(
            block,
            [
                0x82, 0x86, 0x84, 0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90,
                0xf4, 0xff
            ]
        );
        assert_eq!(encoder.table().size(), 57);
    }

    #[test]
    fn test_repeat_uses_dynamic_index() {
        let mut encoder = Encoder::new(4096);
        let headers = fields(&[("x-token", "abc")]);

        let mut first: Vec<u8> = Vec::new();
        encoder.encode(&headers, &mut first);
        let mut second: Vec<u8> = Vec::new();
        encoder.encode(&headers, &mut second);

        assert_eq!(second, [0x80 | 62]);
        assert!(second.len() < first.len());
    }

    #[test]
    fn test_protect_sensitive_never_indexes() {
        let mut encoder = Encoder::with_policy(4096, IndexingPolicy::ProtectSensitive);
        let headers = fields(&[("authorization", "Bearer secret")]);

        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&headers, &mut block);
        // Never indexed with static name index 23: 0001 1111 0000 1000
        assert_eq!(&block[..2], &[0x1f, 0x08]);
        assert!(encoder.table().is_empty());

        let mut decoder = Decoder::new(4096);
        assert_eq!(decoder.decode(&block).unwrap(), headers);
        assert!(decoder.table().is_empty());
    }

    #[test]
    fn test_permissive_indexes_credentials() {
        let mut encoder = Encoder::new(4096);
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[("cookie", "a=b")]), &mut block);
        assert_eq!(encoder.table().len(), 1);
    }

    #[test]
    fn test_oversized_field_not_indexed() {
        let mut encoder = Encoder::new(64);
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[("x-big", "0123456789012345678901234567890123456789")]), &mut block);
        assert_eq!(block[0], 0x00);
        assert!(encoder.table().is_empty());
    }

    #[test]
    fn test_size_update_emitted_once() {
        let mut encoder = Encoder::new(4096);
        encoder.set_max_table_size(256);

        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[(":method", "GET")]), &mut block);
        // 256 with a 5-bit prefix: 0x3f, 256 - 31 = 225 -> 0xe1 0x01
        assert_eq!(block, [0x3f, 0xe1, 0x01, 0x82]);
        assert_eq!(encoder.table().max_size(), 256);

        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[(":method", "GET")]), &mut block);
        assert_eq!(block, [0x82]);
    }

    #[test]
    fn test_size_update_shrink_then_grow() {
        let mut encoder = Encoder::new(4096);
        encoder.encode(&fields(&[("x-a", "1")]), &mut Vec::<u8>::new());

        encoder.set_max_table_size(0);
        encoder.set_max_table_size(4096);

        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[("x-a", "1")]), &mut block);
        // 0 then 4096, and the old entry is gone
        assert_eq!(&block[..4], &[0x20, 0x3f, 0xe1, 0x1f]);
        assert_eq!(block[4], 0x40);
    }

    #[test]
    fn test_unchanged_size_is_not_signalled() {
        let mut encoder = Encoder::new(4096);
        encoder.set_max_table_size(4096);
        let mut block: Vec<u8> = Vec::new();
        encoder.encode(&fields(&[(":path", "/")]), &mut block);
        assert_eq!(block, [0x84]);
    }
}
