//! HPACK static and dynamic tables (RFC 7541 Section 2.3)
//!
//! Index space: 1..=61 address the static table, 62.. address the dynamic
//! table newest first.

use super::HeaderField;
use bytes::Bytes;
use std::collections::VecDeque;

/// The 61-entry static table (RFC 7541 Appendix A), index 1 first
pub static STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// First index of the dynamic table
pub const DYNAMIC_BASE: usize = STATIC_TABLE.len() + 1;

/// Result of searching both tables for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Name and value both match the entry at this index
    Full(usize),
    /// Only the name matches the entry at this index
    Name(usize),
    None,
}

/// Per-connection, per-direction dynamic table
///
/// Invariant: `size() <= max_size()` after every mutation.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
    limit: usize,
}

impl DynamicTable {
    /// Create a table whose size and size limit are both `max_size`
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
            limit: max_size,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current size in octets (sum of name + value + 32 per entry)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current maximum size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Largest size a dynamic table size update may select
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the size limit, shrinking the table if it is now above it
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        if self.max_size > limit {
            self.set_max_size(limit);
        }
    }

    /// Change the maximum size, evicting oldest entries as needed
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to(max_size);
    }

    /// Insert a field as the newest entry.
    ///
    /// A field larger than the maximum size empties the table and is not
    /// added (RFC 7541 Section 4.4).
    pub fn insert(&mut self, field: HeaderField) {
        let field_size = field.size();
        if field_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }

        self.evict_to(self.max_size - field_size);
        self.size += field_size;
        self.entries.push_front(field);
    }

    fn evict_to(&mut self, target: usize) {
        while self.size > target {
            match self.entries.pop_back() {
                Some(evicted) => self.size -= evicted.size(),
                None => {
                    self.size = 0;
                    break;
                }
            }
        }
    }

    /// Entry by position in the dynamic table, 0 being the newest
    pub fn get(&self, position: usize) -> Option<&HeaderField> {
        self.entries.get(position)
    }

    /// Iterate entries, newest first
    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.entries.iter()
    }

    /// Resolve an absolute HPACK index against the static and dynamic tables
    pub fn field(&self, index: usize) -> Option<HeaderField> {
        match index {
            0 => None,
            i if i < DYNAMIC_BASE => {
                let (name, value) = STATIC_TABLE[i - 1];
                Some(HeaderField::raw(Bytes::from_static(name), Bytes::from_static(value)))
            }
            i => self.entries.get(i - DYNAMIC_BASE).cloned(),
        }
    }

    /// Search both tables, preferring a full match, then the lowest index
    pub fn find(&self, name: &[u8], value: &[u8]) -> Match {
        let mut name_match = None;

        for (i, &(n, v)) in STATIC_TABLE.iter().enumerate() {
            if n == name {
                if v == value {
                    return Match::Full(i + 1);
                }
                name_match.get_or_insert(i + 1);
            }
        }

        for (i, entry) in self.entries.iter().enumerate() {
            if entry.name() == name {
                if entry.value() == value {
                    return Match::Full(i + DYNAMIC_BASE);
                }
                name_match.get_or_insert(i + DYNAMIC_BASE);
            }
        }

        name_match.map_or(Match::None, Match::Name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &'static str, value: &'static str) -> HeaderField {
        HeaderField::new(name, value)
    }

    #[test]
    fn test_static_table_layout() {
        assert_eq!(STATIC_TABLE[0], (&b":authority"[..], &b""[..]));
        assert_eq!(STATIC_TABLE[1], (&b":method"[..], &b"GET"[..]));
        assert_eq!(STATIC_TABLE[60].0, b"www-authenticate");
        assert_eq!(DYNAMIC_BASE, 62);
    }

    #[test]
    fn test_insert_newest_first() {
        let mut table = DynamicTable::new(4096);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "2"));

        assert_eq!(table.field(62).unwrap().name(), b"x-b");
        assert_eq!(table.field(63).unwrap().name(), b"x-a");
        assert!(table.field(64).is_none());
        assert!(table.field(0).is_none());
        assert_eq!(table.size(), 2 * (3 + 1 + 32));
    }

    #[test]
    fn test_eviction_oldest_first() {
        // Room for exactly two 36-octet entries
        let mut table = DynamicTable::new(72);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "2"));
        table.insert(field("x-c", "3"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().name(), b"x-c");
        assert_eq!(table.get(1).unwrap().name(), b"x-b");
        assert!(table.size() <= table.max_size());
    }

    #[test]
    fn test_oversized_entry_clears_table() {
        let mut table = DynamicTable::new(40);
        table.insert(field("x-a", "1"));
        table.insert(field("x-much-too-long", "value"));
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_resize_evicts() {
        let mut table = DynamicTable::new(4096);
        for i in 0..10 {
            table.insert(HeaderField::new(format!("x-{}", i), "v"));
        }
        table.set_max_size(100);
        assert!(table.size() <= 100);
        assert_eq!(table.get(0).unwrap().name(), b"x-9");

        table.set_max_size(0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_limit_shrinks() {
        let mut table = DynamicTable::new(4096);
        table.insert(field("x-a", "1"));
        table.set_limit(16);
        assert_eq!(table.max_size(), 16);
        assert!(table.is_empty());
    }

    #[test]
    fn test_find() {
        let mut table = DynamicTable::new(4096);
        assert_eq!(table.find(b":method", b"GET"), Match::Full(2));
        assert_eq!(table.find(b":method", b"PUT"), Match::Name(2));
        assert_eq!(table.find(b"x-custom", b"1"), Match::None);

        table.insert(field("x-custom", "1"));
        assert_eq!(table.find(b"x-custom", b"1"), Match::Full(62));
        assert_eq!(table.find(b"x-custom", b"2"), Match::Name(62));
    }
}
