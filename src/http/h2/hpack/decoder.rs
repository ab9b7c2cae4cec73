//! HPACK decoder

use super::table::DynamicTable;
use super::{decode_int, decode_string, HeaderField};
use crate::http::h2::error::{Error, ErrorCode, Result};

/// Bound on a decoded header list when no SETTINGS_MAX_HEADER_LIST_SIZE is set
pub const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 1 << 20;

/// Decode one complete header block, updating `table` as the peer's encoder
/// did.
///
/// Table size updates are accepted only before the first field and up to
/// `table.limit()`.
pub fn decode(block: &[u8], table: &mut DynamicTable) -> Result<Vec<HeaderField>> {
    decode_bounded(block, table, DEFAULT_MAX_HEADER_LIST_SIZE)
}

fn decode_bounded(mut block: &[u8], table: &mut DynamicTable, max_list_size: usize) -> Result<Vec<HeaderField>> {
    let mut fields = Vec::new();
    let mut list_size = 0usize;

    while let Some(&first) = block.first() {
        let field = if first & 0x80 != 0 {
            // Indexed header field, 1xxxxxxx
            let index = decode_int(&mut block, 7)?;
            lookup(table, index)?
        } else if first & 0x40 != 0 {
            // Literal with incremental indexing, 01xxxxxx
            let field = literal(&mut block, table, 6)?;
            table.insert(field.clone());
            field
        } else if first & 0x20 != 0 {
            // Dynamic table size update, 001xxxxx
            if !fields.is_empty() {
                return Err(Error::format(
                    ErrorCode::CompressionError,
                    "table size update after the first header field",
                ));
            }
            let size = decode_int(&mut block, 5)?;
            if size > table.limit() {
                return Err(Error::format(
                    ErrorCode::CompressionError,
                    format!("table size update to {} above limit {}", size, table.limit()),
                ));
            }
            table.set_max_size(size);
            continue;
        } else {
            // Never indexed 0001xxxx, or without indexing 0000xxxx
            literal(&mut block, table, 4)?
        };

        list_size += field.size();
        if list_size > max_list_size {
            return Err(Error::connection(
                ErrorCode::EnhanceYourCalm,
                format!("header list exceeds {} octets", max_list_size),
            ));
        }
        fields.push(field);
    }

    Ok(fields)
}

fn lookup(table: &DynamicTable, index: usize) -> Result<HeaderField> {
    table.field(index).ok_or_else(|| {
        Error::format(
            ErrorCode::CompressionError,
            format!("header index {} out of range", index),
        )
    })
}

fn literal(block: &mut &[u8], table: &DynamicTable, prefix_bits: u8) -> Result<HeaderField> {
    let name_index = decode_int(block, prefix_bits)?;
    let name = if name_index == 0 {
        decode_string(block)?
    } else {
        lookup(table, name_index)?.into_parts().0
    };
    let value = decode_string(block)?;
    Ok(HeaderField::raw(name, value))
}

/// Decoder side of a connection
#[derive(Debug)]
pub struct Decoder {
    table: DynamicTable,
    max_header_list_size: usize,
}

impl Decoder {
    /// Create a decoder for our own SETTINGS_HEADER_TABLE_SIZE
    pub fn new(max_table_size: usize) -> Self {
        Decoder {
            table: DynamicTable::new(max_table_size),
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
        }
    }

    /// Bound decoded header lists to `size` octets (RFC 7540 Section 6.5.2 sizing)
    pub fn set_max_header_list_size(&mut self, size: usize) {
        self.max_header_list_size = size;
    }

    /// Change the largest table size the peer may select
    pub fn set_max_table_size(&mut self, size: usize) {
        self.table.set_limit(size);
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Decode one complete header block
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        decode_bounded(block, &mut self.table, self.max_header_list_size)
    }
}
