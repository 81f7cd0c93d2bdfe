//! `$ATTRIBUTE_LIST` parsing: the indirection NTFS uses when a record's
//! attributes spread across extension records. Grounded in
//! `onuse-moses/formatters/src/ntfs/attribute_list.rs`.

use byteorder::{ByteOrder, LittleEndian};

use crate::attributes::parse_utf16le;
use crate::error::{IndxError, Result};
use crate::reference::FileReference;

#[derive(Debug, Clone)]
pub struct AttributeListEntry {
    pub attribute_type: u32,
    pub name: Option<String>,
    pub starting_vcn: u64,
    /// The record holding the actual attribute instance — may be this
    /// record's base, or an extension record entirely.
    pub holding_record: FileReference,
    pub attribute_id: u16,
}

/// Parse an `$ATTRIBUTE_LIST` attribute value into `(type, name,
/// starting_vcn, holding record reference)` tuples (§4.4 step 4).
pub fn parse_attribute_list(data: &[u8]) -> Result<Vec<AttributeListEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    const FIXED_HEADER_SIZE: usize = 26;

    while offset < data.len() {
        if offset + FIXED_HEADER_SIZE > data.len() {
            break;
        }

        let attribute_type = LittleEndian::read_u32(&data[offset..offset + 4]);
        let record_length = LittleEndian::read_u16(&data[offset + 4..offset + 6]) as usize;
        let name_length = data[offset + 6] as usize;
        let name_offset = data[offset + 7] as usize;
        let starting_vcn = LittleEndian::read_u64(&data[offset + 8..offset + 16]);
        let holding_record = FileReference(LittleEndian::read_u64(&data[offset + 16..offset + 24]));
        let attribute_id = LittleEndian::read_u16(&data[offset + 24..offset + 26]);

        if record_length < FIXED_HEADER_SIZE || offset + record_length > data.len() {
            return Err(IndxError::BadAttribute(
                "$ATTRIBUTE_LIST entry length runs past the attribute value".to_string(),
            ));
        }

        let name = if name_length > 0 {
            let start = offset + name_offset;
            let end = start + name_length * 2;
            if end > data.len() {
                return Err(IndxError::BadAttribute(
                    "$ATTRIBUTE_LIST entry name runs past the attribute value".to_string(),
                ));
            }
            Some(parse_utf16le(&data[start..end])?)
        } else {
            None
        };

        entries.push(AttributeListEntry {
            attribute_type,
            name,
            starting_vcn,
            holding_record,
            attribute_id,
        });

        offset += record_length;
    }

    Ok(entries)
}
