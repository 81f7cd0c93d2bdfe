//! MFT attribute parsing: the common header, resident/non-resident
//! bodies, and the handful of attribute types this tool cares about
//! (`$FILE_NAME`, `$ATTRIBUTE_LIST`, `$INDEX_ALLOCATION`, `$INDEX_ROOT`'s
//! block-size header field). Grounded in
//! `onuse-moses/formatters/src/ntfs/attributes.rs`, rewritten with
//! `byteorder` reads instead of `unsafe { ptr::read_unaligned }` — see
//! DESIGN.md for why.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{IndxError, Result};
use crate::reference::FileReference;
use crate::runlist::{decode_runlist, DataRun};

pub const ATTR_TYPE_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_TYPE_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_TYPE_FILE_NAME: u32 = 0x30;
pub const ATTR_TYPE_DATA: u32 = 0x80;
pub const ATTR_TYPE_INDEX_ROOT: u32 = 0x90;
pub const ATTR_TYPE_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_TYPE_END: u32 = 0xFFFF_FFFF;

/// Fixed portion of a resident `$FILE_NAME` attribute value, both as it
/// appears directly in an MFT record and as the embedded key of an index
/// entry (§3, §4.6) — the two are byte-identical.
pub const FILE_NAME_FIXED_SIZE: usize = 66;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
}

impl Namespace {
    pub fn from_u8(v: u8) -> Option<Namespace> {
        match v {
            0 => Some(Namespace::Posix),
            1 => Some(Namespace::Win32),
            2 => Some(Namespace::Dos),
            3 => Some(Namespace::Win32AndDos),
            _ => None,
        }
    }

    /// Best-name selection order (§3): Win32&DOS > Win32 > POSIX > DOS.
    /// Higher is better.
    pub fn priority(self) -> u8 {
        match self {
            Namespace::Win32AndDos => 3,
            Namespace::Win32 => 2,
            Namespace::Posix => 1,
            Namespace::Dos => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent: FileReference,
    pub created: u64,
    pub modified: u64,
    pub mft_changed: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
    pub namespace: Namespace,
    pub name: String,
}

/// Parse a `$FILE_NAME` attribute value (the 66-byte fixed header plus a
/// UTF-16LE name). Used both for MFT-resident `$FILE_NAME` attributes and
/// for the embedded key of an index entry — same layout either way.
pub fn parse_file_name(data: &[u8]) -> Result<FileNameAttribute> {
    if data.len() < FILE_NAME_FIXED_SIZE {
        return Err(IndxError::BadAttribute(
            "$FILE_NAME value shorter than its fixed header".to_string(),
        ));
    }

    let parent = FileReference(LittleEndian::read_u64(&data[0..8]));
    let created = LittleEndian::read_u64(&data[8..16]);
    let modified = LittleEndian::read_u64(&data[16..24]);
    let mft_changed = LittleEndian::read_u64(&data[24..32]);
    let accessed = LittleEndian::read_u64(&data[32..40]);
    let allocated_size = LittleEndian::read_u64(&data[40..48]);
    let real_size = LittleEndian::read_u64(&data[48..56]);
    let flags = LittleEndian::read_u32(&data[56..60]);
    // data[60..64] is the EA size / reparse tag union, unused here.
    let name_length = data[64] as usize;
    let namespace = Namespace::from_u8(data[65])
        .ok_or_else(|| IndxError::BadAttribute(format!("bad filename namespace byte {}", data[65])))?;

    let name_bytes_len = name_length * 2;
    if FILE_NAME_FIXED_SIZE + name_bytes_len > data.len() {
        return Err(IndxError::BadAttribute(
            "$FILE_NAME name runs past the attribute value".to_string(),
        ));
    }
    let name = parse_utf16le(&data[FILE_NAME_FIXED_SIZE..FILE_NAME_FIXED_SIZE + name_bytes_len])?;

    Ok(FileNameAttribute {
        parent,
        created,
        modified,
        mft_changed,
        accessed,
        allocated_size,
        real_size,
        flags,
        namespace,
        name,
    })
}

pub fn parse_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(IndxError::BadAttribute(
            "UTF-16 byte string has odd length".to_string(),
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| IndxError::BadAttribute("invalid UTF-16 in name".to_string()))
}

/// An attribute body, either held inline in the MFT record or described
/// by a runlist over the volume's clusters.
#[derive(Debug, Clone)]
pub enum AttributeBody {
    Resident(Vec<u8>),
    NonResident {
        runs: Vec<DataRun>,
        logical_size: u64,
        allocated_size: u64,
    },
}

/// One attribute instance as found in an MFT record, before type-specific
/// interpretation.
#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub type_code: u32,
    pub name: Option<String>,
    pub flags: u16,
    pub attribute_id: u16,
    pub body: AttributeBody,
}

/// Walk the attribute stream of an MFT record starting at `start_offset`,
/// stopping at the `0xFFFFFFFF` end marker or the record boundary (§4.4
/// step 2).
pub fn parse_attributes(record: &[u8], start_offset: usize) -> Result<Vec<RawAttribute>> {
    let mut attrs = Vec::new();
    let mut offset = start_offset;

    while offset + 4 <= record.len() {
        let type_code = LittleEndian::read_u32(&record[offset..offset + 4]);
        if type_code == ATTR_TYPE_END {
            break;
        }
        if offset + 16 > record.len() {
            return Err(IndxError::BadAttribute(
                "attribute header truncated at record end".to_string(),
            ));
        }

        let record_length = LittleEndian::read_u32(&record[offset + 4..offset + 8]);
        if record_length < 16 || offset + record_length as usize > record.len() {
            return Err(IndxError::BadAttribute(format!(
                "implausible attribute record_length {record_length} at offset {offset}"
            )));
        }

        let non_resident = record[offset + 8];
        let name_length = record[offset + 9] as usize;
        let name_offset = LittleEndian::read_u16(&record[offset + 10..offset + 12]) as usize;
        let flags = LittleEndian::read_u16(&record[offset + 12..offset + 14]);
        let attribute_id = LittleEndian::read_u16(&record[offset + 14..offset + 16]);

        let name = if name_length > 0 {
            let start = offset + name_offset;
            let end = start + name_length * 2;
            if end > record.len() {
                return Err(IndxError::BadAttribute(
                    "attribute name runs past record end".to_string(),
                ));
            }
            Some(parse_utf16le(&record[start..end])?)
        } else {
            None
        };

        let body = if non_resident == 0 {
            parse_resident_body(record, offset)?
        } else {
            parse_non_resident_body(record, offset)?
        };

        attrs.push(RawAttribute {
            type_code,
            name,
            flags,
            attribute_id,
            body,
        });

        offset += record_length as usize;
    }

    Ok(attrs)
}

fn parse_resident_body(record: &[u8], offset: usize) -> Result<AttributeBody> {
    if offset + 0x18 > record.len() {
        return Err(IndxError::BadAttribute(
            "resident attribute header truncated".to_string(),
        ));
    }
    let value_length = LittleEndian::read_u32(&record[offset + 0x10..offset + 0x14]) as usize;
    let value_offset = LittleEndian::read_u16(&record[offset + 0x14..offset + 0x16]) as usize;
    let start = offset + value_offset;
    let end = start.checked_add(value_length).ok_or_else(|| {
        IndxError::BadAttribute("resident attribute value length overflowed".to_string())
    })?;
    if end > record.len() {
        return Err(IndxError::BadAttribute(
            "resident attribute value runs past record end".to_string(),
        ));
    }
    Ok(AttributeBody::Resident(record[start..end].to_vec()))
}

fn parse_non_resident_body(record: &[u8], offset: usize) -> Result<AttributeBody> {
    if offset + 0x40 > record.len() {
        return Err(IndxError::BadAttribute(
            "non-resident attribute header truncated".to_string(),
        ));
    }
    let allocated_size = LittleEndian::read_u64(&record[offset + 0x28..offset + 0x30]);
    let logical_size = LittleEndian::read_u64(&record[offset + 0x30..offset + 0x38]);
    let runlist_offset = LittleEndian::read_u16(&record[offset + 0x20..offset + 0x22]) as usize;

    let record_length = LittleEndian::read_u32(&record[offset + 4..offset + 8]) as usize;
    let runs_start = offset + runlist_offset;
    let runs_end = offset + record_length;
    if runs_start > record.len() || runs_end > record.len() || runs_start > runs_end {
        return Err(IndxError::BadAttribute(
            "non-resident runlist bytes run past record end".to_string(),
        ));
    }

    let runs = decode_runlist(&record[runs_start..runs_end])?;
    Ok(AttributeBody::NonResident {
        runs,
        logical_size,
        allocated_size,
    })
}

/// Read just the `bytes_per_index_record` field out of a resident
/// `$INDEX_ROOT` value (offset 8, a `u32`). Per the Non-goal on parsing
/// `$INDEX_ROOT`, this never walks its embedded index entries — only this
/// one header field is ever looked at.
pub fn index_root_block_size(data: &[u8]) -> Result<u32> {
    if data.len() < 12 {
        return Err(IndxError::BadAttribute(
            "$INDEX_ROOT value shorter than its header".to_string(),
        ));
    }
    Ok(LittleEndian::read_u32(&data[8..12]))
}
