//! MFT record header parsing. Grounded in
//! `onuse-moses/formatters/src/ntfs/mft.rs` (fixup-then-parse sequencing)
//! and `onuse-moses/formatters/src/ntfs/structures.rs` (field layout).

use byteorder::{ByteOrder, LittleEndian};

use crate::attributes::{parse_attributes, RawAttribute};
use crate::error::{IndxError, Result};
use crate::fixup::apply_fixup;
use crate::reference::FileReference;

const MFT_RECORD_SIGNATURE: &[u8; 4] = b"FILE";
const MFT_RECORD_BAD_SIGNATURE: &[u8; 4] = b"BAAD";

pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;

pub const RECORD_ROOT: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct MftRecordHeader {
    pub sequence: u16,
    pub attrs_offset: u16,
    pub flags: u16,
    pub bytes_used: u32,
    pub base_file_record: FileReference,
    pub record_number: u32,
}

impl MftRecordHeader {
    pub fn is_in_use(&self) -> bool {
        self.flags & MFT_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & MFT_RECORD_IS_DIRECTORY != 0
    }

    pub fn is_base_record(&self) -> bool {
        self.base_file_record.0 == 0
    }
}

#[derive(Debug, Clone)]
pub struct MftRecord {
    pub header: MftRecordHeader,
    pub attributes: Vec<RawAttribute>,
}

/// Parse one fixed-size MFT record (§4.4). `buffer` is mutated in place by
/// the fixup pass. A "BAAD" signature or a mismatched fixup are both
/// treated as a rejected record — callers log and skip per §7.
pub fn parse_mft_record(buffer: &mut [u8]) -> Result<MftRecord> {
    if buffer.len() < 0x30 {
        return Err(IndxError::BadAttribute(
            "MFT record buffer smaller than its fixed header".to_string(),
        ));
    }

    let signature = &buffer[0..4];
    if signature == MFT_RECORD_BAD_SIGNATURE {
        return Err(IndxError::BadAttribute(
            "MFT record marked BAAD".to_string(),
        ));
    }
    if signature != MFT_RECORD_SIGNATURE {
        return Err(IndxError::BadAttribute(format!(
            "bad MFT record signature: {signature:?}"
        )));
    }

    let usa_offset = LittleEndian::read_u16(&buffer[4..6]);
    let usa_count = LittleEndian::read_u16(&buffer[6..8]);
    apply_fixup(buffer, usa_offset, usa_count)?;

    let sequence = LittleEndian::read_u16(&buffer[0x10..0x12]);
    let attrs_offset = LittleEndian::read_u16(&buffer[0x14..0x16]);
    let flags = LittleEndian::read_u16(&buffer[0x16..0x18]);
    let bytes_used = LittleEndian::read_u32(&buffer[0x18..0x1C]);
    let base_file_record = FileReference(LittleEndian::read_u64(&buffer[0x20..0x28]));
    let record_number = LittleEndian::read_u32(&buffer[0x2C..0x30]);

    let header = MftRecordHeader {
        sequence,
        attrs_offset,
        flags,
        bytes_used,
        base_file_record,
        record_number,
    };

    let attributes = parse_attributes(buffer, attrs_offset as usize)?;

    Ok(MftRecord { header, attributes })
}
