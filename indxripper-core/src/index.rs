//! `$INDEX_ALLOCATION` block parser (§4.6): chunked INDX parsing, the
//! allocated-entry walk, and the slack-region scanner. Grounded in
//! `onuse-moses/formatters/src/ntfs/index_updater.rs` for the INDX
//! header/node-header layout; the slack scanner itself has no teacher
//! counterpart (the teacher only ever writes fresh index blocks) and is
//! built from the acceptance rule directly, cross-checked against the
//! 66-byte `$FILE_NAME` layout already shared with `attributes.rs`.

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

use crate::attributes::{parse_file_name, FileNameAttribute, FILE_NAME_FIXED_SIZE};
use crate::error::{IndxError, Result};
use crate::fixup::apply_fixup;
use crate::reference::FileReference;
use crate::timestamps::is_plausible_filetime;

const INDX_MAGIC: &[u8; 4] = b"INDX";
/// Common header (24 bytes: magic, usa_offset, usa_count, lsn, vcn) plus
/// node header (16 bytes: entries_offset, entries_end_offset,
/// allocated_end_offset, flags), both relative to the start of the chunk.
const COMMON_HEADER_SIZE: usize = 24;
const NODE_HEADER_SIZE: usize = 16;
/// Fixed index-entry header: file_reference(8) + entry_length(2) +
/// key_length(2) + flags(2) + reserved(2).
const INDEX_ENTRY_HEADER_SIZE: usize = 16;
const MIN_INDEX_ENTRY_LENGTH: usize = INDEX_ENTRY_HEADER_SIZE;
const ENTRY_ALIGNMENT: usize = 8;

const ENTRY_FLAG_HAS_CHILD: u16 = 0x0001;
const ENTRY_FLAG_IS_LAST: u16 = 0x0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Allocated,
    Slack,
}

#[derive(Debug, Clone)]
pub struct IndexCandidate {
    pub source: CandidateSource,
    pub child_ref: FileReference,
    pub file_name: FileNameAttribute,
}

/// Parse one `$INDEX_ALLOCATION` chunk of `index_block_size` bytes
/// belonging to directory `directory_record` (§4.6). `buffer` is mutated
/// in place by the fixup pass. Returns the candidates found plus the
/// "chunk parent hint" (§4.6 step 4): the parent reference of the first
/// allocated entry, used by the path resolver for deleted directories.
///
/// A bad magic or a fixup mismatch is not an error at this granularity —
/// the caller logs and moves to the next chunk (§4.6 step 1-2, a deleted
/// directory's chunk may be overwritten by unrelated data).
pub fn parse_index_block(
    buffer: &mut [u8],
    directory_record: u64,
    mft_record_count: u64,
) -> Result<(Vec<IndexCandidate>, Option<FileReference>)> {
    if buffer.len() < COMMON_HEADER_SIZE + NODE_HEADER_SIZE {
        return Err(IndxError::BadIndexBlock(
            "chunk smaller than the fixed header".to_string(),
        ));
    }

    if &buffer[0..4] != INDX_MAGIC {
        return Err(IndxError::BadIndexBlock(format!(
            "bad INDX magic for directory {directory_record}"
        )));
    }

    let usa_offset = LittleEndian::read_u16(&buffer[4..6]);
    let usa_count = LittleEndian::read_u16(&buffer[6..8]);
    apply_fixup(buffer, usa_offset, usa_count)?;

    let node_header_start = COMMON_HEADER_SIZE;
    let entries_offset =
        node_header_start + LittleEndian::read_u32(&buffer[node_header_start..node_header_start + 4]) as usize;
    let entries_end_offset = node_header_start
        + LittleEndian::read_u32(&buffer[node_header_start + 4..node_header_start + 8]) as usize;
    let allocated_end_offset = node_header_start
        + LittleEndian::read_u32(&buffer[node_header_start + 8..node_header_start + 12]) as usize;

    if entries_offset > entries_end_offset
        || entries_end_offset > allocated_end_offset
        || allocated_end_offset > buffer.len()
    {
        return Err(IndxError::BadIndexBlock(format!(
            "implausible node header offsets for directory {directory_record}"
        )));
    }

    let mut candidates = Vec::new();
    let mut chunk_parent_hint = None;

    let mut offset = entries_offset;
    while offset + INDEX_ENTRY_HEADER_SIZE <= entries_end_offset {
        let file_reference = FileReference(LittleEndian::read_u64(&buffer[offset..offset + 8]));
        let entry_length = LittleEndian::read_u16(&buffer[offset + 8..offset + 10]) as usize;
        let key_length = LittleEndian::read_u16(&buffer[offset + 10..offset + 12]) as usize;
        let flags = LittleEndian::read_u16(&buffer[offset + 12..offset + 14]);

        if entry_length < INDEX_ENTRY_HEADER_SIZE || offset + entry_length > entries_end_offset {
            warn!("directory {directory_record}: implausible allocated entry length, stopping walk");
            break;
        }

        let is_last = flags & ENTRY_FLAG_IS_LAST != 0;
        if is_last || key_length == 0 {
            offset += entry_length;
            continue;
        }

        let key_start = offset + INDEX_ENTRY_HEADER_SIZE;
        let key_end = key_start + key_length;
        if key_end > offset + entry_length {
            warn!("directory {directory_record}: key length runs past entry, stopping walk");
            break;
        }

        match parse_file_name(&buffer[key_start..key_end]) {
            Ok(fna) => {
                if chunk_parent_hint.is_none() {
                    chunk_parent_hint = Some(fna.parent);
                }
                if file_reference.record_number() != 0 {
                    candidates.push(IndexCandidate {
                        source: CandidateSource::Allocated,
                        child_ref: file_reference,
                        file_name: fna,
                    });
                }
            }
            Err(e) => trace!("directory {directory_record}: allocated entry key unparsable: {e}"),
        }

        let _ = flags & ENTRY_FLAG_HAS_CHILD; // child VCN (sub-node pointer), not followed: flat scan only
        offset += entry_length;
    }

    let slack_candidates = scan_slack(
        buffer,
        entries_end_offset,
        allocated_end_offset,
        mft_record_count,
    );
    candidates.extend(slack_candidates);

    Ok((candidates, chunk_parent_hint))
}

/// Opportunistic scan of the slack region `[entries_end_offset,
/// allocated_end_offset)` (§4.6 step 5). At each candidate offset, attempt
/// to parse an index entry; on acceptance, advance by the declared length;
/// on rejection, advance by `ENTRY_ALIGNMENT` and retry.
fn scan_slack(
    buffer: &[u8],
    start: usize,
    end: usize,
    mft_record_count: u64,
) -> Vec<IndexCandidate> {
    let mut candidates = Vec::new();
    let mut offset = start;

    while offset + MIN_INDEX_ENTRY_LENGTH <= end {
        match try_parse_slack_entry(buffer, offset, end, mft_record_count) {
            Some((candidate, entry_length)) => {
                candidates.push(candidate);
                offset += entry_length;
            }
            None => offset += ENTRY_ALIGNMENT,
        }
    }

    candidates
}

fn try_parse_slack_entry(
    buffer: &[u8],
    offset: usize,
    end: usize,
    mft_record_count: u64,
) -> Option<(IndexCandidate, usize)> {
    let file_reference = FileReference(LittleEndian::read_u64(buffer.get(offset..offset + 8)?));
    let entry_length = LittleEndian::read_u16(buffer.get(offset + 8..offset + 10)?) as usize;
    let key_length = LittleEndian::read_u16(buffer.get(offset + 10..offset + 12)?) as usize;

    if entry_length < MIN_INDEX_ENTRY_LENGTH || offset + entry_length > end {
        return None;
    }
    if key_length == 0 || key_length < FILE_NAME_FIXED_SIZE {
        return None;
    }

    let key_start = offset + INDEX_ENTRY_HEADER_SIZE;
    let key_end = key_start + key_length;
    if key_end > offset + entry_length {
        return None;
    }

    let key_bytes = buffer.get(key_start..key_end)?;
    let fna = parse_file_name(key_bytes).ok()?;

    if fna.name.is_empty() || fna.name.encode_utf16().count() > 255 {
        return None;
    }
    if !is_plausible_filetime(fna.created)
        || !is_plausible_filetime(fna.modified)
        || !is_plausible_filetime(fna.mft_changed)
        || !is_plausible_filetime(fna.accessed)
    {
        return None;
    }

    let child_record_number = file_reference.record_number();
    if child_record_number == 0 {
        return None;
    }
    if child_record_number > mft_record_count {
        return None;
    }

    Some((
        IndexCandidate {
            source: CandidateSource::Slack,
            child_ref: file_reference,
            file_name: fna,
        },
        entry_length,
    ))
}
