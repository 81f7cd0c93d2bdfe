//! The NTFS update-sequence-array ("fixup") protection used on MFT records
//! and INDX blocks. Pure: mutates a caller-owned buffer, runs exactly once
//! per record/block. See `onuse-moses/filesystems/src/ntfs/mft.rs::apply_fixup`
//! for the teacher's version of the same algorithm (read-only direction).

use crate::error::{IndxError, Result};

const SECTOR_SIZE: usize = 512;

/// Verify and apply the update sequence array in place.
///
/// `usa_offset`/`usa_count` come straight off the record/block header. The
/// first entry of the array is the update sequence number (USN); the
/// remaining `usa_count - 1` entries are the original trailing two bytes of
/// each 512-byte sub-block, saved there before the on-disk copy had its
/// trailers overwritten with the USN.
pub fn apply_fixup(buffer: &mut [u8], usa_offset: u16, usa_count: u16) -> Result<()> {
    let usa_offset = usa_offset as usize;
    let usa_count = usa_count as usize;

    if usa_count == 0 {
        return Ok(());
    }

    let usa_len = usa_count * 2;
    if usa_offset + usa_len > buffer.len() {
        return Err(IndxError::BadAttribute(
            "update sequence array extends beyond buffer".to_string(),
        ));
    }

    let usn = [buffer[usa_offset], buffer[usa_offset + 1]];
    let sub_block_count = usa_count - 1;

    if sub_block_count * SECTOR_SIZE > buffer.len() {
        return Err(IndxError::BadAttribute(
            "update sequence array covers more sub-blocks than the buffer holds".to_string(),
        ));
    }

    for i in 0..sub_block_count {
        let trailer_offset = (i + 1) * SECTOR_SIZE - 2;
        let array_entry_offset = usa_offset + 2 + i * 2;
        let original = [buffer[array_entry_offset], buffer[array_entry_offset + 1]];

        if buffer[trailer_offset] != usn[0] || buffer[trailer_offset + 1] != usn[1] {
            return Err(IndxError::FixupMismatch { index: i });
        }

        buffer[trailer_offset] = original[0];
        buffer[trailer_offset + 1] = original[1];
    }

    Ok(())
}
