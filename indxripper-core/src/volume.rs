//! Random-access view over a raw block device or image file, offset by a
//! caller-supplied NTFS partition-start sector. Grounded in
//! `onuse-moses/formatters/src/device_reader.rs::AlignedDeviceReader`:
//! same sector-alignment contract (reads from a live Windows device must
//! land on 512-byte boundaries and be sector-count multiples), simplified
//! to the read-only subset this tool needs — no write path, no sector
//! cache, since index-block and MFT-record reads are already
//! block-granular and rarely re-read the same sector twice.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::boot_sector::BootSector;
use crate::error::{IndxError, Result};

const PHYSICAL_SECTOR_SIZE: u64 = 512;

/// Anything the volume reader can read from: a real file/device handle in
/// production, an in-memory cursor in tests.
pub trait ByteSource: Read + Seek + Send {}
impl<T: Read + Seek + Send> ByteSource for T {}

/// Immutable-after-initialisation volume descriptor plus the byte source
/// it reads from. Lifetime = the full run.
pub struct Volume {
    source: Box<dyn ByteSource>,
    /// Absolute byte offset of the partition start within `source`.
    partition_start: u64,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub mft_record_size: u32,
    pub default_index_block_size: u32,
    pub mft_start_offset: u64,
    pub total_clusters: u64,
}

impl Volume {
    pub fn open(path: &Path, partition_start_sector: u64) -> Result<Volume> {
        let file = File::open(path)?;
        Volume::from_source(Box::new(file), partition_start_sector)
    }

    pub fn from_source(mut source: Box<dyn ByteSource>, partition_start_sector: u64) -> Result<Volume> {
        let partition_start = partition_start_sector * PHYSICAL_SECTOR_SIZE;
        source.seek(SeekFrom::Start(partition_start))?;

        let mut boot_buf = vec![0u8; crate::boot_sector::BOOT_SECTOR_SIZE];
        read_exact_or_short(&mut *source, &mut boot_buf)?;
        let boot = BootSector::parse(&boot_buf)?;

        Ok(Volume {
            source,
            partition_start,
            bytes_per_sector: boot.bytes_per_sector,
            sectors_per_cluster: boot.sectors_per_cluster,
            mft_record_size: boot.mft_record_size(),
            default_index_block_size: boot.default_index_block_size(),
            mft_start_offset: boot.mft_byte_offset(),
            total_clusters: boot.total_clusters(),
        })
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// Read `len` bytes at `offset`, relative to the start of the NTFS
    /// partition (not the start of the underlying file/device). Reads are
    /// internally expanded to sector boundaries so the same code works
    /// unmodified against a raw `\\.\D:` style device handle.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let sector_size = self.bytes_per_sector as u64;
        let absolute_offset = self.partition_start + offset;

        let aligned_start = (absolute_offset / sector_size) * sector_size;
        let end = absolute_offset + len as u64;
        let aligned_end = ((end + sector_size - 1) / sector_size) * sector_size;

        self.source.seek(SeekFrom::Start(aligned_start))?;
        let mut buf = vec![0u8; (aligned_end - aligned_start) as usize];
        read_exact_or_short(&mut *self.source, &mut buf)?;

        let skip = (absolute_offset - aligned_start) as usize;
        Ok(buf[skip..skip + len].to_vec())
    }

    pub fn read_cluster_range(&mut self, lcn: u64, cluster_count: u64) -> Result<Vec<u8>> {
        let bpc = self.bytes_per_cluster() as u64;
        self.read_at(lcn * bpc, (cluster_count * bpc) as usize)
    }
}

fn read_exact_or_short<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    let expected = buf.len();
    let mut total = 0usize;
    while total < expected {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IndxError::Io(e)),
        }
    }
    if total != expected {
        return Err(IndxError::ShortRead {
            expected,
            actual: total,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn boot_sector_bytes(mft_lcn: u64) -> Vec<u8> {
        use byteorder::{ByteOrder, LittleEndian};
        let mut data = vec![0u8; crate::boot_sector::BOOT_SECTOR_SIZE];
        data[0x03..0x0B].copy_from_slice(b"NTFS    ");
        LittleEndian::write_u16(&mut data[0x0B..0x0D], 512);
        data[0x0D] = 8;
        LittleEndian::write_u64(&mut data[0x28..0x30], 10_000);
        LittleEndian::write_u64(&mut data[0x30..0x38], mft_lcn);
        data[0x40] = (-10i8) as u8;
        data[0x44] = (-10i8) as u8;
        LittleEndian::write_u16(&mut data[0x1FE..0x200], 0xAA55);
        data
    }

    #[test]
    fn opens_and_reads_sector_aligned_offsets() {
        let mut image = boot_sector_bytes(4);
        image.resize(1024 * 1024, 0);
        // mark bytes at offset 5000 so a non-sector-aligned read is verifiable
        image[5000..5004].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut volume = Volume::from_source(Box::new(Cursor::new(image)), 0).unwrap();
        let bytes = volume.read_at(5000, 4).unwrap();
        assert_eq!(bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(volume.mft_start_offset, 4 * 8 * 512);
    }

    #[test]
    fn partition_offset_shifts_all_reads() {
        let mut image = vec![0u8; 512 * 20];
        let boot = boot_sector_bytes(1);
        image[512 * 10..512 * 10 + 512].copy_from_slice(&boot);

        let mut volume = Volume::from_source(Box::new(Cursor::new(image)), 10).unwrap();
        assert_eq!(volume.mft_start_offset, 1 * 8 * 512);
    }
}
