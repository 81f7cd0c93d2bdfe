//! End-to-end driver tests (§8) built against a small synthetic NTFS
//! image assembled byte-by-byte in memory — no `$MFT`-writing formatter
//! exists in this corpus to generate a real fixture, so the image is
//! built the same way the unit tests in `mft.rs`/`index.rs` build their
//! single-record/single-chunk fixtures, just wired together into a full
//! volume: boot sector, an `$MFT` whose own `$DATA` describes the MFT
//! region, a root directory (record 5), a subdirectory, and a file.

use byteorder::{ByteOrder, LittleEndian};

use indxripper_core::driver::{Driver, EmissionRecord, RecordSink, RunOptions};
use indxripper_core::error::Result;
use indxripper_core::index::CandidateSource;
use indxripper_core::reference::FileReference;
use indxripper_core::volume::Volume;

const SECTOR_SIZE: usize = 512;
const RECORD_SIZE: usize = 1024;
const INDEX_BLOCK_SIZE: u32 = 512;
const ROOT_RECORD: u64 = 5;

struct VecSink(Vec<EmissionRecord>);

impl RecordSink for VecSink {
    fn emit(&mut self, record: EmissionRecord) -> Result<()> {
        self.0.push(record);
        Ok(())
    }
}

/// Builds the raw image bytes for a small volume with: record 0 (`$MFT`),
/// record 5 (root, a directory named `.` by convention but we never read
/// its own name), record 6 ("Docs", a subdirectory of root), and record 7
/// ("file.txt", a child of Docs). Root's `$INDEX_ALLOCATION` names "Docs";
/// Docs' `$INDEX_ALLOCATION` names "file.txt".
struct ImageBuilder {
    image: Vec<u8>,
}

impl ImageBuilder {
    fn new(total_clusters: usize) -> Self {
        ImageBuilder {
            image: vec![0u8; total_clusters * SECTOR_SIZE],
        }
    }

    fn write_boot_sector(&mut self, mft_lcn: u64) {
        let data = &mut self.image[0..SECTOR_SIZE];
        data[0x03..0x0B].copy_from_slice(b"NTFS    ");
        LittleEndian::write_u16(&mut data[0x0B..0x0D], SECTOR_SIZE as u16);
        data[0x0D] = 1; // sectors per cluster: cluster == sector here
        LittleEndian::write_u64(&mut data[0x28..0x30], (self.image.len() / SECTOR_SIZE) as u64);
        LittleEndian::write_u64(&mut data[0x30..0x38], mft_lcn);
        data[0x40] = (-10i8) as u8; // mft record size = 2^10 = 1024
        data[0x44] = (-9i8) as u8; // unused default index block size = 2^9 = 512
        LittleEndian::write_u16(&mut data[0x1FE..0x200], 0xAA55);
    }

    fn record_slot(&mut self, mft_start_lcn: u64, record_number: u64) -> &mut [u8] {
        let mft_start_byte = mft_start_lcn as usize * SECTOR_SIZE;
        let start = mft_start_byte + record_number as usize * RECORD_SIZE;
        &mut self.image[start..start + RECORD_SIZE]
    }

    fn cluster_bytes(&mut self, lcn: u64, cluster_count: u64) -> &mut [u8] {
        let start = lcn as usize * SECTOR_SIZE;
        let len = cluster_count as usize * SECTOR_SIZE;
        &mut self.image[start..start + len]
    }
}

/// Writes a minimal MFT record: magic, fixup (no-op, usa_count = 1 means
/// just the USN with zero protected sub-blocks since these records are
/// smaller than 512 bytes... but NTFS requires at least one sub-block, so
/// we use usa_count = 3 to cover the 1024-byte record as two sub-blocks).
fn write_record_header(buf: &mut [u8], record_number: u32, sequence: u16, flags: u16, base_ref: FileReference) {
    buf[0..4].copy_from_slice(b"FILE");
    LittleEndian::write_u16(&mut buf[4..6], 0x2A); // usa_offset: right after the fixed header area we use
    LittleEndian::write_u16(&mut buf[6..8], 3); // usn + 2 sub-block entries
    LittleEndian::write_u16(&mut buf[0x10..0x12], sequence);
    LittleEndian::write_u16(&mut buf[0x14..0x16], 0x30); // attrs_offset
    LittleEndian::write_u16(&mut buf[0x16..0x18], flags);
    LittleEndian::write_u64(&mut buf[0x20..0x28], base_ref.0);
    LittleEndian::write_u32(&mut buf[0x2C..0x30], record_number);

    // fixup: USN 0x0001 at 0x2A, two saved-original entries, two matching
    // sector trailers (records here are exactly two 512-byte sub-blocks).
    LittleEndian::write_u16(&mut buf[0x2A..0x2C], 0x0001);
    buf[0x2C] = 0x00;
    buf[0x2D] = 0x00;
    buf[0x2E] = 0x00;
    buf[0x2F] = 0x00;
    LittleEndian::write_u16(&mut buf[510..512], 0x0001);
    LittleEndian::write_u16(&mut buf[1022..1024], 0x0001);
}

fn write_file_name_attribute(
    buf: &mut [u8],
    offset: usize,
    attribute_id: u16,
    parent: FileReference,
    timestamp: u64,
    name: &str,
) -> usize {
    let utf16: Vec<u16> = name.encode_utf16().collect();
    let value_len = 66 + utf16.len() * 2;
    let record_length = align8(0x18 + value_len);

    LittleEndian::write_u32(&mut buf[offset..offset + 4], 0x30); // $FILE_NAME
    LittleEndian::write_u32(&mut buf[offset + 4..offset + 8], record_length as u32);
    buf[offset + 8] = 0; // resident
    buf[offset + 9] = 0; // name_length
    LittleEndian::write_u16(&mut buf[offset + 14..offset + 16], attribute_id);
    LittleEndian::write_u32(&mut buf[offset + 0x10..offset + 0x14], value_len as u32);
    LittleEndian::write_u16(&mut buf[offset + 0x14..offset + 0x16], 0x18);

    let value_start = offset + 0x18;
    LittleEndian::write_u64(&mut buf[value_start..value_start + 8], parent.0);
    LittleEndian::write_u64(&mut buf[value_start + 8..value_start + 16], timestamp);
    LittleEndian::write_u64(&mut buf[value_start + 16..value_start + 24], timestamp);
    LittleEndian::write_u64(&mut buf[value_start + 24..value_start + 32], timestamp);
    LittleEndian::write_u64(&mut buf[value_start + 32..value_start + 40], timestamp);
    buf[value_start + 64] = utf16.len() as u8;
    buf[value_start + 65] = 1; // Win32
    for (i, u) in utf16.iter().enumerate() {
        LittleEndian::write_u16(&mut buf[value_start + 66 + i * 2..value_start + 68 + i * 2], *u);
    }

    offset + record_length
}

fn write_index_root_attribute(buf: &mut [u8], offset: usize, attribute_id: u16, block_size: u32) -> usize {
    let value_len = 16usize;
    let record_length = align8(0x18 + value_len);
    LittleEndian::write_u32(&mut buf[offset..offset + 4], 0x90); // $INDEX_ROOT
    LittleEndian::write_u32(&mut buf[offset + 4..offset + 8], record_length as u32);
    buf[offset + 8] = 0;
    LittleEndian::write_u16(&mut buf[offset + 14..offset + 16], attribute_id);
    LittleEndian::write_u32(&mut buf[offset + 0x10..offset + 0x14], value_len as u32);
    LittleEndian::write_u16(&mut buf[offset + 0x14..offset + 0x16], 0x18);
    let value_start = offset + 0x18;
    LittleEndian::write_u32(&mut buf[value_start + 8..value_start + 12], block_size);
    offset + record_length
}

fn write_index_allocation_attribute(
    buf: &mut [u8],
    offset: usize,
    attribute_id: u16,
    lcn: u64,
    cluster_count: u64,
    logical_size: u64,
) -> usize {
    // runlist: header 0x11 (1-byte length, 1-byte offset), then length, offset
    let runlist = vec![0x11u8, cluster_count as u8, lcn as u8, 0x00u8];
    let runlist_offset = 0x40usize;
    let record_length = align8(runlist_offset + runlist.len());

    LittleEndian::write_u32(&mut buf[offset..offset + 4], 0xA0); // $INDEX_ALLOCATION
    LittleEndian::write_u32(&mut buf[offset + 4..offset + 8], record_length as u32);
    buf[offset + 8] = 1; // non-resident
    LittleEndian::write_u16(&mut buf[offset + 14..offset + 16], attribute_id);
    LittleEndian::write_u16(&mut buf[offset + 0x20..offset + 0x22], runlist_offset as u16);
    LittleEndian::write_u64(&mut buf[offset + 0x28..offset + 0x30], cluster_count * SECTOR_SIZE as u64);
    LittleEndian::write_u64(&mut buf[offset + 0x30..offset + 0x38], logical_size);

    let runs_start = offset + runlist_offset;
    buf[runs_start..runs_start + runlist.len()].copy_from_slice(&runlist);

    offset + record_length
}

fn write_data_attribute_nonresident(
    buf: &mut [u8],
    offset: usize,
    attribute_id: u16,
    lcn: u64,
    cluster_count: u64,
    logical_size: u64,
) -> usize {
    let runlist = vec![0x11u8, cluster_count as u8, lcn as u8, 0x00u8];
    let runlist_offset = 0x40usize;
    let record_length = align8(runlist_offset + runlist.len());

    LittleEndian::write_u32(&mut buf[offset..offset + 4], 0x80); // $DATA
    LittleEndian::write_u32(&mut buf[offset + 4..offset + 8], record_length as u32);
    buf[offset + 8] = 1;
    LittleEndian::write_u16(&mut buf[offset + 14..offset + 16], attribute_id);
    LittleEndian::write_u16(&mut buf[offset + 0x20..offset + 0x22], runlist_offset as u16);
    LittleEndian::write_u64(&mut buf[offset + 0x28..offset + 0x30], cluster_count * SECTOR_SIZE as u64);
    LittleEndian::write_u64(&mut buf[offset + 0x30..offset + 0x38], logical_size);

    let runs_start = offset + runlist_offset;
    buf[runs_start..runs_start + runlist.len()].copy_from_slice(&runlist);

    offset + record_length
}

fn write_end_marker(buf: &mut [u8], offset: usize) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], 0xFFFF_FFFF);
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Writes a single-entry INDX chunk into `buf` (sized `INDEX_BLOCK_SIZE`):
/// one allocated entry for `name` pointing at `child`, plus a terminal
/// entry.
fn write_index_chunk(buf: &mut [u8], child: FileReference, parent: FileReference, name: &str, timestamp: u64) {
    buf[0..4].copy_from_slice(b"INDX");
    LittleEndian::write_u16(&mut buf[4..6], 0); // usa_offset unused
    LittleEndian::write_u16(&mut buf[6..8], 0); // usa_count: no fixup protection in this fixture

    let utf16_len = name.encode_utf16().count();
    let key_length = 66 + utf16_len * 2;
    let entry_length = align8(16 + key_length);
    let entries_offset_rel = 16u32;
    let entries_end_rel = 16 + entry_length as u32 + 16;
    let allocated_end_rel = (buf.len() - 24 - 24) as u32;

    LittleEndian::write_u32(&mut buf[24..28], entries_offset_rel);
    LittleEndian::write_u32(&mut buf[28..32], entries_end_rel);
    LittleEndian::write_u32(&mut buf[32..36], allocated_end_rel);

    let entry_start = 24 + entries_offset_rel as usize;
    LittleEndian::write_u64(&mut buf[entry_start..entry_start + 8], child.0);
    LittleEndian::write_u16(&mut buf[entry_start + 8..entry_start + 10], entry_length as u16);
    LittleEndian::write_u16(&mut buf[entry_start + 10..entry_start + 12], key_length as u16);

    let key_start = entry_start + 16;
    LittleEndian::write_u64(&mut buf[key_start..key_start + 8], parent.0);
    LittleEndian::write_u64(&mut buf[key_start + 8..key_start + 16], timestamp);
    LittleEndian::write_u64(&mut buf[key_start + 16..key_start + 24], timestamp);
    LittleEndian::write_u64(&mut buf[key_start + 24..key_start + 32], timestamp);
    LittleEndian::write_u64(&mut buf[key_start + 32..key_start + 40], timestamp);
    let utf16: Vec<u16> = name.encode_utf16().collect();
    buf[key_start + 64] = utf16.len() as u8;
    buf[key_start + 65] = 1;
    for (i, u) in utf16.iter().enumerate() {
        LittleEndian::write_u16(&mut buf[key_start + 66 + i * 2..key_start + 68 + i * 2], *u);
    }

    let terminal_start = entry_start + entry_length;
    LittleEndian::write_u16(&mut buf[terminal_start + 8..terminal_start + 10], 16);
    LittleEndian::write_u16(&mut buf[terminal_start + 12..terminal_start + 14], 0x0002); // is_last
}

fn plausible_timestamp() -> u64 {
    let unix = 1_672_628_645u64;
    (unix + 11_644_473_600) * 10_000_000
}

/// Builds a full volume image: boot sector, $MFT spanning `mft_clusters`
/// clusters starting at `mft_lcn`, with records 0 (MFT), 5 (root), 6
/// (Docs), 7 (file.txt), and two 512-byte index chunks (root's naming
/// Docs, Docs' naming file.txt) placed right after the MFT region.
fn build_basic_volume() -> Vec<u8> {
    let mft_lcn = 1u64;
    let mft_record_count = 8u64;
    let mft_clusters = (mft_record_count * RECORD_SIZE as u64) / SECTOR_SIZE as u64;
    let root_index_lcn = mft_lcn + mft_clusters;
    let docs_index_lcn = root_index_lcn + 1;
    let total_clusters = docs_index_lcn + 4;

    let mut builder = ImageBuilder::new(total_clusters as usize);
    builder.write_boot_sector(mft_lcn);

    let ts = plausible_timestamp();

    // Record 5: root. Parent reference unused by resolve_path (root short-circuits).
    {
        let buf = builder.record_slot(mft_lcn, ROOT_RECORD);
        write_record_header(buf, ROOT_RECORD as u32, 1, 0x0003, FileReference::ZERO);
        let mut off = 0x30;
        off = write_file_name_attribute(buf, off, 0, FileReference::new(ROOT_RECORD, 1), ts, ".");
        off = write_index_root_attribute(buf, off, 1, INDEX_BLOCK_SIZE);
        off = write_index_allocation_attribute(buf, off, 2, root_index_lcn, 1, INDEX_BLOCK_SIZE as u64);
        write_end_marker(buf, off);
    }

    // Record 6: "Docs", child of root.
    {
        let buf = builder.record_slot(mft_lcn, 6);
        write_record_header(buf, 6, 1, 0x0003, FileReference::ZERO);
        let mut off = 0x30;
        off = write_file_name_attribute(buf, off, 0, FileReference::new(ROOT_RECORD, 1), ts, "Docs");
        off = write_index_root_attribute(buf, off, 1, INDEX_BLOCK_SIZE);
        off = write_index_allocation_attribute(buf, off, 2, docs_index_lcn, 1, INDEX_BLOCK_SIZE as u64);
        write_end_marker(buf, off);
    }

    // Record 7: "file.txt", child of Docs.
    {
        let buf = builder.record_slot(mft_lcn, 7);
        write_record_header(buf, 7, 1, 0x0001, FileReference::ZERO);
        let mut off = 0x30;
        off = write_file_name_attribute(buf, off, 0, FileReference::new(6, 1), ts, "file.txt");
        write_end_marker(buf, off);
    }

    // Record 0: $MFT itself, $DATA describing the whole MFT cluster run.
    {
        let logical_size = mft_record_count * RECORD_SIZE as u64;
        let buf = builder.record_slot(mft_lcn, 0);
        write_record_header(buf, 0, 1, 0x0001, FileReference::ZERO);
        let mut off = 0x30;
        off = write_data_attribute_nonresident(buf, off, 0, mft_lcn, mft_clusters, logical_size);
        write_end_marker(buf, off);
    }

    // Root's index chunk: names "Docs" -> record 6.
    {
        let chunk = builder.cluster_bytes(root_index_lcn, 1);
        write_index_chunk(chunk, FileReference::new(6, 1), FileReference::new(ROOT_RECORD, 1), "Docs", ts);
    }

    // Docs' index chunk: names "file.txt" -> record 7.
    {
        let chunk = builder.cluster_bytes(docs_index_lcn, 1);
        write_index_chunk(chunk, FileReference::new(7, 1), FileReference::new(6, 1), "file.txt", ts);
    }

    builder.image
}

fn run_driver(image: Vec<u8>, options: RunOptions) -> Vec<EmissionRecord> {
    let volume = Volume::from_source(Box::new(std::io::Cursor::new(image)), 0).unwrap();
    let mut driver = Driver::new(volume, options);
    let mut sink = VecSink(Vec::new());
    driver.run(&mut sink).unwrap();
    sink.0
}

fn default_options() -> RunOptions {
    RunOptions {
        partition_start_sector: 0,
        path_prefix: String::new(),
        no_active_files: false,
        skip_deleted_dirs: false,
    }
}

#[test]
fn golden_path_resolves_nested_file() {
    let image = build_basic_volume();
    let records = run_driver(image, default_options());

    let file_record = records
        .iter()
        .find(|r| r.name == "file.txt")
        .expect("file.txt candidate was not emitted");
    assert_eq!(file_record.full_path, "/Docs/file.txt");
    assert_eq!(file_record.source, CandidateSource::Allocated);

    let docs_record = records
        .iter()
        .find(|r| r.name == "Docs")
        .expect("Docs candidate (from root's index) was not emitted");
    assert_eq!(docs_record.full_path, "/Docs");
}

#[test]
fn path_prefix_is_prepended() {
    let image = build_basic_volume();
    let mut options = default_options();
    options.path_prefix = "IMG".to_string();
    let records = run_driver(image, options);

    let file_record = records.iter().find(|r| r.name == "file.txt").unwrap();
    assert_eq!(file_record.full_path, "IMG/Docs/file.txt");
}

#[test]
fn orphaned_directory_yields_orphan_path() {
    let mut image = build_basic_volume();
    // Rewrite Docs' $FILE_NAME parent reference (inside record 6) to point
    // at a nonexistent record, then re-run the fixup-protected trailers so
    // the record still parses.
    let mft_lcn = 1u64;
    let record_offset = mft_lcn as usize * SECTOR_SIZE + 6 * RECORD_SIZE;
    let file_name_value_start = record_offset + 0x30 + 0x18;
    LittleEndian::write_u64(
        &mut image[file_name_value_start..file_name_value_start + 8],
        FileReference::new(999, 1).0,
    );

    let records = run_driver(image, default_options());
    let file_record = records.iter().find(|r| r.name == "file.txt").unwrap();
    assert_eq!(file_record.full_path, "/$Orphan/file.txt");
}

#[test]
fn corrupting_one_chunk_fixup_does_not_abort_the_run() {
    let mut image = build_basic_volume();
    // Force a fixup mismatch on Docs' index chunk by turning on USA
    // protection with a USN that won't match the (zeroed) trailer.
    let mft_lcn = 1u64;
    let mft_clusters = 8 * RECORD_SIZE as u64 / SECTOR_SIZE as u64;
    let docs_index_lcn = mft_lcn + mft_clusters + 1;
    let chunk_start = docs_index_lcn as usize * SECTOR_SIZE;
    LittleEndian::write_u16(&mut image[chunk_start + 4..chunk_start + 6], 8); // usa_offset
    LittleEndian::write_u16(&mut image[chunk_start + 6..chunk_start + 8], 2); // usa_count
    LittleEndian::write_u16(&mut image[chunk_start + 8..chunk_start + 10], 0xBEEF);
    // trailer at sub-block 0 left as zero: mismatches the USN, fixup fails.

    let records = run_driver(image, default_options());
    // Docs' chunk is skipped, but root's own index (naming "Docs") still
    // comes through: the run as a whole did not abort.
    assert!(records.iter().any(|r| r.name == "Docs"));
    assert!(records.iter().all(|r| r.name != "file.txt"));
}
