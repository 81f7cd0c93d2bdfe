//! MFT catalogue (§4.5) and path resolver (§4.7). Grounded in
//! `onuse-moses/formatters/src/ntfs/mft.rs`'s record-iteration loop,
//! generalized from "format N records" to "index every in-use record and
//! remember enough to answer path queries later".

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::attribute_list::parse_attribute_list;
use crate::attributes::{
    index_root_block_size, parse_file_name, AttributeBody, FileNameAttribute,
    RawAttribute, ATTR_TYPE_ATTRIBUTE_LIST, ATTR_TYPE_FILE_NAME, ATTR_TYPE_INDEX_ALLOCATION,
    ATTR_TYPE_INDEX_ROOT,
};
use crate::error::Result;
use crate::mft::{parse_mft_record, MftRecord, RECORD_ROOT};
use crate::reference::FileReference;
use crate::runlist::DataRun;
use crate::volume::Volume;

pub const ORPHAN_PATH: &str = "/$Orphan";
pub const NO_NAME: &str = "$NoName";
pub const UNKNOWN_PATH: &str = "<Unknown>";

/// A directory's `$INDEX_ALLOCATION`, held as a cheap handle: the runlist
/// and logical size, read lazily by the driver rather than materialised
/// at catalogue-build time.
#[derive(Debug, Clone)]
pub struct IndexAllocationHandle {
    pub runs: Vec<DataRun>,
    pub logical_size: u64,
    pub index_block_size: u32,
}

/// §3 "Directory catalogue entry", generalized to non-directory records
/// too (the catalogue indexes every in-use record; only directories carry
/// an `index_alloc_handle`).
#[derive(Debug, Clone)]
pub struct CatalogueEntry {
    pub record_number: u64,
    pub sequence: u16,
    pub is_allocated: bool,
    pub is_directory: bool,
    pub best_name: String,
    pub parent_ref: FileReference,
    pub index_alloc_handle: Option<IndexAllocationHandle>,
}

/// Index of every MFT record this run has seen, plus a lazily-populated
/// path cache. Built once by [`build_catalogue`], then shared read-only
/// with the index-block parser and path resolver.
pub struct Catalogue {
    entries: HashMap<u64, CatalogueEntry>,
    mft_record_count: u64,
    path_cache: HashMap<u64, PathCacheState>,
}

#[derive(Clone)]
enum PathCacheState {
    InProgress,
    Resolved(String),
}

impl Catalogue {
    pub fn get(&self, record_number: u64) -> Option<&CatalogueEntry> {
        self.entries.get(&record_number)
    }

    pub fn mft_record_count(&self) -> u64 {
        self.mft_record_count
    }

    /// All record numbers this catalogue knows about that are directories,
    /// live or deleted, in catalogue-iteration order.
    pub fn all_directory_records(&self) -> Vec<u64> {
        self.entries
            .values()
            .filter(|e| e.is_directory)
            .map(|e| e.record_number)
            .collect()
    }

    /// Resolve `record_number`'s absolute path, memoising the result.
    /// Cycle detection: a record marked "in progress" and revisited before
    /// it resolves is treated as an orphan (§4.5).
    pub fn resolve_path(&mut self, record_number: u64) -> String {
        if let Some(state) = self.path_cache.get(&record_number) {
            return match state {
                PathCacheState::Resolved(p) => p.clone(),
                PathCacheState::InProgress => ORPHAN_PATH.to_string(),
            };
        }

        if record_number == RECORD_ROOT {
            let path = String::new();
            self.path_cache
                .insert(record_number, PathCacheState::Resolved(path.clone()));
            return path;
        }

        self.path_cache
            .insert(record_number, PathCacheState::InProgress);

        let resolved = match self.entries.get(&record_number) {
            None => ORPHAN_PATH.to_string(),
            Some(entry) => {
                let entry = entry.clone();
                let parent_record = entry.parent_ref.record_number();
                let parent_matches_live = self
                    .entries
                    .get(&parent_record)
                    .map(|p| p.is_allocated && p.sequence == entry.parent_ref.sequence())
                    .unwrap_or(false);

                if parent_record == RECORD_ROOT || parent_matches_live {
                    let parent_path = self.resolve_path(parent_record);
                    format!("{parent_path}/{}", entry.best_name)
                } else {
                    ORPHAN_PATH.to_string()
                }
            }
        };

        self.path_cache
            .insert(record_number, PathCacheState::Resolved(resolved.clone()));
        resolved
    }

    /// Resolve a candidate's parent for path-resolver purposes (§4.7): the
    /// directory itself when live, or the chunk-parent-hint reference when
    /// the directory is deleted. Returns `None` when the hint doesn't
    /// resolve either, in which case the caller emits `<Unknown>`.
    pub fn resolve_parent_for_candidate(
        &mut self,
        directory_record: u64,
        directory_sequence: u16,
        chunk_parent_hint: Option<FileReference>,
    ) -> Option<String> {
        let directory_live = self
            .entries
            .get(&directory_record)
            .map(|e| e.is_allocated && e.sequence == directory_sequence)
            .unwrap_or(false);

        if directory_live {
            return Some(self.resolve_path(directory_record));
        }

        let hint = chunk_parent_hint?;
        let hint_record = hint.record_number();
        let hint_live = self
            .entries
            .get(&hint_record)
            .map(|e| e.is_allocated && e.sequence == hint.sequence())
            .unwrap_or(false);
        if !hint_live {
            return None;
        }
        Some(self.resolve_path(hint_record))
    }
}

/// Iterate every fixed-size slot of the `$MFT`'s own `$DATA` stream,
/// parsing each as an MFT record and indexing the in-use ones (§4.5, §4.9
/// step "build catalogue"). `mft_data` is the `$MFT`'s own non-resident
/// `$DATA` runlist, already resolved by the caller.
pub fn build_catalogue(
    volume: &mut Volume,
    mft_runs: Vec<DataRun>,
    mft_data_logical_size: u64,
) -> Result<Catalogue> {
    let record_size = volume.mft_record_size as u64;
    let mft_record_count = mft_data_logical_size / record_size;

    let mut reader = crate::runlist::NonResidentReader::new(volume, mft_runs, mft_data_logical_size)?;

    let mut entries: HashMap<u64, CatalogueEntry> = HashMap::new();
    // Base records, keyed by their own record number.
    let mut base_records: HashMap<u64, MftRecord> = HashMap::new();
    // Extension records, keyed by their own record number — looked up by
    // $ATTRIBUTE_LIST's `holding_record` in the second pass, which always
    // names an extension record, never the base record itself.
    let mut extension_records: HashMap<u64, MftRecord> = HashMap::new();

    for record_number in 0..mft_record_count {
        let offset = record_number * record_size;
        let mut buffer = match reader.read(offset, record_size as usize) {
            Ok(b) if b.len() == record_size as usize => b,
            Ok(_) => break, // truncated final slot
            Err(e) => {
                warn!("record {record_number}: read failed: {e}");
                continue;
            }
        };

        let record = match parse_mft_record(&mut buffer) {
            Ok(r) => r,
            Err(e) => {
                trace!("record {record_number}: rejected ({e})");
                continue;
            }
        };

        if record.header.record_number as u64 != record_number {
            trace!(
                "record {record_number}: header record_number mismatch ({}), keeping slot index",
                record.header.record_number
            );
        }

        if record.header.is_base_record() {
            base_records.insert(record_number, record);
        } else {
            extension_records.insert(record_number, record);
        }
    }

    debug!(
        "first pass indexed {} base records, {} extension records",
        base_records.len(),
        extension_records.len()
    );

    for (&record_number, record) in &base_records {
        let is_allocated = record.header.is_in_use();
        let is_directory = record.header.is_directory();
        let sequence = record.header.sequence;

        let mut attrs: Vec<&RawAttribute> = record.attributes.iter().collect();

        // Follow $ATTRIBUTE_LIST into extension records, if present, and
        // fold their attribute instances in (§4.4 step 4). `holding_record`
        // names an extension record's own number, never the base record's,
        // so extension records are looked up from the second-pass map built
        // for exactly this purpose.
        let attribute_list_entries: Vec<_> = record
            .attributes
            .iter()
            .filter(|a| a.type_code == ATTR_TYPE_ATTRIBUTE_LIST)
            .collect();

        let mut extension_attrs: Vec<RawAttribute> = Vec::new();
        for al_attr in attribute_list_entries {
            let data = match &al_attr.body {
                AttributeBody::Resident(bytes) => bytes.clone(),
                AttributeBody::NonResident { .. } => {
                    // Non-resident $ATTRIBUTE_LISTs are rare and require a
                    // volume handle this loop no longer holds mutably
                    // alongside `reader`; skip, matching §1's tolerance for
                    // best-effort catalogue construction.
                    continue;
                }
            };
            let mut list_entries = match parse_attribute_list(&data) {
                Ok(e) => e,
                Err(e) => {
                    warn!("record {record_number}: bad $ATTRIBUTE_LIST: {e}");
                    continue;
                }
            };
            // Same-type instances (a non-resident attribute split across
            // several extension records) concatenate in starting-VCN order.
            list_entries.sort_by_key(|e| (e.attribute_type, e.starting_vcn));

            for list_entry in list_entries {
                let ext_record_number = list_entry.holding_record.record_number();
                if ext_record_number == record_number {
                    continue; // already in `record.attributes`
                }
                let ext_record = extension_records
                    .get(&ext_record_number)
                    .or_else(|| base_records.get(&ext_record_number));
                if let Some(ext_record) = ext_record {
                    for attr in &ext_record.attributes {
                        if attr.type_code == list_entry.attribute_type {
                            extension_attrs.push(attr.clone());
                        }
                    }
                }
            }
        }
        attrs.extend(extension_attrs.iter());

        let file_names: Vec<FileNameAttribute> = attrs
            .iter()
            .filter(|a| a.type_code == ATTR_TYPE_FILE_NAME)
            .filter_map(|a| match &a.body {
                AttributeBody::Resident(bytes) => parse_file_name(bytes).ok(),
                AttributeBody::NonResident { .. } => None,
            })
            .collect();

        let best = file_names
            .iter()
            .max_by_key(|fna| fna.namespace.priority());

        let (best_name, parent_ref) = match best {
            Some(fna) => (fna.name.clone(), fna.parent),
            None => (NO_NAME.to_string(), FileReference::ZERO),
        };

        let index_alloc_handle = if is_directory {
            build_index_alloc_handle(&attrs)
        } else {
            None
        };

        entries.insert(
            record_number,
            CatalogueEntry {
                record_number,
                sequence,
                is_allocated,
                is_directory,
                best_name,
                parent_ref,
                index_alloc_handle,
            },
        );
    }

    Ok(Catalogue {
        entries,
        mft_record_count,
        path_cache: HashMap::new(),
    })
}

fn build_index_alloc_handle(attrs: &[&RawAttribute]) -> Option<IndexAllocationHandle> {
    let index_block_size = attrs
        .iter()
        .find(|a| a.type_code == ATTR_TYPE_INDEX_ROOT)
        .and_then(|a| match &a.body {
            AttributeBody::Resident(bytes) => index_root_block_size(bytes).ok(),
            AttributeBody::NonResident { .. } => None,
        })?;

    let index_alloc = attrs
        .iter()
        .find(|a| a.type_code == ATTR_TYPE_INDEX_ALLOCATION)?;

    match &index_alloc.body {
        AttributeBody::NonResident { runs, logical_size, .. } => Some(IndexAllocationHandle {
            runs: runs.clone(),
            logical_size: *logical_size,
            index_block_size,
        }),
        AttributeBody::Resident(_) => None,
    }
}
