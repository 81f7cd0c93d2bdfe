//! Output pipeline (§4.8) and top-level driver (§4.9). Grounded in
//! `onuse-moses/cli/src/main.rs`'s top-level orchestration style (open →
//! inspect → act → report) and `onuse-moses/formatters/src/ntfs/mft.rs`'s
//! "read `$MFT` first to bootstrap everything else" sequencing.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::attributes::{AttributeBody, ATTR_TYPE_DATA};
use crate::catalogue::{build_catalogue, Catalogue, UNKNOWN_PATH};
use crate::error::{IndxError, Result};
use crate::index::{parse_index_block, CandidateSource, IndexCandidate};
use crate::mft::parse_mft_record;
use crate::reference::FileReference;
use crate::runlist::NonResidentReader;
use crate::volume::Volume;

pub const RECORD_MFT: u64 = 0;

/// §3 "Emission record": one row of output, before formatting.
#[derive(Debug, Clone)]
pub struct EmissionRecord {
    pub full_path: String,
    pub name: String,
    pub real_size: u64,
    pub allocated_size: u64,
    pub created: u64,
    pub modified: u64,
    pub mft_changed: u64,
    pub accessed: u64,
    pub source: CandidateSource,
    pub child_ref: FileReference,
    pub parent_ref_used: FileReference,
}

/// Destination for emitted records. `indxripper-cli` implements this to
/// format and optionally deduplicate; `indxripper-core` only ever produces
/// records, never formats them (§1 Non-goals: formatters are external
/// collaborators).
pub trait RecordSink {
    fn emit(&mut self, record: EmissionRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub partition_start_sector: u64,
    /// Path prefix prepended to every emitted `full_path` (§6 `-m`).
    pub path_prefix: String,
    /// §4.8 no-active-files filter.
    pub no_active_files: bool,
    /// §4.5: restrict the run to live directories only.
    pub skip_deleted_dirs: bool,
}

pub struct Driver {
    volume: Volume,
    options: RunOptions,
}

impl Driver {
    pub fn new(volume: Volume, options: RunOptions) -> Self {
        Driver { volume, options }
    }

    /// Run the full pipeline: build the catalogue, walk every directory's
    /// `$INDEX_ALLOCATION`, resolve paths, filter, and emit (§4.9).
    pub fn run(&mut self, sink: &mut dyn RecordSink) -> Result<()> {
        let mut catalogue = self.build_catalogue()?;
        let directory_records: Vec<u64> = catalogue
            .all_directory_records()
            .into_iter()
            .filter(|&rn| {
                if !self.options.skip_deleted_dirs {
                    return true;
                }
                catalogue.get(rn).map(|e| e.is_allocated).unwrap_or(false)
            })
            .collect();

        info!("walking {} directory records", directory_records.len());

        for directory_record in directory_records {
            if let Err(e) = self.process_directory(&mut catalogue, directory_record, sink) {
                warn!("directory {directory_record}: skipped ({e})");
            }
        }

        Ok(())
    }

    fn build_catalogue(&mut self) -> Result<Catalogue> {
        let mft_record_size = self.volume.mft_record_size as usize;
        let mut mft_record_zero = self
            .volume
            .read_at(self.volume.mft_start_offset, mft_record_size)?;
        let parsed = parse_mft_record(&mut mft_record_zero)?;

        let data_attr = parsed
            .attributes
            .iter()
            .find(|a| a.type_code == ATTR_TYPE_DATA && a.name.is_none())
            .ok_or_else(|| IndxError::BadAttribute("$MFT record has no $DATA attribute".to_string()))?;

        let (runs, logical_size) = match &data_attr.body {
            AttributeBody::NonResident { runs, logical_size, .. } => (runs.clone(), *logical_size),
            AttributeBody::Resident(_) => {
                return Err(IndxError::BadAttribute(
                    "$MFT's $DATA attribute is unexpectedly resident".to_string(),
                ))
            }
        };

        debug!("$MFT is {logical_size} bytes across {} runs", runs.len());
        build_catalogue(&mut self.volume, runs, logical_size)
    }

    fn process_directory(
        &mut self,
        catalogue: &mut Catalogue,
        directory_record: u64,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let entry = catalogue
            .get(directory_record)
            .cloned()
            .ok_or_else(|| IndxError::BadAttribute("directory vanished from catalogue".to_string()))?;

        let Some(handle) = entry.index_alloc_handle.clone() else {
            return Ok(());
        };

        let is_live = entry.is_allocated;
        let mft_record_count = catalogue.mft_record_count();

        let mut reader = NonResidentReader::new(&mut self.volume, handle.runs, handle.logical_size)?;
        let chunk_size = handle.index_block_size as usize;
        if chunk_size == 0 {
            return Err(IndxError::BadIndexBlock(
                "zero index_block_size".to_string(),
            ));
        }

        let chunk_count = (handle.logical_size as usize).div_ceil(chunk_size);
        let mut all_candidates: Vec<(Vec<IndexCandidate>, Option<FileReference>)> = Vec::new();

        for chunk_index in 0..chunk_count {
            let offset = (chunk_index * chunk_size) as u64;
            let mut buffer = reader.read(offset, chunk_size)?;
            if buffer.len() < chunk_size {
                buffer.resize(chunk_size, 0);
            }

            match parse_index_block(&mut buffer, directory_record, mft_record_count) {
                Ok(result) => all_candidates.push(result),
                Err(e) => {
                    warn!("directory {directory_record} chunk {chunk_index}: {e}");
                    continue;
                }
            }
        }
        drop(reader);

        let allocated_names: HashSet<(String, FileReference)> = all_candidates
            .iter()
            .flat_map(|(cands, _)| cands.iter())
            .filter(|c| c.source == CandidateSource::Allocated)
            .map(|c| (c.file_name.name.clone(), c.child_ref))
            .collect();

        for (candidates, chunk_parent_hint) in all_candidates {
            for candidate in candidates {
                if self.should_drop(&candidate, is_live, catalogue, &allocated_names) {
                    continue;
                }

                let (base_path, parent_ref_used) = if is_live {
                    (
                        catalogue.resolve_path(directory_record),
                        FileReference::new(directory_record, entry.sequence),
                    )
                } else {
                    match catalogue.resolve_parent_for_candidate(
                        directory_record,
                        entry.sequence,
                        chunk_parent_hint,
                    ) {
                        Some(path) => (path, chunk_parent_hint.unwrap_or(FileReference::ZERO)),
                        None => (UNKNOWN_PATH.to_string(), FileReference::ZERO),
                    }
                };

                let full_path = format!(
                    "{}{}/{}",
                    self.options.path_prefix, base_path, candidate.file_name.name
                );

                let record = EmissionRecord {
                    full_path,
                    name: candidate.file_name.name.clone(),
                    real_size: candidate.file_name.real_size,
                    allocated_size: candidate.file_name.allocated_size,
                    created: candidate.file_name.created,
                    modified: candidate.file_name.modified,
                    mft_changed: candidate.file_name.mft_changed,
                    accessed: candidate.file_name.accessed,
                    source: candidate.source,
                    child_ref: candidate.child_ref,
                    parent_ref_used,
                };
                sink.emit(record)?;
            }
        }

        Ok(())
    }

    /// §4.8 no-active-files filter. Only applies to live directories;
    /// deleted directories bypass it entirely.
    fn should_drop(
        &self,
        candidate: &IndexCandidate,
        directory_is_live: bool,
        catalogue: &Catalogue,
        allocated_names: &HashSet<(String, FileReference)>,
    ) -> bool {
        if !self.options.no_active_files || !directory_is_live {
            return false;
        }

        match candidate.source {
            CandidateSource::Slack => {
                allocated_names.contains(&(candidate.file_name.name.clone(), candidate.child_ref))
            }
            CandidateSource::Allocated => {
                let child_record = candidate.child_ref.record_number();
                catalogue
                    .get(child_record)
                    .map(|e| e.is_allocated && e.sequence == candidate.child_ref.sequence())
                    .unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_drop_slack_matching_allocated_entry() {
        // Smoke-test the matching logic directly, independent of a full volume.
        let mut allocated = HashSet::new();
        let child = FileReference::new(50, 1);
        allocated.insert(("dup.txt".to_string(), child));
        assert!(allocated.contains(&("dup.txt".to_string(), child)));
        assert!(!allocated.contains(&("other.txt".to_string(), child)));
    }
}
