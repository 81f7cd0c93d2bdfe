//! The two output-line formatters (§6): CSV-like and `mactime`
//! bodyfile-like. Grounded in `onuse-moses/filesystems/src/ntfs/timestamps.rs`
//! for FILETIME → `chrono` conversion; the formats themselves have no
//! teacher counterpart (the teacher never emits CSV/bodyfile) and are
//! built directly from the field order in the spec's external-interfaces
//! section.

use chrono::{SecondsFormat, TimeZone, Utc};
use indxripper_core::driver::EmissionRecord;
use indxripper_core::index::CandidateSource;
use indxripper_core::timestamps::filetime_to_unix_seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Bodyfile,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<OutputFormat> {
        match s {
            "csv" => Some(OutputFormat::Csv),
            "bodyfile" => Some(OutputFormat::Bodyfile),
            _ => None,
        }
    }
}

pub fn format_record(record: &EmissionRecord, format: OutputFormat) -> String {
    match format {
        OutputFormat::Csv => format_csv(record),
        OutputFormat::Bodyfile => format_bodyfile(record),
    }
}

fn format_csv(record: &EmissionRecord) -> String {
    let source = match record.source {
        CandidateSource::Allocated => "ALLOCATED",
        CandidateSource::Slack => "SLACK",
    };

    let fields = [
        csv_field(&record.full_path),
        record.real_size.to_string(),
        record.allocated_size.to_string(),
        csv_field(&filetime_to_iso8601(record.created)),
        csv_field(&filetime_to_iso8601(record.modified)),
        csv_field(&filetime_to_iso8601(record.mft_changed)),
        csv_field(&filetime_to_iso8601(record.accessed)),
        source.to_string(),
        csv_field(&record.child_ref.to_string()),
    ];
    fields.join(",")
}

/// Double-quote a field per standard CSV if it contains a comma or a
/// double quote, doubling any embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn filetime_to_iso8601(filetime: u64) -> String {
    let unix_seconds = filetime_to_unix_seconds(filetime);
    match Utc.timestamp_opt(unix_seconds, 0).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        None => "1970-01-01T00:00:00.000000Z".to_string(),
    }
}

/// `0|full_path|0|0|0|0|size|atime|mtime|ctime|crtime`, mactime's bodyfile
/// layout with the unused inode/mode/uid/gid fields zeroed.
fn format_bodyfile(record: &EmissionRecord) -> String {
    let atime = filetime_to_unix_seconds(record.accessed);
    let mtime = filetime_to_unix_seconds(record.modified);
    let ctime = filetime_to_unix_seconds(record.mft_changed);
    let crtime = filetime_to_unix_seconds(record.created);

    format!(
        "0|{}|0|0|0|0|{}|{}|{}|{}|{}",
        record.full_path, record.real_size, atime, mtime, ctime, crtime
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use indxripper_core::reference::FileReference;

    fn sample_record() -> EmissionRecord {
        // 2023-01-02T03:04:05Z, matching the bodyfile fixture in §8.
        let unix = 1_672_628_645u64;
        let filetime = (unix + 11_644_473_600) * 10_000_000;
        EmissionRecord {
            full_path: "/X/Y.txt".to_string(),
            name: "Y.txt".to_string(),
            real_size: 4096,
            allocated_size: 4096,
            created: filetime,
            modified: filetime,
            mft_changed: filetime,
            accessed: filetime,
            source: CandidateSource::Allocated,
            child_ref: FileReference::new(10, 1),
            parent_ref_used: FileReference::new(5, 1),
        }
    }

    #[test]
    fn bodyfile_matches_fixture_line() {
        let line = format_bodyfile(&sample_record());
        assert_eq!(
            line,
            "0|/X/Y.txt|0|0|0|0|4096|1672628645|1672628645|1672628645|1672628645"
        );
    }

    #[test]
    fn csv_quotes_paths_with_commas() {
        let mut record = sample_record();
        record.full_path = "/X/a,b.txt".to_string();
        let line = format_csv(&record);
        assert!(line.starts_with("\"/X/a,b.txt\","));
    }

    #[test]
    fn csv_uses_allocated_or_slack_marker() {
        let mut record = sample_record();
        record.source = CandidateSource::Slack;
        let line = format_csv(&record);
        assert!(line.contains(",SLACK,"));
    }
}
