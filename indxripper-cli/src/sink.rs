//! `RecordSink` implementation: formats each record and writes it to the
//! output file, with optional line-level dedup (§4.8 dedup filter, §6
//! `--dedup`). Grounded in `onuse-moses/cli/src/main.rs`'s pattern of a
//! thin CLI-side struct wrapping a `std::fs` handle.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};

use indxripper_core::driver::{EmissionRecord, RecordSink};
use indxripper_core::error::{IndxError, Result};

use crate::format::{format_record, OutputFormat};

pub struct FileSink {
    writer: BufWriter<File>,
    format: OutputFormat,
    dedup: bool,
    seen: HashSet<String>,
}

impl FileSink {
    pub fn new(file: File, format: OutputFormat, dedup: bool) -> Self {
        FileSink {
            writer: BufWriter::new(file),
            format,
            dedup,
            seen: HashSet::new(),
        }
    }
}

impl RecordSink for FileSink {
    fn emit(&mut self, record: EmissionRecord) -> Result<()> {
        let line = format_record(&record, self.format);

        if self.dedup {
            if self.seen.contains(&line) {
                return Ok(());
            }
            self.seen.insert(line.clone());
        }

        writeln!(self.writer, "{line}")
            .map_err(|e| IndxError::OutputWriteError(e.to_string()))
    }
}
