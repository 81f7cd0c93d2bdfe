use thiserror::Error;

/// Failure kinds from the on-disk reader, one per §7 of the design notes.
///
/// `BadBootSector`, `UnsupportedNtfsVersion`, `OutputWriteError` and any
/// `IoError` on the main volume handle are fatal to the caller. Everything
/// else is meant to be caught at a record/block granularity, logged once at
/// `warn` level, and the run continued.
#[derive(Debug, Error)]
pub enum IndxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("invalid boot sector: {0}")]
    BadBootSector(String),

    #[error("update sequence fixup mismatch at sub-block {index}")]
    FixupMismatch { index: usize },

    #[error("bad runlist: {0}")]
    BadRunlist(String),

    #[error("bad attribute: {0}")]
    BadAttribute(String),

    #[error("bad index block: {0}")]
    BadIndexBlock(String),

    #[error("unsupported NTFS version (expected 3.1): {0}")]
    UnsupportedNtfsVersion(String),

    #[error("output write error: {0}")]
    OutputWriteError(String),
}

pub type Result<T> = std::result::Result<T, IndxError>;
