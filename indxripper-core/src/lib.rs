//! NTFS forensic carving: reconstructs full paths for both allocated and
//! slack-resident index entries found in the `$INDEX_ALLOCATION` of every
//! directory on a volume. See `driver::Driver` for the entry point.

pub mod attribute_list;
pub mod attributes;
pub mod boot_sector;
pub mod catalogue;
pub mod driver;
pub mod error;
pub mod fixup;
pub mod index;
pub mod mft;
pub mod reference;
pub mod runlist;
pub mod timestamps;
pub mod volume;

pub use catalogue::{Catalogue, CatalogueEntry};
pub use driver::{Driver, EmissionRecord, RecordSink, RunOptions};
pub use error::{IndxError, Result};
pub use reference::FileReference;
pub use volume::Volume;
