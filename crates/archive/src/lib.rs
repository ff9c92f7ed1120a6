//! # Archive
//!
//! Workspace archives are exchanged as ZIP files, so they stay readable by
//! general-purpose tooling.
//!
//! Packing walks every include root depth-first. A path matching any exclude
//! pattern is skipped together with everything below it. A directory include
//! root contributes its own last path component as the top-level name inside
//! the archive, so `/tmp/work/output/a/b.txt` is stored as `output/a/b.txt`.
//! Directory entries are written with a trailing slash, which lets empty
//! directories survive a round trip. Permission bits travel with every entry.
//!
//! Unpacking restores every entry under the target directory, re-applying
//! the stored permission bits.
//!
//! Both directions hold at most one source and one destination file handle
//! open at a time, regardless of the tree size.

mod builder;
mod error;
mod extractor;
mod filter;
mod permissions;

pub use builder::{build_zip_archive, write_zip_archive, ArchiveSummary};
pub use error::ArchiveError;
pub use extractor::{extract_zip_archive, extract_zip_reader, ExtractSummary};
pub use filter::{ExcludeSpec, IncludeSpec};
