use std::{io, path::PathBuf};

use derive_more::{Display, Error};
use zip::result::ZipError;

/// Errors that may occur while packing or unpacking an archive.
///
/// Every variant is terminal for the current operation: nothing is retried
/// and no partial result is reported as success.
#[derive(Debug, Display, Error)]
pub enum ArchiveError {
    /// No regular file survived the include and exclude filters.
    ///
    /// Directory entries alone do not make an archive.
    #[display(fmt = "no files selected for the archive")]
    NoFilesSelected,

    /// One of the exclude patterns is not a valid regular expression.
    #[display(fmt = "invalid exclude pattern: {}", _0)]
    InvalidExcludePattern(regex::Error),

    /// A selected file could not be read after it was discovered.
    #[display(fmt = "unable to read {}: {}", "path.display()", source)]
    SourceUnreadable {
        /// Path of the selected file or directory.
        path: PathBuf,

        /// Underlying IO error.
        source: io::Error,
    },

    /// The archive could not be created or written.
    #[display(fmt = "unable to write archive: {}", _0)]
    TargetUnwritable(io::Error),

    /// The archive container could not be opened or parsed.
    #[display(fmt = "corrupt archive: {}", _0)]
    CorruptArchive(ZipError),

    /// A directory or file could not be created under the extraction root.
    #[display(fmt = "unable to create {}: {}", "path.display()", source)]
    DestinationUnwritable {
        /// Path that could not be created.
        path: PathBuf,

        /// Underlying IO error.
        source: io::Error,
    },

    /// Copying the content or restoring permissions failed for an entry.
    #[display(fmt = "unable to extract entry {}: {}", name, source)]
    EntryWriteFailed {
        /// Archive entry name.
        name: String,

        /// Underlying IO error.
        source: io::Error,
    },

    /// Entry name is absolute or escapes the extraction root.
    #[display(fmt = "entry {} points outside of the target directory", name)]
    UnsafeEntryName {
        /// Archive entry name.
        name: String,
    },
}

impl ArchiveError {
    /// Wrap a [`zip`] writer failure.
    ///
    /// Writer errors are always about the output stream, so they are reported as
    /// [`ArchiveError::TargetUnwritable`].
    pub(crate) fn from_zip_writer(error: ZipError) -> Self {
        match error {
            ZipError::Io(error) => ArchiveError::TargetUnwritable(error),
            other => ArchiveError::TargetUnwritable(io::Error::new(io::ErrorKind::Other, other)),
        }
    }
}
