use std::{
    ffi::OsString,
    fs::{self, File, Metadata},
    io::{self, Read, Seek, Write},
    path::{Component, Path, PathBuf},
};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{
    filter::{ExcludeSpec, IncludeSpec},
    permissions::{self, permission_bits},
    ArchiveError,
};

/// Size of the buffer used to move file contents into the archive stream.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Entries written by a successful build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Count of file entries.
    pub files: usize,

    /// Count of directory entries.
    pub directories: usize,

    /// Total uncompressed size of file entries, in bytes.
    pub bytes: u64,
}

impl ArchiveSummary {
    /// Total count of written entries.
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Pack the include roots into a ZIP archive at `target`.
///
/// The archive is written to a staging file next to `target` and moved into
/// place only after the central directory has been flushed. On any error,
/// including [`ArchiveError::NoFilesSelected`], the staging file is removed
/// and `target` is left untouched.
///
/// Neither the staging file nor `target` itself are packed when an include
/// root happens to contain them.
///
/// The finished archive is readable by everyone, like any other build output.
pub fn build_zip_archive(
    includes: &IncludeSpec,
    excludes: &ExcludeSpec,
    target: &Path,
) -> Result<ArchiveSummary, ArchiveError> {
    let directory = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let staging = tempfile::Builder::new()
        .prefix(".archive")
        .suffix(".zip.part")
        .tempfile_in(directory)
        .map_err(ArchiveError::TargetUnwritable)?;

    let outputs = OutputFiles::new(directory, &[staging.path(), target])
        .map_err(ArchiveError::TargetUnwritable)?;

    let (staging, summary) = pack(staging, includes, excludes, &outputs)?;

    permissions::apply(staging.path(), permissions::ARCHIVE_MODE)
        .map_err(ArchiveError::TargetUnwritable)?;

    staging
        .persist(target)
        .map_err(|error| ArchiveError::TargetUnwritable(error.error))?;

    debug!(
        target = %target.display(),
        files = summary.files,
        directories = summary.directories,
        "archive written"
    );

    Ok(summary)
}

/// Pack the include roots into a ZIP archive written to an arbitrary stream.
///
/// Returns the inner writer positioned after the central directory.
pub fn write_zip_archive<W: Write + Seek>(
    writer: W,
    includes: &IncludeSpec,
    excludes: &ExcludeSpec,
) -> Result<(W, ArchiveSummary), ArchiveError> {
    pack(writer, includes, excludes, &OutputFiles::default())
}

fn pack<W: Write + Seek>(
    writer: W,
    includes: &IncludeSpec,
    excludes: &ExcludeSpec,
    outputs: &OutputFiles,
) -> Result<(W, ArchiveSummary), ArchiveError> {
    let mut archive = Packer {
        writer: ZipWriter::new(writer),
        excludes,
        outputs,
        summary: ArchiveSummary::default(),
    };

    for root in includes.paths() {
        let metadata = match fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %root.display(), "include path does not exist, skipping");
                continue;
            }
            Err(source) => {
                return Err(ArchiveError::SourceUnreadable {
                    path: root.clone(),
                    source,
                })
            }
        };

        if metadata.is_dir() {
            archive.add_directory_tree(root, &metadata)?;
        } else if metadata.is_file() {
            archive.add_root_file(root, &metadata)?;
        } else {
            debug!(path = %root.display(), "include path is not a regular file, skipping");
        }
    }

    if archive.summary.files == 0 {
        return Err(ArchiveError::NoFilesSelected);
    }

    let summary = archive.summary;
    let writer = archive
        .writer
        .finish()
        .map_err(ArchiveError::from_zip_writer)?;

    Ok((writer, summary))
}

/// Archive stream together with the filters applied to every visited path.
struct Packer<'a, W: Write + Seek> {
    /// Underlying ZIP stream.
    writer: ZipWriter<W>,

    /// Exclude patterns.
    excludes: &'a ExcludeSpec,

    /// Files produced by the current build.
    outputs: &'a OutputFiles,

    /// Entries written so far.
    summary: ArchiveSummary,
}

impl<'a, W: Write + Seek> Packer<'a, W> {
    /// A file include root is stored under its own file name.
    fn add_root_file(&mut self, path: &Path, metadata: &Metadata) -> Result<(), ArchiveError> {
        if self.excludes.is_excluded(path) || self.outputs.contains(path) {
            return Ok(());
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            warn!(path = %path.display(), "file name contains non-unicode symbols, skipping");
            return Ok(());
        };

        self.add_file(path, name, metadata)
    }

    /// Walk a directory include root depth-first.
    ///
    /// Entry names are anchored at the last component of `root`; roots without
    /// one (such as `.`) contribute their contents directly. An excluded
    /// directory is never descended into.
    ///
    /// The root entry itself is written from `metadata`, so a root reached
    /// through a symbolic link is stored as a directory.
    fn add_directory_tree(
        &mut self,
        root: &Path,
        metadata: &Metadata,
    ) -> Result<(), ArchiveError> {
        let excludes = self.excludes;

        if excludes.is_excluded(root) {
            return Ok(());
        }

        let base = root.file_name().map(PathBuf::from).unwrap_or_default();

        match base.to_str() {
            Some("") => {}
            Some(name) => self.add_directory(name, metadata)?,
            None => {
                warn!(path = %root.display(), "path contains non-unicode symbols, skipping");
                return Ok(());
            }
        }

        let mut entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !excludes.is_excluded(entry.path()));

        while let Some(entry) = entries.next().transpose().map_err(walk_error)? {
            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();

            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "symbolic link, skipping");
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };

            let Some(name) = entry_name(&base, relative) else {
                warn!(path = %entry.path().display(), "path contains non-unicode symbols, skipping");
                continue;
            };

            if file_type.is_dir() {
                let metadata = entry.metadata().map_err(walk_error)?;
                self.add_directory(&name, &metadata)?;
            } else if file_type.is_file() {
                if self.outputs.contains(entry.path()) {
                    continue;
                }

                let metadata = entry.metadata().map_err(walk_error)?;
                self.add_file(entry.path(), &name, &metadata)?;
            }
        }

        Ok(())
    }

    fn add_directory(&mut self, name: &str, metadata: &Metadata) -> Result<(), ArchiveError> {
        self.writer
            .add_directory(format!("{name}/"), entry_options(metadata))
            .map_err(ArchiveError::from_zip_writer)?;
        self.summary.directories += 1;

        Ok(())
    }

    /// Copy a single file into the archive.
    ///
    /// The source handle lives only for the duration of this call.
    fn add_file(
        &mut self,
        path: &Path,
        name: &str,
        metadata: &Metadata,
    ) -> Result<(), ArchiveError> {
        let mut source = File::open(path).map_err(|source| ArchiveError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        self.writer
            .start_file(name, entry_options(metadata))
            .map_err(ArchiveError::from_zip_writer)?;

        let copied = copy_contents(&mut source, path, &mut self.writer)?;

        self.summary.files += 1;
        self.summary.bytes += copied;

        Ok(())
    }
}

/// Copy `source` into `writer`, keeping read and write failures apart.
fn copy_contents<R: Read, W: Write>(
    source: &mut R,
    path: &Path,
    writer: &mut W,
) -> Result<u64, ArchiveError> {
    let mut buffer = vec![0; COPY_BUFFER_SIZE];
    let mut copied = 0;

    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ArchiveError::SourceUnreadable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        writer
            .write_all(&buffer[..read])
            .map_err(ArchiveError::TargetUnwritable)?;
        copied += read as u64;
    }
}

/// Build a forward-slash separated entry name from the base directory name and
/// a path relative to the include root.
///
/// Returns [`None`] if any component is not valid unicode.
fn entry_name(base: &Path, relative: &Path) -> Option<String> {
    base.components()
        .chain(relative.components())
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
}

fn entry_options(metadata: &Metadata) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(permission_bits(metadata))
        .large_file(metadata.len() >= u64::from(u32::MAX))
}

fn walk_error(error: walkdir::Error) -> ArchiveError {
    let path = error.path().map(Path::to_path_buf).unwrap_or_default();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));

    ArchiveError::SourceUnreadable { path, source }
}

/// Files written by the build itself, identified by directory and file name.
#[derive(Default)]
struct OutputFiles {
    /// Canonical directory holding the outputs.
    directory: Option<PathBuf>,

    /// Output file names.
    names: Vec<OsString>,
}

impl OutputFiles {
    fn new(directory: &Path, outputs: &[&Path]) -> io::Result<Self> {
        Ok(Self {
            directory: Some(fs::canonicalize(directory)?),
            names: outputs
                .iter()
                .filter_map(|path| path.file_name())
                .map(OsString::from)
                .collect(),
        })
    }

    fn contains(&self, path: &Path) -> bool {
        let Some(directory) = &self.directory else {
            return false;
        };

        let (Some(name), Some(parent)) = (path.file_name(), path.parent()) else {
            return false;
        };

        if !self.names.iter().any(|output| output == name) {
            return false;
        }

        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };

        fs::canonicalize(parent)
            .map(|parent| &parent == directory)
            .unwrap_or(false)
    }
}
