use std::{
    cmp::Reverse,
    fs::{self, File},
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use tracing::debug;
use zip::{result::ZipError, ZipArchive};

use crate::{
    permissions::{self, PERMISSION_MASK},
    ArchiveError,
};

/// Entries restored by a successful extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Count of extracted files.
    pub files: usize,

    /// Count of created directories.
    pub directories: usize,
}

/// Extract the ZIP archive stored at `archive` into `target_dir`.
pub fn extract_zip_archive(
    archive: &Path,
    target_dir: &Path,
) -> Result<ExtractSummary, ArchiveError> {
    let file = File::open(archive)
        .map_err(|error| ArchiveError::CorruptArchive(ZipError::Io(error)))?;

    extract_zip_reader(file, target_dir)
}

/// Extract a ZIP archive read from `reader` into `target_dir`.
///
/// `target_dir` and every missing ancestor are created first. Entries are
/// restored in stored order, file permissions are applied once the content
/// is written and the handle is closed. Directory permissions are applied
/// after all entries, deepest directories first, so read-only directories
/// do not block their own children.
///
/// The first failure aborts the extraction. Entries restored before it stay
/// on disk.
pub fn extract_zip_reader<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
) -> Result<ExtractSummary, ArchiveError> {
    let mut archive = ZipArchive::new(reader).map_err(ArchiveError::CorruptArchive)?;

    create_dir_all(target_dir)?;

    let mut summary = ExtractSummary::default();
    let mut directory_modes = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(ArchiveError::CorruptArchive)?;
        let name = entry.name().to_owned();

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(ArchiveError::UnsafeEntryName { name });
        };

        let destination = target_dir.join(relative);
        let mode = entry.unix_mode().map(|mode| mode & PERMISSION_MASK);

        if entry.is_dir() {
            create_dir_all(&destination)?;

            if let Some(mode) = mode {
                directory_modes.push((destination, name, mode));
            }

            summary.directories += 1;
            continue;
        }

        if let Some(parent) = destination.parent() {
            create_dir_all(parent)?;
        }

        write_file(&mut entry, &destination, &name)?;

        if let Some(mode) = mode {
            permissions::apply(&destination, mode)
                .map_err(|source| ArchiveError::EntryWriteFailed { name, source })?;
        }

        summary.files += 1;
    }

    directory_modes.sort_by_key(|(path, ..)| Reverse(path.components().count()));

    for (path, name, mode) in directory_modes {
        permissions::apply(&path, mode)
            .map_err(|source| ArchiveError::EntryWriteFailed { name, source })?;
    }

    debug!(
        target = %target_dir.display(),
        files = summary.files,
        directories = summary.directories,
        "archive extracted"
    );

    Ok(summary)
}

/// Create or truncate `destination` and copy the entry contents into it.
///
/// The destination handle is closed when this function returns.
fn write_file<R: Read>(
    entry: &mut R,
    destination: &Path,
    name: &str,
) -> Result<u64, ArchiveError> {
    let mut file =
        File::create(destination).map_err(|source| ArchiveError::DestinationUnwritable {
            path: destination.to_path_buf(),
            source,
        })?;

    io::copy(entry, &mut file).map_err(|source| ArchiveError::EntryWriteFailed {
        name: name.to_owned(),
        source,
    })
}

fn create_dir_all(path: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(path).map_err(|source| ArchiveError::DestinationUnwritable {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        io::{Cursor, Write},
        path::Path,
    };

    use zip::{write::FileOptions, CompressionMethod, ZipWriter};

    use super::{extract_zip_archive, extract_zip_reader};
    use crate::{build_zip_archive, ArchiveError, ExcludeSpec, IncludeSpec};

    fn archive_with(entries: &[(&str, Option<&[u8]>, u32)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (name, contents, mode) in entries {
            let options = FileOptions::default().unix_permissions(*mode);

            match contents {
                Some(contents) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(contents).unwrap();
                }
                None => writer.add_directory(*name, options).unwrap(),
            }
        }

        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("work").join("output");
        fs::create_dir_all(output.join("nested").join("empty")).unwrap();
        fs::write(output.join("nested").join("data.txt"), "some data").unwrap();
        fs::write(output.join("top.txt"), "").unwrap();

        let mut includes = IncludeSpec::new();
        includes.add(&output);

        let archive = dir.path().join("archive.zip");
        build_zip_archive(&includes, &ExcludeSpec::default(), &archive).unwrap();

        let destination = dir.path().join("restored").join("deep");
        let summary = extract_zip_archive(&archive, &destination).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 3);

        let restored = destination.join("output");
        assert_eq!(
            fs::read_to_string(restored.join("nested").join("data.txt")).unwrap(),
            "some data"
        );
        assert_eq!(fs::read(restored.join("top.txt")).unwrap(), b"");
        assert!(restored.join("nested").join("empty").is_dir());
        assert_eq!(
            fs::read_dir(restored.join("nested").join("empty"))
                .unwrap()
                .count(),
            0
        );
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("tool"), "#!/bin/sh\necho tool\n").unwrap();
        fs::write(bin.join("notes.txt"), "plain").unwrap();
        fs::set_permissions(bin.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(bin.join("notes.txt"), fs::Permissions::from_mode(0o640)).unwrap();

        let mut includes = IncludeSpec::new();
        includes.add(&bin);

        let archive = dir.path().join("archive.zip");
        build_zip_archive(&includes, &ExcludeSpec::default(), &archive).unwrap();

        let destination = dir.path().join("restored");
        extract_zip_archive(&archive, &destination).unwrap();

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&destination.join("bin").join("tool")), 0o755);
        assert_eq!(mode(&destination.join("bin").join("notes.txt")), 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_keeps_its_children() {
        use std::os::unix::fs::PermissionsExt;

        let archive = archive_with(&[
            ("locked/", None, 0o555),
            ("locked/file.txt", Some(&b"inside"[..]), 0o644),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let summary = extract_zip_reader(archive, dir.path()).unwrap();
        assert_eq!(summary.files, 1);

        let locked = dir.path().join("locked");
        assert_eq!(
            fs::read_to_string(locked.join("file.txt")).unwrap(),
            "inside"
        );
        assert_eq!(
            fs::metadata(&locked).unwrap().permissions().mode() & 0o777,
            0o555
        );

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn existing_files_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), "a much longer previous content").unwrap();

        let archive = archive_with(&[("file.txt", Some(&b"new"[..]), 0o644)]);
        extract_zip_reader(archive, dir.path()).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("file.txt")).unwrap(), "new");
    }

    #[test]
    fn corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        File::create(&archive)
            .unwrap()
            .write_all(b"definitely not a zip file")
            .unwrap();

        let result = extract_zip_archive(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(ArchiveError::CorruptArchive(_))));

        let result = extract_zip_archive(&dir.path().join("missing.zip"), &dir.path().join("out"));
        assert!(matches!(result, Err(ArchiveError::CorruptArchive(_))));
    }

    #[test]
    fn unsafe_entry_name() {
        let archive = archive_with(&[("../escaped.txt", Some(&b"outside"[..]), 0o644)]);

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let result = extract_zip_reader(archive, &target);

        assert!(matches!(
            result,
            Err(ArchiveError::UnsafeEntryName { ref name }) if name == "../escaped.txt"
        ));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn destination_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a file, not a directory").unwrap();

        let archive = archive_with(&[("file.txt", Some(&b"data"[..]), 0o644)]);
        let result = extract_zip_reader(archive, &blocker.join("nested"));

        assert!(matches!(
            result,
            Err(ArchiveError::DestinationUnwritable { .. })
        ));
    }

    #[test]
    fn damaged_entry_contents() {
        let contents = b"payload that fails its checksum";
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                "data.txt",
                FileOptions::default().compression_method(CompressionMethod::Stored),
            )
            .unwrap();
        writer.write_all(contents).unwrap();

        let mut bytes = writer.finish().unwrap().into_inner();
        let offset = bytes
            .windows(contents.len())
            .position(|window| window == contents)
            .unwrap();
        bytes[offset] ^= 0xff;

        let dir = tempfile::tempdir().unwrap();
        let result = extract_zip_reader(Cursor::new(bytes), dir.path());

        assert!(matches!(
            result,
            Err(ArchiveError::EntryWriteFailed { ref name, .. }) if name == "data.txt"
        ));
    }
}
