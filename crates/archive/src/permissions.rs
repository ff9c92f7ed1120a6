use std::{fs::Metadata, io, path::Path};

#[cfg(unix)]
use std::{fs, os::unix::fs::PermissionsExt};

/// Mask that keeps the `rwx` bits for owner, group and others.
pub(crate) const PERMISSION_MASK: u32 = 0o777;

/// Mode of a freshly built archive file.
pub(crate) const ARCHIVE_MODE: u32 = 0o644;

/// Permission bits stored alongside an archive entry.
#[cfg(unix)]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    metadata.permissions().mode() & PERMISSION_MASK
}

#[cfg(not(unix))]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Apply archived permission bits to an extracted file or directory.
#[cfg(unix)]
pub(crate) fn apply(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode & PERMISSION_MASK))
}

/// Only the owner write bit has a counterpart outside of unix.
#[cfg(not(unix))]
pub(crate) fn apply(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, permissions)
}
