use std::{
    fmt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use regex::Regex;

use crate::ArchiveError;

/// Ordered list of files and directories to pack.
///
/// Duplicates are kept as-is. The walk is idempotent for them, the archive
/// simply receives the same entries twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeSpec {
    /// Include roots in insertion order.
    paths: Vec<PathBuf>,
}

impl IncludeSpec {
    /// Create an empty include list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new include root.
    pub fn add<P: Into<PathBuf>>(&mut self, path: P) {
        self.paths.push(path.into());
    }

    /// Include roots in insertion order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Count of include roots, duplicates included.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` when there is nothing to pack.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for IncludeSpec {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for IncludeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.paths.iter().map(|path| path.display()).join(" ")
        )
    }
}

/// Set of regular expressions matched against full visited paths.
#[derive(Clone, Debug, Default)]
pub struct ExcludeSpec {
    /// Compiled exclude patterns.
    patterns: Vec<Regex>,
}

impl ExcludeSpec {
    /// Compile every pattern up front.
    ///
    /// Returns [`ArchiveError::InvalidExcludePattern`] for the first pattern
    /// that fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut excludes = Self::default();

        for pattern in patterns {
            excludes.add(pattern.as_ref())?;
        }

        Ok(excludes)
    }

    /// Compile and append a single pattern.
    pub fn add(&mut self, pattern: &str) -> Result<(), ArchiveError> {
        self.patterns
            .push(Regex::new(pattern).map_err(ArchiveError::InvalidExcludePattern)?);
        Ok(())
    }

    /// Check whether any pattern matches anywhere in the provided path.
    ///
    /// The path is matched as visited during the walk (root prefix included),
    /// not only its file name.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let path = path.to_string_lossy();
        self.patterns.iter().any(|pattern| pattern.is_match(&path))
    }

    /// Count of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// `true` when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
