use std::{fs, io};

use common::config::MissingConfig;
use derive_more::{Display, Error, From};
use tracing::info;

use crate::{ci, commands::CiRevision};

#[derive(Debug, Display, From, Error)]
pub(crate) enum CiRevisionError {
    Config(MissingConfig),
    Io(io::Error),
}

pub(crate) fn ci_revision(CiRevision { file, sha }: CiRevision) -> Result<(), CiRevisionError> {
    let sha = ci::required(sha, &ci::COMMIT_SHA)?;

    fs::write(&file, &sha)?;

    info!(file = %file.display(), %sha, "revision written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::ci_revision;
    use crate::commands::CiRevision;

    #[test]
    fn writes_provided_sha() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("REVISION");

        ci_revision(CiRevision {
            file: file.clone(),
            sha: Some("0123456789abcdef".into()),
        })
        .unwrap();

        assert_eq!(fs::read_to_string(file).unwrap(), "0123456789abcdef");
    }
}
