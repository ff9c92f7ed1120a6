use std::{path::PathBuf, time::Duration};

use archive::{build_zip_archive, ArchiveError, ExcludeSpec, IncludeSpec};
use byte_unit::Byte;
use common::{
    config::{Config, MissingConfig},
    s3::{ConfiguredClient, StorageError, ARCHIVE_CONTENT_TYPE},
};
use derive_more::{Display, Error, From};
use regex::Regex;
use tempfile::TempPath;
use tokio::task::{self, JoinError};
use tracing::{info, warn};

use crate::{
    ci,
    commands::{spinner, ArchiveTarget, S3Archive},
    gitlab::{GitlabClient, GitlabError, Project},
};

/// Version control metadata directories skipped with `--ignore-cvs`.
const CVS_DIRECTORIES: [&str; 4] = [
    r"(^|/)\.git(/|$)",
    r"(^|/)\.svn(/|$)",
    r"(^|/)\.hg(/|$)",
    r"(^|/)\.bzr(/|$)",
];

/// Upload attempts before giving up.
const UPLOAD_ATTEMPTS: u32 = 6;

const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Display, From, Error)]
pub(crate) enum S3Error {
    Config(MissingConfig),
    Gitlab(GitlabError),
    Io(std::io::Error),

    #[display(fmt = "invalid tag matcher: {}", _0)]
    TagMatcher(regex::Error),

    #[display(fmt = "unable to archive the workspace: {}", _0)]
    Archive(ArchiveError),

    #[display(fmt = "storage error: {}", _0)]
    Storage(StorageError),

    #[display(fmt = "archive task failed: {}", _0)]
    Join(JoinError),
}

/// Resolved location of a workspace archive.
pub(super) struct ResolvedTarget {
    pub project: Project,
    pub sha: String,
    pub job: String,
    pub tag_matcher: Regex,
    pub storage: ConfiguredClient,
}

impl ArchiveTarget {
    /// Fill omitted options from CI variables, look the project up and
    /// connect to the bucket.
    pub(super) async fn resolve(self, config: &Config) -> Result<ResolvedTarget, S3Error> {
        let project = ci::required(self.project, &ci::PROJECT_ID)?;
        let sha = ci::required(self.sha, &ci::COMMIT_SHA)?;
        let job = ci::required(self.job, &ci::JOB_NAME)?;
        let tag_matcher = Regex::new(&self.tag_matcher).map_err(S3Error::TagMatcher)?;

        let project = GitlabClient::new(&config.gitlab)?
            .find_project(&project)
            .await?;

        let mut storage = config.storage.clone();
        storage.region = self.region.or(storage.region);
        storage.endpoint = self.endpoint.or(storage.endpoint);
        storage.bucket = self.bucket.or(storage.bucket);

        Ok(ResolvedTarget {
            project,
            sha,
            job,
            tag_matcher,
            storage: ConfiguredClient::new(&storage).await?,
        })
    }
}

/// Include list, falling back to the current directory.
fn includes(paths: Vec<PathBuf>) -> IncludeSpec {
    if paths.is_empty() {
        IncludeSpec::from_iter(["./"])
    } else {
        IncludeSpec::from_iter(paths)
    }
}

fn excludes(patterns: &[String], ignore_cvs: bool) -> Result<ExcludeSpec, ArchiveError> {
    let mut excludes = ExcludeSpec::new(patterns)?;

    if ignore_cvs {
        for pattern in CVS_DIRECTORIES {
            excludes.add(pattern)?;
        }
    }

    Ok(excludes)
}

pub(crate) async fn s3_archive(
    S3Archive {
        includes: include_paths,
        excludes: exclude_patterns,
        ignore_cvs,
        target,
        ref_name,
    }: S3Archive,
    config: &Config,
) -> Result<(), S3Error> {
    let includes = includes(include_paths);
    let excludes = excludes(&exclude_patterns, ignore_cvs)?;
    let ref_name = ci::or_variable(ref_name, &ci::COMMIT_REF_NAME).unwrap_or_default();

    let ResolvedTarget {
        project,
        sha,
        job,
        tag_matcher,
        storage,
    } = target.resolve(config).await?;

    let key = ci::archive_key(&project, &sha, &ref_name, &job, &tag_matcher);

    info!(%includes, excludes = excludes.len(), "archiving workspace");

    let archive = tempfile::Builder::new()
        .prefix(&format!("{sha}_{job}"))
        .suffix(".zip")
        .tempfile()?
        .into_temp_path();

    let summary = {
        let target = archive.to_path_buf();
        task::spawn_blocking(move || build_zip_archive(&includes, &excludes, &target)).await??
    };

    let size = Byte::from_bytes(summary.bytes.into()).get_appropriate_unit(false);
    info!(
        files = summary.files,
        directories = summary.directories,
        %size,
        "archive created"
    );

    upload(&storage, &key, &archive).await?;

    println!("Archive uploaded to s3://{}/{key}", storage.bucket());

    Ok(())
}

/// Upload the archive, retrying failed attempts after a short pause.
async fn upload(
    storage: &ConfiguredClient,
    key: &str,
    archive: &TempPath,
) -> Result<(), S3Error> {
    let pg = spinner("Uploading archive...");
    let mut attempt = 1;

    loop {
        match storage.upload_file(key, archive, ARCHIVE_CONTENT_TYPE).await {
            Ok(()) => break,
            Err(error) if attempt < UPLOAD_ATTEMPTS => {
                warn!(%error, attempt, "upload failed, retrying");
                attempt += 1;
                tokio::time::sleep(UPLOAD_RETRY_DELAY).await;
            }
            Err(error) => {
                pg.abandon();
                return Err(error.into());
            }
        }
    }

    pg.finish_and_clear();
    info!(key, attempts = attempt, "archive uploaded");

    Ok(())
}
