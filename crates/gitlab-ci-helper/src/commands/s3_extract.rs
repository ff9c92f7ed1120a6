use archive::extract_zip_archive;
use common::config::Config;
use tokio::task;
use tracing::info;

use super::s3_archive::{ResolvedTarget, S3Error};
use crate::{
    ci,
    commands::{spinner, S3Extract},
};

pub(crate) async fn s3_extract(
    S3Extract { path, target }: S3Extract,
    config: &Config,
) -> Result<(), S3Error> {
    let ResolvedTarget {
        project,
        sha,
        job,
        tag_matcher,
        storage,
    } = target.resolve(config).await?;

    // Releases are requested by passing the tag name as the reference.
    let key = ci::archive_key(&project, &sha, &sha, &job, &tag_matcher);

    let archive = tempfile::Builder::new()
        .prefix(&format!("{sha}_{job}"))
        .suffix(".zip")
        .tempfile()?
        .into_temp_path();

    let pg = spinner("Downloading archive...");
    let size = storage.download_file(&key, &archive).await?;
    pg.finish_and_clear();

    info!(bucket = storage.bucket(), %key, size, "archive downloaded");

    let summary = {
        let archive = archive.to_path_buf();
        let path = path.clone();
        task::spawn_blocking(move || extract_zip_archive(&archive, &path)).await??
    };

    info!(
        files = summary.files,
        directories = summary.directories,
        path = %path.display(),
        "archive extracted"
    );

    Ok(())
}
