use archive::{extract_zip_archive, ArchiveError};
use common::config::{Config, MissingConfig};
use derive_more::{Display, Error, From};
use tokio::task::{self, JoinError};
use tracing::info;

use crate::{
    ci,
    commands::{spinner, ProjectArtifacts},
    gitlab::{GitlabClient, GitlabError},
};

#[derive(Debug, Display, From, Error)]
pub(crate) enum ProjectArtifactsError {
    Config(MissingConfig),
    Gitlab(GitlabError),

    #[display(fmt = "unable to extract artifacts: {}", _0)]
    Archive(ArchiveError),

    #[display(fmt = "extraction task failed: {}", _0)]
    Join(JoinError),
}

pub(crate) async fn project_artifacts(
    ProjectArtifacts {
        project,
        build,
        job,
        sha,
        file,
        path,
    }: ProjectArtifacts,
    config: &Config,
) -> Result<(), ProjectArtifactsError> {
    let client = GitlabClient::new(&config.gitlab)?;

    let project = ci::required(project, &ci::PROJECT_ID)?;
    let project = client.find_project(&project).await?;

    info!(id = project.id, project = %project.full_path(), "found project");

    let job = match build {
        Some(id) => client.job(project.id, id).await?,
        None => {
            let sha = ci::required(sha, &ci::COMMIT_SHA)?;

            client
                .commit_jobs(project.id, &sha)
                .await?
                .into_iter()
                .find(|candidate| candidate.name == job)
                .ok_or_else(|| GitlabError::JobNotFound(format!("{job} for commit {sha}")))?
        }
    };

    println!(
        "Found build - stage:{} status:{} id:{}",
        job.stage, job.status, job.id
    );

    let pg = spinner("Downloading artifacts...");
    let size = client
        .download_artifacts(project.id, job.id, &file)
        .await?;
    pg.finish_and_clear();

    info!(size, file = %file.display(), "artifacts downloaded");

    if let Some(path) = path {
        let summary =
            task::spawn_blocking(move || extract_zip_archive(&file, &path)).await??;

        info!(files = summary.files, "artifacts extracted");
    }

    println!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use archive::{build_zip_archive, ArchiveError, ExcludeSpec, IncludeSpec};
    use common::config::Config;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{project_artifacts, ProjectArtifactsError};
    use crate::{
        commands::ProjectArtifacts,
        gitlab::tests::{job_json, project_json},
    };

    fn archive_bytes(root: &Path) -> Vec<u8> {
        let dist = root.join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("app.js"), "console.log(1)").unwrap();

        let mut includes = IncludeSpec::new();
        includes.add(&dist);

        let target = root.join("fixture.zip");
        build_zip_archive(&includes, &ExcludeSpec::default(), &target).unwrap();
        fs::read(target).unwrap()
    }

    #[tokio::test]
    async fn download_and_extract_by_job_name() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let sha = "0123456789abcdef0123456789abcdef01234567";

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json(7, "ci", "tools")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                job_json(21, "test", "success", sha),
                job_json(20, "package", "success", sha),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs/20/artifacts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes(dir.path())))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.gitlab.host = Some(server.uri());

        let file = dir.path().join("artifacts.zip");
        let extracted = dir.path().join("extracted");

        project_artifacts(
            ProjectArtifacts {
                project: Some("7".into()),
                build: None,
                job: "package".into(),
                sha: Some(sha.into()),
                file: file.clone(),
                path: Some(extracted.clone()),
            },
            &config,
        )
        .await
        .unwrap();

        assert!(file.is_file());
        assert_eq!(
            fs::read_to_string(extracted.join("dist").join("app.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[tokio::test]
    async fn corrupt_artifacts_are_reported() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json(7, "ci", "tools")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_json(
                5,
                "package",
                "success",
                "0123456789abcdef",
            )))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs/5/artifacts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not an archive".to_vec()))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.gitlab.host = Some(server.uri());

        let result = project_artifacts(
            ProjectArtifacts {
                project: Some("7".into()),
                build: Some(5),
                job: "package".into(),
                sha: None,
                file: dir.path().join("artifacts.zip"),
                path: Some(dir.path().join("out")),
            },
            &config,
        )
        .await;

        assert!(matches!(
            result,
            Err(ProjectArtifactsError::Archive(ArchiveError::CorruptArchive(_)))
        ));
    }
}
