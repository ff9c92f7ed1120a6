use common::config::Config;

use crate::{
    commands::ProjectBuilds,
    gitlab::{GitlabClient, GitlabError, Job},
};

const ICON_SUCCESS: &str = "🍏";
const ICON_FAILED: &str = "🍅";
const ICON_PENDING: &str = "🍊";
const ICON_ARTIFACTS: &str = "🍞";

pub(crate) async fn project_builds(
    ProjectBuilds { project }: ProjectBuilds,
    config: &Config,
) -> Result<(), GitlabError> {
    let client = GitlabClient::new(&config.gitlab)?;
    let project = client.find_project(&project).await?;

    println!(
        "Project: {}/{} (id: {})",
        project.namespace.name, project.name, project.id
    );

    for job in client.project_jobs(project.id).await? {
        println!("{}", job_line(&job));
    }

    Ok(())
}

fn job_line(job: &Job) -> String {
    let status = match job.status.as_str() {
        "success" => ICON_SUCCESS,
        "failed" => ICON_FAILED,
        _ => ICON_PENDING,
    };

    let artifacts = match &job.artifacts_file {
        Some(file) if file.size > 0 => ICON_ARTIFACTS,
        _ => " ",
    };

    format!(
        " > {status}  {artifacts} {:4} - {:<15} ref: {:<25} short id: {}",
        job.id, job.name, job.git_ref, job.commit.short_id
    )
}
