use common::config::Config;
use tracing::info;

use crate::gitlab::{GitlabClient, GitlabError};

pub(crate) async fn project_list(config: &Config) -> Result<(), GitlabError> {
    let client = GitlabClient::new(&config.gitlab)?;
    let projects = client.projects().await?;

    info!(count = projects.len(), "projects retrieved");

    for project in projects {
        println!(
            " > {:4} - {} - {}",
            project.id, project.name, project.namespace.name
        );
    }

    Ok(())
}
