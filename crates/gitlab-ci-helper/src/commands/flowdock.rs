use std::collections::{btree_map::Entry, BTreeMap};

use common::config::{Config, MissingConfig};
use derive_more::{Display, Error, From};
use reqwest::Client;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, info};

use crate::{
    ci,
    commands::{FlowdockMessage, FlowdockStatus},
    gitlab::{GitlabClient, GitlabError, Job, Project},
};

const AUTHOR_NAME: &str = "GitlabCi";
const AUTHOR_AVATAR: &str = "https://about.gitlab.com/images/gitlab_logo.png";

/// HTML body of the status thread, rendered with autoescaping.
const THREAD_TEMPLATE: &str = include_str!("../../templates/flowdock_thread.html");

#[derive(Debug, Display, From, Error)]
pub(crate) enum FlowdockError {
    Config(MissingConfig),
    Gitlab(GitlabError),
    Http(reqwest::Error),

    #[display(fmt = "unable to render the thread body: {}", _0)]
    Template(tera::Error),

    #[display(fmt = "no jobs found for commit {}", _0)]
    #[from(ignore)]
    NoJobs(#[error(ignore)] String),
}

/// Severity of a job status, the most severe one colors the whole thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum BuildLevel {
    Pending,
    Success,
    Running,
    Failed,
    Canceled,
}

impl BuildLevel {
    fn from_status(status: &str) -> Self {
        match status {
            "success" => BuildLevel::Success,
            "running" => BuildLevel::Running,
            "failed" => BuildLevel::Failed,
            "canceled" => BuildLevel::Canceled,
            _ => BuildLevel::Pending,
        }
    }

    fn color(self) -> &'static str {
        match self {
            BuildLevel::Pending => "black",
            BuildLevel::Success => "green",
            BuildLevel::Running => "orange",
            BuildLevel::Failed => "red",
            BuildLevel::Canceled => "grey",
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_thread_id: Option<String>,
    flow_token: &'a str,
    flow: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<Thread>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Author>,
}

#[derive(Serialize)]
struct Thread {
    title: String,
    body: String,
    external_url: String,
    status: ThreadStatus,
}

#[derive(Serialize)]
struct ThreadStatus {
    color: &'static str,
    value: String,
}

#[derive(Serialize)]
struct Author {
    name: &'static str,
    avatar: &'static str,
}

/// Latest job of every name, with the aggregated status.
struct StatusReport {
    jobs: Vec<Job>,
    level: BuildLevel,
    status: String,
}

impl StatusReport {
    /// Keep the most recent job per name and find the most severe status.
    ///
    /// With `last` set, a pipeline that is still running only because of the
    /// reporting job itself is reported as successful.
    fn aggregate(jobs: Vec<Job>, last: bool, current: Option<&str>) -> Self {
        let mut active = BTreeMap::new();

        for job in jobs {
            match active.entry(job.name.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(job);
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().id < job.id {
                        entry.insert(job);
                    }
                }
            }
        }

        let mut level = BuildLevel::Pending;
        let mut status = String::from("-");

        for job in active.values() {
            let job_level = BuildLevel::from_status(&job.status);

            if job_level > level {
                level = job_level;
                status = job.status.clone();
            }
        }

        if last && level == BuildLevel::Running {
            level = BuildLevel::Success;
            status = String::from("success");

            if let Some(name) = current {
                if let Some(job) = active.get_mut(name) {
                    job.status = String::from("success");
                }
            }
        }

        Self {
            jobs: active.into_values().collect(),
            level,
            status,
        }
    }
}

#[derive(Serialize)]
struct ThreadBody<'a> {
    namespace: &'a str,
    name: &'a str,
    url: &'a str,
    author: &'a str,
    title: &'a str,
    short_id: &'a str,
    sha: &'a str,
    jobs: Vec<JobRow<'a>>,
}

#[derive(Serialize)]
struct JobRow<'a> {
    id: u64,
    status: &'a str,
    name: &'a str,
    stage: &'a str,
    color: &'static str,
    artifacts: bool,
}

/// HTML body of the thread: project and commit details followed by the job table.
fn render_body(project: &Project, head: &Job, jobs: &[Job]) -> Result<String, tera::Error> {
    let body = ThreadBody {
        namespace: &project.namespace.name,
        name: &project.name,
        url: &project.web_url,
        author: &head.commit.author_name,
        title: &head.commit.title,
        short_id: &head.commit.short_id,
        sha: &head.commit.id,
        jobs: jobs
            .iter()
            .map(|job| JobRow {
                id: job.id,
                status: &job.status,
                name: &job.name,
                stage: &job.stage,
                color: BuildLevel::from_status(&job.status).color(),
                artifacts: job.artifacts_file.as_ref().map_or(false, |file| file.size > 0),
            })
            .collect(),
    };

    Tera::one_off(THREAD_TEMPLATE, &Context::from_serialize(&body)?, true)
}

async fn post(
    server: &str,
    organization: &str,
    message: &Message<'_>,
) -> Result<(), reqwest::Error> {
    let url = format!(
        "{}/flows/{organization}/{}/messages",
        server.trim_end_matches('/'),
        message.flow
    );

    debug!(%url, event = message.event, "posting flow message");

    Client::new()
        .post(url)
        .json(message)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

pub(crate) async fn flowdock_message(
    FlowdockMessage {
        organization,
        flow,
        message,
        token,
        server,
    }: FlowdockMessage,
) -> Result<(), reqwest::Error> {
    let message = Message {
        event: "message",
        content: Some(&message),
        title: None,
        external_thread_id: None,
        flow_token: &token,
        flow: &flow,
        thread: None,
        author: None,
    };

    post(&server, &organization, &message).await?;

    info!(%organization, %flow, "message sent");

    Ok(())
}

pub(crate) async fn flowdock_status(
    FlowdockStatus {
        organization,
        flow,
        token,
        server,
        last,
        project,
        sha,
        ref_name,
        name,
    }: FlowdockStatus,
    config: &Config,
) -> Result<(), FlowdockError> {
    let project = ci::required(project, &ci::PROJECT_ID)?;
    let sha = ci::required(sha, &ci::COMMIT_SHA)?;
    let ref_name = ci::or_variable(ref_name, &ci::COMMIT_REF_NAME).unwrap_or_default();
    let name = ci::or_variable(name, &ci::JOB_NAME).unwrap_or_default();

    let client = GitlabClient::new(&config.gitlab)?;
    let project = client.find_project(&project).await?;

    println!(
        "Found project: {}/{} (id: {})",
        project.namespace.name, project.name, project.id
    );

    let jobs = client.commit_jobs(project.id, &sha).await?;
    let Some(head) = jobs.first().cloned() else {
        return Err(FlowdockError::NoJobs(sha));
    };

    let report = StatusReport::aggregate(jobs, last, Some(name.as_str()));
    debug!(status = %report.status, jobs = report.jobs.len(), "aggregated job status");

    let message = Message {
        event: "activity",
        content: None,
        title: Some(format!("Update status, job:{name}")),
        external_thread_id: Some(format!("gitlab:{sha}:{ref_name}")),
        flow_token: &token,
        flow: &flow,
        thread: Some(Thread {
            title: format!("Jobs for {} - {ref_name}", project.name),
            body: render_body(&project, &head, &report.jobs)?,
            external_url: format!("{}/commit/{sha}/pipelines", project.web_url),
            status: ThreadStatus {
                color: report.level.color(),
                value: report.status.clone(),
            },
        }),
        author: Some(Author {
            name: AUTHOR_NAME,
            avatar: AUTHOR_AVATAR,
        }),
    };

    post(&server, &organization, &message).await?;

    info!(%organization, %flow, status = %report.status, "status thread updated");

    Ok(())
}
