/// `ci:meta` subcommand.
mod ci_meta;

/// `ci:revision` subcommand.
mod ci_revision;

/// `dump:readme` subcommand.
mod dump_readme;

/// `flowdock:message` and `flowdock:status` subcommands.
mod flowdock;

/// `hipchat:message` subcommand.
mod hipchat;

/// `jenkins:start` subcommand.
mod jenkins;

/// `project:builds:artifacts` subcommand.
mod project_artifacts;

/// `project:builds` subcommand.
mod project_builds;

/// `project:list` subcommand.
mod project_list;

/// `s3:archive` subcommand.
mod s3_archive;

/// `s3:extract` subcommand.
mod s3_extract;

/// `version` subcommand.
mod version;

pub(crate) use ci_meta::ci_meta;
pub(crate) use ci_revision::ci_revision;
pub(crate) use dump_readme::dump_readme;
pub(crate) use flowdock::{flowdock_message, flowdock_status};
pub(crate) use hipchat::hipchat_message;
pub(crate) use jenkins::jenkins_start;
pub(crate) use project_artifacts::project_artifacts;
pub(crate) use project_builds::project_builds;
pub(crate) use project_list::project_list;
pub(crate) use s3_archive::s3_archive;
pub(crate) use s3_extract::s3_extract;
pub(crate) use version::version;

use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use indicatif::ProgressBar;

/// CLI configuration.
#[derive(Parser)]
#[command(name = "gitlab-ci-helper", about, version)]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Print debug information.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List projects available to the configured token.
    #[command(name = "project:list")]
    ProjectList,

    /// List jobs of a project.
    #[command(name = "project:builds")]
    ProjectBuilds(ProjectBuilds),

    /// Download the artifacts of a job, optionally extracting them.
    #[command(name = "project:builds:artifacts")]
    ProjectArtifacts(ProjectArtifacts),

    /// Write a JSON file with information about the current build.
    #[command(name = "ci:meta")]
    CiMeta(CiMeta),

    /// Write a file containing the current commit sha.
    #[command(name = "ci:revision")]
    CiRevision(CiRevision),

    /// Send a notification to a HipChat room.
    #[command(name = "hipchat:message")]
    HipchatMessage(HipchatMessage),

    /// Send a message to a Flowdock flow.
    #[command(name = "flowdock:message")]
    FlowdockMessage(FlowdockMessage),

    /// Report the status of the jobs of the current commit to a Flowdock flow.
    #[command(name = "flowdock:status")]
    FlowdockStatus(FlowdockStatus),

    /// Trigger a parameterized Jenkins job.
    #[command(name = "jenkins:start")]
    JenkinsStart(JenkinsStart),

    /// Archive workspace paths and upload them to S3.
    #[command(name = "s3:archive")]
    S3Archive(S3Archive),

    /// Download a workspace archive from S3 and extract it.
    #[command(name = "s3:extract")]
    S3Extract(S3Extract),

    /// Display the application version.
    Version(Version),

    /// Print the Markdown documentation of all commands.
    #[command(name = "dump:readme")]
    DumpReadme,
}

/// `project:builds` subcommand configuration.
#[derive(Args)]
pub struct ProjectBuilds {
    /// Project id or `namespace/name`.
    project: String,
}

/// `project:builds:artifacts` subcommand configuration.
#[derive(Args)]
pub struct ProjectArtifacts {
    /// Project id or `namespace/name`, defaults to CI_PROJECT_ID.
    #[arg(long)]
    project: Option<String>,

    /// Job id, takes precedence over the job name lookup.
    #[arg(long)]
    build: Option<u64>,

    /// Job name looked up among the jobs of the commit.
    #[arg(long, default_value = "package")]
    job: String,

    /// Commit sha, defaults to CI_COMMIT_SHA.
    #[arg(long = "ref")]
    sha: Option<String>,

    /// Downloaded artifacts file.
    #[arg(long, default_value = "artifacts.zip")]
    file: PathBuf,

    /// Extract the artifacts into this directory.
    #[arg(long)]
    path: Option<PathBuf>,
}

/// `ci:meta` subcommand configuration.
#[derive(Args)]
pub struct CiMeta {
    /// Output file.
    #[arg(long, default_value = "ci.json")]
    file: PathBuf,
}

/// `ci:revision` subcommand configuration.
#[derive(Args)]
pub struct CiRevision {
    /// Output file.
    #[arg(long, default_value = "REVISION")]
    file: PathBuf,

    /// Commit sha, defaults to CI_COMMIT_SHA.
    #[arg(long = "ref")]
    sha: Option<String>,
}

/// HipChat notification colors.
#[derive(Clone, Copy, ValueEnum)]
pub enum HipchatColor {
    Yellow,
    Green,
    Red,
    Purple,
    Gray,
    Random,
}

/// `hipchat:message` subcommand configuration.
#[derive(Args)]
pub struct HipchatMessage {
    /// Room id or name.
    room: String,

    /// Message body.
    message: String,

    /// HipChat API token.
    #[arg(long, env = "HIPCHAT_TOKEN", hide_env_values = true)]
    token: String,

    /// HipChat server.
    #[arg(long, env = "HIPCHAT_SERVER", default_value = "https://api.hipchat.com")]
    server: String,

    /// Message background color.
    #[arg(long, value_enum, default_value_t = HipchatColor::Gray)]
    color: HipchatColor,

    /// Trigger a user notification.
    #[arg(long)]
    notify: bool,

    /// Send the message as text instead of HTML.
    #[arg(long)]
    text: bool,
}

/// `flowdock:message` subcommand configuration.
#[derive(Args)]
pub struct FlowdockMessage {
    /// Organization name.
    organization: String,

    /// Flow name.
    flow: String,

    /// Message body.
    message: String,

    /// Flowdock source token.
    #[arg(long, env = "FLOWDOCK_SOURCE_TOKEN", hide_env_values = true)]
    token: String,

    /// Flowdock API server.
    #[arg(long, default_value = "https://api.flowdock.com")]
    server: String,
}

/// `flowdock:status` subcommand configuration.
#[derive(Args)]
pub struct FlowdockStatus {
    /// Organization name.
    organization: String,

    /// Flow name.
    flow: String,

    /// Flowdock source token.
    #[arg(long, env = "FLOWDOCK_SOURCE_TOKEN", hide_env_values = true)]
    token: String,

    /// Flowdock API server.
    #[arg(long, default_value = "https://api.flowdock.com")]
    server: String,

    /// Running from the last job of the pipeline, report a running pipeline as successful.
    #[arg(long)]
    last: bool,

    /// Project id or `namespace/name`, defaults to CI_PROJECT_ID.
    #[arg(long)]
    project: Option<String>,

    /// Commit sha, defaults to CI_COMMIT_SHA.
    #[arg(long = "ref")]
    sha: Option<String>,

    /// Reference name, defaults to CI_COMMIT_REF_NAME.
    #[arg(long)]
    ref_name: Option<String>,

    /// Current job name, defaults to CI_JOB_NAME.
    #[arg(long)]
    name: Option<String>,
}

/// `jenkins:start` subcommand configuration.
#[derive(Args)]
pub struct JenkinsStart {
    /// Jenkins job name.
    #[arg(long)]
    job: String,

    /// Remote trigger token of the job.
    #[arg(long, env = "JENKINS_JOB_TOKEN", hide_env_values = true)]
    job_token: Option<String>,

    /// Build parameter in `name:value` form, can be repeated.
    #[arg(long = "parameter", value_name = "NAME:VALUE")]
    parameters: Vec<String>,
}

/// `s3:archive` subcommand configuration.
#[derive(Args)]
pub struct S3Archive {
    /// Path to archive, can be repeated. Defaults to the current directory.
    #[arg(long = "include")]
    includes: Vec<PathBuf>,

    /// Regular expression matched against paths to skip, can be repeated.
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Skip version control metadata directories.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    ignore_cvs: bool,

    #[command(flatten)]
    target: ArchiveTarget,

    /// Reference name, defaults to CI_COMMIT_REF_NAME.
    #[arg(long)]
    ref_name: Option<String>,
}

/// `s3:extract` subcommand configuration.
#[derive(Args)]
pub struct S3Extract {
    /// Extraction directory.
    #[arg(long, default_value = "./")]
    path: PathBuf,

    #[command(flatten)]
    target: ArchiveTarget,
}

/// Location of a workspace archive in the bucket.
#[derive(Args)]
pub struct ArchiveTarget {
    /// Project id or `namespace/name`, defaults to CI_PROJECT_ID.
    #[arg(long)]
    project: Option<String>,

    /// Job name, defaults to CI_JOB_NAME.
    #[arg(long)]
    job: Option<String>,

    /// Commit sha, defaults to CI_COMMIT_SHA.
    #[arg(long = "ref")]
    sha: Option<String>,

    /// Pattern identifying release tags.
    #[arg(long, default_value = crate::ci::DEFAULT_TAG_MATCHER)]
    tag_matcher: String,

    /// S3 region, overrides the configuration.
    #[arg(long)]
    region: Option<String>,

    /// S3 endpoint, overrides the configuration.
    #[arg(long)]
    endpoint: Option<String>,

    /// S3 bucket, overrides the configuration.
    #[arg(long)]
    bucket: Option<String>,
}

/// `version` subcommand configuration.
#[derive(Args)]
pub struct Version {
    /// Include the source revision.
    #[arg(short, long)]
    extended: bool,
}

/// Spinner displayed while waiting on network transfers.
fn spinner(message: &'static str) -> ProgressBar {
    let pg = ProgressBar::new_spinner();

    pg.enable_steady_tick(Duration::from_millis(150));
    pg.set_message(message);

    pg
}
