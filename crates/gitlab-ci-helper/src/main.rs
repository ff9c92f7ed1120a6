//! # GitLab CI helper
//!
//! Small toolbox used from GitLab CI jobs.
//!
//! Its main purpose is to move a job workspace between pipeline stages
//! through an S3 bucket: `s3:archive` packs the selected paths into a ZIP
//! archive keyed by project, commit and job name, and `s3:extract` restores
//! it in a later job. The remaining subcommands query the GitLab API, dump
//! build metadata into files and send notifications to chat services or Jenkins.
//!
//! Configuration is read from `CiHelper.toml` and the environment, see
//! [`common::config::Config`].

#![deny(missing_docs)]

use clap::Parser;
use commands::{Cli, Commands};
use common::{config::Config, logging};
use tracing::level_filters::LevelFilter;

/// Predefined CI variables and archive naming.
mod ci;

/// CLI subcommands.
mod commands;

/// GitLab REST API client.
mod gitlab;

/// CLI entrypoint.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let mut config = Config::new(cli.config_file)?;

    if cli.verbose {
        config.logging.level = LevelFilter::DEBUG;
    }

    logging::init(&config);

    match cli.command {
        Commands::ProjectList => commands::project_list(&config).await?,
        Commands::ProjectBuilds(args) => commands::project_builds(args, &config).await?,
        Commands::ProjectArtifacts(args) => commands::project_artifacts(args, &config).await?,
        Commands::CiMeta(args) => commands::ci_meta(args)?,
        Commands::CiRevision(args) => commands::ci_revision(args)?,
        Commands::HipchatMessage(args) => commands::hipchat_message(args).await?,
        Commands::FlowdockMessage(args) => commands::flowdock_message(args).await?,
        Commands::FlowdockStatus(args) => commands::flowdock_status(args, &config).await?,
        Commands::JenkinsStart(args) => commands::jenkins_start(args, &config).await?,
        Commands::S3Archive(args) => commands::s3_archive(args, &config).await?,
        Commands::S3Extract(args) => commands::s3_extract(args, &config).await?,
        Commands::Version(args) => commands::version(args),
        Commands::DumpReadme => commands::dump_readme(),
    }

    Ok(())
}
