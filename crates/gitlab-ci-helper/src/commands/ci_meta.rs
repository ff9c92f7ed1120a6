use std::{fs, io, path::Path};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::info;

use crate::{
    ci::{self, Variable},
    commands::CiMeta,
};

#[derive(Serialize)]
struct Meta {
    build: BuildMeta,
    project: ProjectMeta,
    server: ServerMeta,
}

#[derive(Serialize)]
struct BuildMeta {
    id: String,
    #[serde(rename = "ref")]
    git_ref: String,
    ref_name: String,
    tag: String,
    stage: String,
    job_name: String,
}

#[derive(Serialize)]
struct ProjectMeta {
    id: String,
    dir: String,
}

#[derive(Serialize)]
struct ServerMeta {
    name: String,
    revision: String,
    version: String,
}

impl Meta {
    /// Collect build information, unset variables are written as empty strings.
    fn collect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |variable: &Variable| variable.resolve_with(&lookup).unwrap_or_default();

        Meta {
            build: BuildMeta {
                id: value(&ci::JOB_ID),
                git_ref: value(&ci::COMMIT_SHA),
                ref_name: value(&ci::COMMIT_REF_NAME),
                tag: value(&ci::COMMIT_TAG),
                stage: value(&ci::JOB_STAGE),
                job_name: value(&ci::JOB_NAME),
            },
            project: ProjectMeta {
                id: value(&ci::PROJECT_ID),
                dir: value(&ci::PROJECT_DIR),
            },
            server: ServerMeta {
                name: value(&ci::SERVER_NAME),
                revision: value(&ci::SERVER_REVISION),
                version: value(&ci::SERVER_VERSION),
            },
        }
    }

    fn write(&self, path: &Path) -> io::Result<()> {
        let mut buffer = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));

        self.serialize(&mut serializer)?;

        fs::write(path, buffer)
    }
}

pub(crate) fn ci_meta(CiMeta { file }: CiMeta) -> Result<(), io::Error> {
    let meta = Meta::collect(|name| std::env::var(name).ok());
    meta.write(&file)?;

    info!(file = %file.display(), "build metadata written");

    Ok(())
}
