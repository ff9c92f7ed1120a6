use std::{io, path::Path};

use common::config::{self, MissingConfig};
use derive_more::{Display, Error, From};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

/// Page size requested from list endpoints.
const PER_PAGE: &str = "100";

/// Response header carrying the number of the following page, empty on the last one.
const NEXT_PAGE_HEADER: &str = "x-next-page";

#[derive(Debug, Display, From, Error)]
pub(crate) enum GitlabError {
    Config(MissingConfig),
    Http(reqwest::Error),
    Io(io::Error),

    #[display(fmt = "invalid project reference, must be namespace/project-name or a numeric id")]
    InvalidProjectReference,

    #[display(fmt = "unable to find the project {}{}", reference, hint)]
    #[from(ignore)]
    ProjectNotFound { reference: String, hint: String },

    #[display(fmt = "unable to find the job {}", _0)]
    #[from(ignore)]
    JobNotFound(#[error(ignore)] String),
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Namespace {
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Project {
    pub id: u64,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub web_url: String,
    pub namespace: Namespace,
}

impl Project {
    /// `namespace/path` form accepted by [`GitlabClient::find_project`].
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.namespace.path, self.path)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Commit {
    pub id: String,
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ArtifactsFile {
    pub size: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Job {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub status: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: Commit,
    #[serde(default)]
    pub artifacts_file: Option<ArtifactsFile>,
}

/// Minimal GitLab REST API client.
pub(crate) struct GitlabClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitlabClient {
    pub fn new(config: &config::Gitlab) -> Result<Self, GitlabError> {
        Ok(Self {
            client: Client::new(),
            api_url: config.api_url()?,
            token: config.token.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.api_url));

        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitlabError> {
        Ok(request.send().await?.error_for_status()?.json().await?)
    }

    /// Follow `X-Next-Page` until every page of a list endpoint is collected.
    async fn fetch_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GitlabError> {
        let mut items = Vec::new();
        let mut page = String::from("1");

        loop {
            let response = self
                .get(path)
                .query(&[("per_page", PER_PAGE), ("page", page.as_str())])
                .send()
                .await?
                .error_for_status()?;

            let next = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_owned);

            items.extend(response.json::<Vec<T>>().await?);

            match next {
                Some(next) if next != page => page = next,
                _ => return Ok(items),
            }
        }
    }

    /// Projects visible to the configured token.
    pub async fn projects(&self) -> Result<Vec<Project>, GitlabError> {
        self.fetch(self.get("/projects").query(&[("per_page", PER_PAGE)]))
            .await
    }

    pub async fn search_projects(&self, name: &str) -> Result<Vec<Project>, GitlabError> {
        self.fetch(
            self.get("/projects")
                .query(&[("search", name), ("per_page", PER_PAGE)]),
        )
        .await
    }

    pub async fn project(&self, id: u64) -> Result<Project, GitlabError> {
        self.fetch(self.get(&format!("/projects/{id}"))).await
    }

    /// Resolve a project from either its numeric id or its `namespace/name` path.
    ///
    /// Name lookups go through the search endpoint, and a project with the same
    /// name in another namespace is reported as a hint in the error.
    pub async fn find_project(&self, reference: &str) -> Result<Project, GitlabError> {
        if let Ok(id) = reference.parse::<u64>() {
            return self.project(id).await;
        }

        let Some((namespace, name)) = reference.split_once('/') else {
            return Err(GitlabError::InvalidProjectReference);
        };

        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(GitlabError::InvalidProjectReference);
        }

        let candidates = self.search_projects(name).await?;
        debug!(reference, candidates = candidates.len(), "project search");

        let mut hint = String::new();

        for project in candidates {
            if project.path != name && project.name != name {
                continue;
            }

            if project.namespace.path == namespace || project.namespace.name == namespace {
                return Ok(project);
            }

            hint = format!(", did you mean {}?", project.full_path());
        }

        Err(GitlabError::ProjectNotFound {
            reference: reference.to_owned(),
            hint,
        })
    }

    /// Latest page of project jobs, most recent first.
    pub async fn project_jobs(&self, project_id: u64) -> Result<Vec<Job>, GitlabError> {
        self.fetch(
            self.get(&format!("/projects/{project_id}/jobs"))
                .query(&[("per_page", PER_PAGE)]),
        )
        .await
    }

    /// Jobs that ran for the provided commit, full or short sha.
    ///
    /// Every page of project jobs is scanned, so older commits are found too.
    pub async fn commit_jobs(&self, project_id: u64, sha: &str) -> Result<Vec<Job>, GitlabError> {
        let jobs: Vec<Job> = self
            .fetch_pages(&format!("/projects/{project_id}/jobs"))
            .await?;
        debug!(project_id, jobs = jobs.len(), "project jobs fetched");

        Ok(jobs
            .into_iter()
            .filter(|job| job.commit.id == sha || job.commit.short_id == sha)
            .collect())
    }

    pub async fn job(&self, project_id: u64, job_id: u64) -> Result<Job, GitlabError> {
        self.fetch(self.get(&format!("/projects/{project_id}/jobs/{job_id}")))
            .await
    }

    /// Stream job artifacts into the file at `path`.
    ///
    /// Returns the amount of written bytes.
    pub async fn download_artifacts(
        &self,
        project_id: u64,
        job_id: u64,
        path: &Path,
    ) -> Result<u64, GitlabError> {
        let mut response = self
            .get(&format!("/projects/{project_id}/jobs/{job_id}/artifacts"))
            .send()
            .await?
            .error_for_status()?;

        let mut file = File::create(path).await?;
        let mut size = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        file.flush().await?;

        Ok(size)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use common::config;
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{GitlabClient, GitlabError};

    pub(crate) fn project_json(id: u64, namespace: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "path": name,
            "web_url": format!("https://gitlab.example.com/{namespace}/{name}"),
            "namespace": { "name": namespace, "path": namespace },
        })
    }

    pub(crate) fn job_json(id: u64, name: &str, status: &str, sha: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "stage": "test",
            "status": status,
            "ref": "master",
            "commit": {
                "id": sha,
                "short_id": &sha[..8],
                "title": "Add feature",
                "author_name": "Jane Doe",
            },
        })
    }

    pub(crate) fn client_for(server: &MockServer) -> GitlabClient {
        GitlabClient::new(&config::Gitlab {
            host: Some(server.uri()),
            token: Some("secret".into()),
            api_path: "/api/v4".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn numeric_reference_uses_project_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42"))
            .and(header("PRIVATE-TOKEN", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json(42, "ci", "tools")))
            .expect(1)
            .mount(&server)
            .await;

        let project = client_for(&server).find_project("42").await.unwrap();
        assert_eq!(project.id, 42);
        assert_eq!(project.full_path(), "ci/tools");
    }

    #[tokio::test]
    async fn path_reference_searches_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("search", "tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                project_json(1, "other", "tools"),
                project_json(2, "ci", "tools"),
            ])))
            .mount(&server)
            .await;

        let project = client_for(&server).find_project("ci/tools").await.unwrap();
        assert_eq!(project.id, 2);
    }

    #[tokio::test]
    async fn unknown_namespace_suggests_candidate() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([project_json(1, "other", "tools")])),
            )
            .mount(&server)
            .await;

        let error = client_for(&server)
            .find_project("ci/tools")
            .await
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "unable to find the project ci/tools, did you mean other/tools?"
        );
    }

    #[tokio::test]
    async fn malformed_reference() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        for reference in ["tools", "/tools", "ci/", "a/b/c"] {
            assert!(matches!(
                client.find_project(reference).await,
                Err(GitlabError::InvalidProjectReference)
            ));
        }
    }

    #[tokio::test]
    async fn commit_jobs_match_full_and_short_sha() {
        let server = MockServer::start().await;
        let sha = "0123456789abcdef0123456789abcdef01234567";

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                job_json(3, "package", "success", sha),
                job_json(2, "package", "success", "fedcba9876543210fedcba9876543210fedcba98"),
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let jobs = client.commit_jobs(7, sha).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, 3);

        let jobs = client.commit_jobs(7, "01234567").await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn commit_jobs_follow_next_page() {
        let server = MockServer::start().await;
        let sha = "0123456789abcdef0123456789abcdef01234567";
        let other = "fedcba9876543210fedcba9876543210fedcba98";

        let first: Vec<Value> = (0..100)
            .map(|index| job_json(1000 - index, "package", "success", other))
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Next-Page", "2")
                    .set_body_json(first),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Next-Page", "")
                    .set_body_json(json!([job_json(42, "package", "success", sha)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let jobs = client_for(&server).commit_jobs(7, sha).await.unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, 42);
        assert_eq!(jobs[0].name, "package");
    }

    #[tokio::test]
    async fn artifacts_are_written_to_disk() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/jobs/3/artifacts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("artifacts.zip");

        let size = client_for(&server)
            .download_artifacts(7, 3, &target)
            .await
            .unwrap();

        assert_eq!(size, 9);
        assert_eq!(std::fs::read(&target).unwrap(), b"zip bytes");
    }

    #[tokio::test]
    async fn http_errors_are_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).project(1).await,
            Err(GitlabError::Http(_))
        ));
    }

    #[test]
    fn missing_host() {
        assert!(matches!(
            GitlabClient::new(&config::Gitlab::default()),
            Err(GitlabError::Config(_))
        ));
    }
}
