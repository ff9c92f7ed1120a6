use common::config::{Config, MissingConfig};
use derive_more::{Display, Error, From};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::commands::JenkinsStart;

#[derive(Debug, Display, From, Error)]
pub(crate) enum JenkinsError {
    Config(MissingConfig),
    Http(reqwest::Error),

    #[display(fmt = "invalid job parameter {}, expected name:value", _0)]
    #[from(ignore)]
    InvalidParameter(#[error(ignore)] String),

    #[display(fmt = "could not find job {}", _0)]
    #[from(ignore)]
    JobNotFound(#[error(ignore)] String),
}

/// Split `name:value` parameters, the value may contain further colons.
fn parse_parameters(parameters: &[String]) -> Result<Vec<(&str, &str)>, JenkinsError> {
    parameters
        .iter()
        .map(|parameter| {
            parameter
                .split_once(':')
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| JenkinsError::InvalidParameter(parameter.clone()))
        })
        .collect()
}

pub(crate) async fn jenkins_start(
    JenkinsStart {
        job,
        job_token,
        parameters,
    }: JenkinsStart,
    config: &Config,
) -> Result<(), JenkinsError> {
    let parameters = parse_parameters(&parameters)?;

    let host = config
        .jenkins
        .host
        .as_deref()
        .ok_or(MissingConfig("JENKINS_HOST"))?
        .trim_end_matches('/');
    let user = config
        .jenkins
        .user
        .as_deref()
        .ok_or(MissingConfig("JENKINS_USER"))?;
    let api_token = config
        .jenkins
        .api_token
        .as_deref()
        .ok_or(MissingConfig("JENKINS_API_TOKEN"))?;

    let client = Client::new();
    let job_url = format!("{host}/job/{job}");

    let response = client
        .get(format!("{job_url}/api/json"))
        .basic_auth(user, Some(api_token))
        .send()
        .await?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(JenkinsError::JobNotFound(job));
    }

    response.error_for_status()?;

    let mut request = client
        .post(format!("{job_url}/buildWithParameters"))
        .basic_auth(user, Some(api_token))
        .query(&parameters);

    if let Some(token) = &job_token {
        request = request.query(&[("token", token)]);
    }

    debug!(%job, parameters = parameters.len(), "starting job");

    request.send().await?.error_for_status()?;

    info!(%job, "job started");
    println!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use common::config::Config;
    use wiremock::{
        matchers::{basic_auth, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{jenkins_start, parse_parameters, JenkinsError};
    use crate::commands::JenkinsStart;

    fn config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.jenkins.host = Some(server.uri());
        config.jenkins.user = Some("builder".into());
        config.jenkins.api_token = Some("api-token".into());
        config
    }

    #[test]
    fn parameters() {
        let raw = vec![
            "env:prod".to_owned(),
            "url:https://example.com".to_owned(),
            "empty:".to_owned(),
        ];

        assert_eq!(
            parse_parameters(&raw).unwrap(),
            [
                ("env", "prod"),
                ("url", "https://example.com"),
                ("empty", "")
            ]
        );

        for invalid in ["novalue", ":value"] {
            assert!(matches!(
                parse_parameters(&[invalid.to_owned()]),
                Err(JenkinsError::InvalidParameter(_))
            ));
        }
    }

    #[tokio::test]
    async fn starts_job_with_parameters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/job/deploy/api/json"))
            .and(basic_auth("builder", "api-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/job/deploy/buildWithParameters"))
            .and(basic_auth("builder", "api-token"))
            .and(query_param("env", "prod"))
            .and(query_param("token", "job-token"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        jenkins_start(
            JenkinsStart {
                job: "deploy".into(),
                job_token: Some("job-token".into()),
                parameters: vec!["env:prod".into()],
            },
            &config(&server),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unknown_job() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = jenkins_start(
            JenkinsStart {
                job: "missing".into(),
                job_token: None,
                parameters: Vec::new(),
            },
            &config(&server),
        )
        .await;

        assert!(matches!(result, Err(JenkinsError::JobNotFound(job)) if job == "missing"));
    }

    #[tokio::test]
    async fn missing_credentials() {
        let result = jenkins_start(
            JenkinsStart {
                job: "deploy".into(),
                job_token: None,
                parameters: Vec::new(),
            },
            &Config::default(),
        )
        .await;

        assert!(matches!(result, Err(JenkinsError::Config(_))));
    }
}
