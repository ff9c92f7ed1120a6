use std::path::PathBuf;

use derive_more::{Display, Error};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

/// Configuration file loaded when no other path is provided.
pub const DEFAULT_CONFIG_FILE: &str = "CiHelper.toml";

/// A configuration value required by the current command is not set.
///
/// Contains the name of the environment variable that provides the value.
#[derive(Debug, Display, Error)]
#[display(fmt = "missing configuration: {} is not set", _0)]
pub struct MissingConfig(#[error(ignore)] pub &'static str);

/// GitLab API configuration.
#[derive(Clone, Deserialize)]
pub struct Gitlab {
    /// GitLab host, for example `https://gitlab.com`.
    #[serde(default)]
    pub host: Option<String>,

    /// Personal access token.
    #[serde(default)]
    pub token: Option<String>,

    /// API path appended to the host.
    #[serde(default = "default_api_path")]
    pub api_path: String,
}

fn default_api_path() -> String {
    String::from("/api/v4")
}

impl Default for Gitlab {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            api_path: default_api_path(),
        }
    }
}

impl Gitlab {
    /// Full API base URL, without a trailing slash.
    pub fn api_url(&self) -> Result<String, MissingConfig> {
        let host = self.host.as_deref().ok_or(MissingConfig("GITLAB_HOST"))?;

        Ok(format!(
            "{}/{}",
            host.trim_end_matches('/'),
            self.api_path.trim_matches('/')
        ))
    }
}

/// AWS S3-compatible storage configuration.
///
/// Credentials left unset are resolved by the AWS SDK default provider chain.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Access key identifier.
    pub access_key_id: Option<String>,

    /// Secret access key.
    pub secret_access_key: Option<String>,

    /// S3 region name.
    pub region: Option<String>,

    /// S3 endpoint URL, for non-AWS providers.
    pub endpoint: Option<String>,

    /// Bucket that stores workspace archives.
    pub bucket: Option<String>,
}

/// Jenkins API configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Jenkins {
    /// Jenkins host.
    pub host: Option<String>,

    /// User name used for basic authentication.
    pub user: Option<String>,

    /// API token associated with the user.
    pub api_token: Option<String>,
}

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
///
/// [`FromStr`]: std::str::FromStr
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

/// General configuration.
#[derive(Default, Deserialize)]
pub struct Config {
    /// GitLab API configuration.
    #[serde(default)]
    pub gitlab: Gitlab,

    /// Object storage configuration.
    #[serde(default)]
    pub storage: Storage,

    /// Jenkins API configuration.
    #[serde(default)]
    pub jenkins: Jenkins,

    /// Logging configuration.
    #[cfg(feature = "logging")]
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    /// Create new config using the configuration file and environment variables.
    ///
    /// The file is optional. Environment variables take precedence over it:
    /// `GITLAB_*`, `AWS_*` and `JENKINS_*` fill the matching sections, while
    /// `CI_HELPER_*` can set any value with `__` as the nesting separator
    /// (for example `CI_HELPER_LOGGING__LEVEL=debug`).
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: Option<PathBuf>) -> Figment {
        Figment::new()
            .merge(Toml::file(
                path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            ))
            .merge(section_env("GITLAB_", "gitlab", &["host", "token", "api_path"]))
            .merge(section_env(
                "AWS_",
                "storage",
                &[
                    "access_key_id",
                    "secret_access_key",
                    "region",
                    "endpoint",
                    "bucket",
                ],
            ))
            .merge(section_env(
                "JENKINS_",
                "jenkins",
                &["host", "user", "api_token"],
            ))
            .merge(Env::prefixed("CI_HELPER_").split("__"))
    }
}

/// Map well-known environment variables onto a configuration section.
fn section_env(prefix: &str, section: &'static str, keys: &'static [&'static str]) -> Env {
    Env::prefixed(prefix)
        .only(keys)
        .map(move |key| format!("{section}.{key}").into())
}
