use std::env;

use common::config::MissingConfig;
use regex::Regex;

use crate::gitlab::Project;

/// Reference names matching this pattern are stored as releases.
pub(crate) const DEFAULT_TAG_MATCHER: &str = r"(v|)[0-9]{1,}\.[0-9]{1,}\.[0-9]{1,}(-[A-Za-z]*|)";

/// Predefined CI variable, with the name used by runners before GitLab 9.0.
pub(crate) struct Variable {
    pub name: &'static str,
    pub legacy: Option<&'static str>,
}

pub(crate) const JOB_ID: Variable = Variable::renamed("CI_JOB_ID", "CI_BUILD_ID");
pub(crate) const JOB_NAME: Variable = Variable::renamed("CI_JOB_NAME", "CI_BUILD_NAME");
pub(crate) const JOB_STAGE: Variable = Variable::renamed("CI_JOB_STAGE", "CI_BUILD_STAGE");
pub(crate) const COMMIT_SHA: Variable = Variable::renamed("CI_COMMIT_SHA", "CI_BUILD_REF");
pub(crate) const COMMIT_REF_NAME: Variable =
    Variable::renamed("CI_COMMIT_REF_NAME", "CI_BUILD_REF_NAME");
pub(crate) const COMMIT_TAG: Variable = Variable::renamed("CI_COMMIT_TAG", "CI_BUILD_TAG");
pub(crate) const PROJECT_ID: Variable = Variable::new("CI_PROJECT_ID");
pub(crate) const PROJECT_DIR: Variable = Variable::new("CI_PROJECT_DIR");
pub(crate) const SERVER_NAME: Variable = Variable::new("CI_SERVER_NAME");
pub(crate) const SERVER_REVISION: Variable = Variable::new("CI_SERVER_REVISION");
pub(crate) const SERVER_VERSION: Variable = Variable::new("CI_SERVER_VERSION");

impl Variable {
    const fn new(name: &'static str) -> Self {
        Self { name, legacy: None }
    }

    const fn renamed(name: &'static str, legacy: &'static str) -> Self {
        Self {
            name,
            legacy: Some(legacy),
        }
    }

    /// Resolve the variable through `lookup`, falling back to the legacy name.
    ///
    /// Empty values count as unset.
    pub fn resolve_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        non_empty(self.name).or_else(|| self.legacy.and_then(non_empty))
    }

    /// Resolve the variable from the process environment.
    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|name| env::var(name).ok())
    }
}

/// Command line value, or the CI variable when the option was omitted.
pub(crate) fn or_variable(value: Option<String>, variable: &Variable) -> Option<String> {
    value
        .filter(|value| !value.is_empty())
        .or_else(|| variable.resolve())
}

/// Same as [`or_variable`], failing when neither is set.
pub(crate) fn required(
    value: Option<String>,
    variable: &Variable,
) -> Result<String, MissingConfig> {
    or_variable(value, variable).ok_or(MissingConfig(variable.name))
}

/// Object key of the workspace archive of a job.
///
/// References matching `tag_matcher` land under `releases/` and use the
/// reference name, everything else under `commits/` with the commit sha.
pub(crate) fn archive_key(
    project: &Project,
    sha: &str,
    ref_name: &str,
    job: &str,
    tag_matcher: &Regex,
) -> String {
    let (section, reference) = if tag_matcher.is_match(ref_name) {
        ("releases", ref_name)
    } else {
        ("commits", sha)
    };

    format!(
        "{section}/{}/{}/{reference}_{job}.zip",
        project.namespace.path, project.path
    )
}
