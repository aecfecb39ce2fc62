//! Local prerequisite checks.
//!
//! Missing tools or credentials cannot heal on retry, so they are all
//! collected and reported in one fatal error before anything is invoked.

use std::path::{Path, PathBuf};

use crate::error::{DeployError, ToolError};

/// Environment variables that, when set, indicate usable AWS credentials.
const AWS_CREDENTIAL_VARS: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_PROFILE"];

/// What a command needs before it may run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prerequisites {
    /// Executables that must resolve on `PATH`.
    pub tools: Vec<String>,
    /// Whether AWS credentials must be discoverable.
    pub aws_credentials: bool,
}

impl Prerequisites {
    /// Require the given tools.
    #[must_use]
    pub fn tools<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            aws_credentials: false,
        }
    }

    /// Additionally require AWS credentials.
    #[must_use]
    pub const fn with_aws_credentials(mut self) -> Self {
        self.aws_credentials = true;
        self
    }
}

/// Verify every prerequisite, reporting all that are missing at once.
///
/// A profile passed on the command line counts as a credential source.
///
/// # Errors
///
/// Returns `ToolError::MissingPrerequisites` listing every missing item.
pub fn check_prerequisites<E: mockable::Env>(
    required: &Prerequisites,
    env: &E,
    profile: Option<&str>,
) -> Result<(), DeployError> {
    let search_path = env.string("PATH").unwrap_or_default();
    let mut missing: Vec<String> = required
        .tools
        .iter()
        .filter(|tool| resolve_on_path(tool, &search_path).is_none())
        .map(|tool| format!("{tool} (not on PATH)"))
        .collect();

    if required.aws_credentials && profile.is_none() && !has_aws_credentials(env) {
        missing.push(String::from(
            "AWS credentials (set AWS_PROFILE, AWS_ACCESS_KEY_ID, or run `aws configure`)",
        ));
    }

    if missing.is_empty() {
        return Ok(());
    }
    Err(ToolError::MissingPrerequisites {
        items: missing.join(", "),
    }
    .into())
}

/// Find `tool` in a `PATH`-style list. Paths containing a separator are
/// checked directly.
fn resolve_on_path(tool: &str, search_path: &str) -> Option<PathBuf> {
    let direct = Path::new(tool);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    std::env::split_paths(search_path)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

fn has_aws_credentials<E: mockable::Env>(env: &E) -> bool {
    let from_env = AWS_CREDENTIAL_VARS
        .iter()
        .filter_map(|var| env.string(var))
        .any(|value| !value.trim().is_empty());
    if from_env {
        return true;
    }
    env.string("HOME")
        .map(|home| Path::new(&home).join(".aws").join("credentials"))
        .is_some_and(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use mockable::MockEnv;
    use rstest::rstest;

    use super::*;

    fn env_with(vars: Vec<(&'static str, String)>) -> MockEnv {
        let mut env = MockEnv::new();
        env.expect_string().returning(move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
        });
        env
    }

    fn bin_dir_with(tools: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        for tool in tools {
            std::fs::write(dir.path().join(tool), b"#!/bin/sh\n").expect("tool stub written");
        }
        dir
    }

    #[rstest]
    fn all_tools_present_and_credentials_set_passes() {
        let bin = bin_dir_with(&["terraform", "aws"]);
        let env = env_with(vec![
            ("PATH", bin.path().display().to_string()),
            ("AWS_PROFILE", String::from("validators")),
        ]);
        let required = Prerequisites::tools(["terraform", "aws"]).with_aws_credentials();
        assert!(check_prerequisites(&required, &env, None).is_ok());
    }

    #[rstest]
    fn every_missing_item_is_listed() {
        let bin = bin_dir_with(&["aws"]);
        let env = env_with(vec![("PATH", bin.path().display().to_string())]);
        let required = Prerequisites::tools(["terraform", "aws", "ssh"]).with_aws_credentials();
        let message = check_prerequisites(&required, &env, None)
            .expect_err("missing tools should fail")
            .to_string();
        assert!(message.contains("terraform (not on PATH)"));
        assert!(message.contains("ssh (not on PATH)"));
        assert!(message.contains("AWS credentials"));
        assert!(!message.contains("aws (not on PATH)"));
    }

    #[rstest]
    fn cli_profile_satisfies_credential_check() {
        let env = env_with(vec![]);
        let required = Prerequisites::default().with_aws_credentials();
        assert!(check_prerequisites(&required, &env, Some("validators")).is_ok());
    }

    #[rstest]
    fn blank_credential_variable_does_not_count() {
        let env = env_with(vec![("AWS_ACCESS_KEY_ID", String::from("  "))]);
        let required = Prerequisites::default().with_aws_credentials();
        assert!(check_prerequisites(&required, &env, None).is_err());
    }
}
