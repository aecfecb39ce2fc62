//! Semantic error types for the valdeploy application.
//!
//! This module defines the error hierarchy for valdeploy, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect, retry, or map to an exit code, while reserving opaque
//! errors (`eyre::Report`) for the application boundary.
//!
//! Fatal messages name the cause and, where one exists, the next command the
//! operator should run.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while invoking local tools (Terraform, AWS CLI, SSH, Solana CLI).
#[derive(Debug, Error)]
pub enum ToolError {
    /// One or more prerequisites are missing; these cannot self-heal.
    #[error("missing prerequisites: {items}")]
    MissingPrerequisites {
        /// Comma-separated list of missing tools or credentials.
        items: String,
    },

    /// The program could not be found on `PATH`.
    #[error("required tool '{program}' was not found on PATH")]
    MissingTool {
        /// The program name.
        program: String,
    },

    /// The program was found but could not be spawned.
    #[error("failed to run '{program}': {message}")]
    SpawnFailed {
        /// The program name.
        program: String,
        /// A description of the spawn failure.
        message: String,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program} {subcommand}' exited with status {code}: {stderr}")]
    CommandFailed {
        /// The program name.
        program: String,
        /// The first argument, used to tell apart `terraform apply` from `terraform destroy`.
        subcommand: String,
        /// The exit status, or `-1` when terminated by a signal.
        code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The program succeeded but its output could not be understood.
    #[error("'{program}' produced unexpected output: {message}")]
    UnexpectedOutput {
        /// The program name.
        program: String,
        /// What was wrong with the output.
        message: String,
    },

    /// Reading the operator's answer or writing a report failed.
    #[error("terminal I/O failed: {message}")]
    Terminal {
        /// A description of the I/O error.
        message: String,
    },
}

impl ToolError {
    /// Wrap a terminal read or write failure.
    #[must_use]
    pub fn terminal(error: &std::io::Error) -> Self {
        Self::Terminal {
            message: error.to_string(),
        }
    }
}

/// Errors returned by the cloud provider control plane.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials were rejected. Never retried.
    #[error("cloud provider rejected credentials: {message}")]
    AuthenticationFailed {
        /// The provider's message.
        message: String,
    },

    /// Throttling or a network failure; worth another attempt.
    #[error("{operation} failed transiently: {message}")]
    Transient {
        /// The operation that was attempted.
        operation: String,
        /// The provider's message.
        message: String,
    },

    /// A transient failure (throttling, network) persisted across every retry.
    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// The operation that was attempted.
        operation: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last failure message.
        message: String,
    },

    /// The provider answered with something that could not be decoded.
    #[error("unexpected response from cloud provider: {message}")]
    InvalidResponse {
        /// A description of the decoding failure.
        message: String,
    },

    /// The provider refused the request for a non-transient reason.
    #[error("{operation} was rejected by the cloud provider: {message}")]
    RequestFailed {
        /// The operation that was attempted.
        operation: String,
        /// The provider's message.
        message: String,
    },
}

/// Errors raised by the declarative state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading, writing or renaming the store file failed.
    #[error("state store I/O error at '{path}': {message}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },

    /// The store file exists but is not a JSON object.
    #[error("state store at '{path}' is not valid: {message}")]
    Corrupt {
        /// The store path.
        path: PathBuf,
        /// A description of the parse failure.
        message: String,
    },

    /// A dotted key path could not be applied to the stored document.
    #[error("cannot set '{key}': {reason}")]
    InvalidKey {
        /// The dotted key path.
        key: String,
        /// Why the key cannot be applied.
        reason: String,
    },
}

/// Fatal lifecycle conflicts. Benign conflicts are reported as no-ops instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The resource is gone and cannot be started again.
    #[error("instance '{resource_id}' is {state} and cannot be started; re-provision with `valdeploy deploy`")]
    CannotResurrect {
        /// The recorded resource id.
        resource_id: String,
        /// The live state reported by the provider.
        state: String,
    },

    /// The provider could not report a state, so no safe transition exists.
    #[error("live state of instance '{resource_id}' is unknown ({reason}); retry `valdeploy status` once the provider is reachable")]
    LiveStateUnknown {
        /// The recorded resource id.
        resource_id: String,
        /// Why the probe could not decide.
        reason: String,
    },

    /// The action needs a deployed resource but nothing is recorded.
    #[error("nothing is deployed; run `valdeploy deploy` first")]
    NotDeployed,

    /// The resource is recorded but has no public address.
    #[error("instance '{resource_id}' has no public address; run `valdeploy start` and retry")]
    NoAddress {
        /// The recorded resource id.
        resource_id: String,
    },

    /// Funding or showing keys was requested before any were generated.
    #[error("no identity key is recorded; run `valdeploy keys generate` first")]
    KeysNotGenerated,

    /// The infrastructure tool reported success but produced no resource id.
    #[error("provisioning finished but output '{output}' is empty; inspect the Terraform state and re-run `valdeploy deploy`")]
    ProvisioningIncomplete {
        /// The output key that was empty.
        output: String,
    },
}

/// Top-level error type for the valdeploy application.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the application. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum DeployError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while invoking a local tool.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// An error occurred talking to the cloud provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An error occurred in the state store.
    #[error(transparent)]
    State(#[from] StateError),

    /// A lifecycle conflict made the requested action impossible.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl DeployError {
    /// Whether another attempt at the same call might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::Transient { .. }))
    }
}

/// A specialised `Result` type for valdeploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Report;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store_path() -> PathBuf {
        PathBuf::from("/srv/valdeploy/deployment.json")
    }

    #[fixture]
    fn resource_id() -> String {
        String::from("i-abc123")
    }

    #[rstest]
    fn config_error_file_not_found_displays_correctly() {
        let error = ConfigError::FileNotFound {
            path: PathBuf::from("/etc/valdeploy/config.toml"),
        };
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/valdeploy/config.toml"
        );
    }

    #[rstest]
    #[case(
        "pricing.fallback_rate",
        "expected a decimal amount",
        "invalid configuration value for 'pricing.fallback_rate': expected a decimal amount"
    )]
    #[case(
        "aws.instance_type",
        "cannot be empty",
        "invalid configuration value for 'aws.instance_type': cannot be empty"
    )]
    fn config_error_invalid_value_displays_correctly(
        #[case] field: &str,
        #[case] reason: &str,
        #[case] expected: &str,
    ) {
        let error = ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from(reason),
        };
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn tool_error_command_failed_includes_subcommand() {
        let error = ToolError::CommandFailed {
            program: String::from("terraform"),
            subcommand: String::from("apply"),
            code: 1,
            stderr: String::from("quota exceeded"),
        };
        assert_eq!(
            error.to_string(),
            "'terraform apply' exited with status 1: quota exceeded"
        );
    }

    #[rstest]
    fn provider_error_retries_exhausted_reports_attempts() {
        let error = ProviderError::RetriesExhausted {
            operation: String::from("describe-instances"),
            attempts: 3,
            message: String::from("RequestLimitExceeded"),
        };
        assert_eq!(
            error.to_string(),
            "describe-instances failed after 3 attempts: RequestLimitExceeded"
        );
    }

    #[rstest]
    #[case(DeployError::from(ProviderError::Transient {
        operation: String::from("describe-instances"),
        message: String::from("Throttling"),
    }), true)]
    #[case(DeployError::from(ProviderError::AuthenticationFailed {
        message: String::from("AuthFailure"),
    }), false)]
    #[case(DeployError::from(ReconcileError::NotDeployed), false)]
    fn only_transient_provider_errors_are_retryable(
        #[case] error: DeployError,
        #[case] expected: bool,
    ) {
        assert_eq!(error.is_transient(), expected);
    }

    #[rstest]
    fn state_error_io_displays_path(store_path: PathBuf) {
        let error = StateError::Io {
            path: store_path,
            message: String::from("disk full"),
        };
        assert_eq!(
            error.to_string(),
            "state store I/O error at '/srv/valdeploy/deployment.json': disk full"
        );
    }

    #[rstest]
    fn reconcile_error_cannot_resurrect_names_next_command(resource_id: String) {
        let error = ReconcileError::CannotResurrect {
            resource_id,
            state: String::from("terminated"),
        };
        assert!(error.to_string().contains("valdeploy deploy"));
        assert!(error.to_string().contains("i-abc123"));
    }

    #[rstest]
    #[case(
        DeployError::from(ConfigError::MissingRequired {
            field: String::from("ssh.key_file"),
        }),
        "missing required configuration: ssh.key_file"
    )]
    #[case(
        DeployError::from(ToolError::MissingTool {
            program: String::from("terraform"),
        }),
        "required tool 'terraform' was not found on PATH"
    )]
    #[case(
        DeployError::from(ReconcileError::NotDeployed),
        "nothing is deployed; run `valdeploy deploy` first"
    )]
    fn eyre_report_preserves_error_messages(#[case] error: DeployError, #[case] expected: &str) {
        let report = Report::from(error);
        assert_eq!(report.to_string(), expected);
    }
}
