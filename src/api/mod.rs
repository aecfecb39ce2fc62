//! Orchestration API for valdeploy commands.
//!
//! This module provides one orchestration function per command family:
//! [`run_action`] for the instance lifecycle, [`status`] and
//! [`watch_status`] for reporting, [`validator`] for the remote service and
//! [`keys()`] for key material. They contain the business logic behind the CLI
//! so it can be driven by the binary and by behavioural tests alike.
//!
//! All functions accept library-owned types (not clap types) and return
//! [`crate::error::Result<CommandReport>`]. They do not print to
//! stdout/stderr or call `std::process::exit`; streamed tool output (Terraform
//! runs and followed logs) goes straight from the child to the terminal.

mod keys;
mod lifecycle;
mod validator;

use std::time::Duration;

pub use keys::{KeysRequest, keys};
pub use lifecycle::{run_action, status, watch_status};
pub use validator::{ValidatorRequest, validator};

use crate::cloud::{AwsCli, CloudClient, InstanceProbe};
use crate::config::AppConfig;
use crate::error::Result as DeployResult;
use crate::gate::{Prompter, TerminalPrompter};
use crate::process::{CommandRunner, SystemRunner};
use crate::provision::{Provisioner, TerraformCli};
use crate::reconcile::{ReconcileSettings, Reconciler};
use crate::retry::{CancellationToken, RetryPolicy};
use crate::state::StateStore;

/// Outcome of a valdeploy command.
///
/// The CLI adapter maps each outcome to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command did what was asked (exit code 0).
    Success,
    /// Nothing needed doing (exit code 0).
    NoOp,
    /// The operator declined the confirmation (exit code 0).
    Declined,
    /// A wait ran out before the change was observed; it may still be in
    /// progress (exit code 1).
    TimedOut,
}

impl CommandOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success | Self::NoOp | Self::Declined => 0,
            Self::TimedOut => 1,
        }
    }
}

/// An outcome plus the text to show the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    /// How the command ended.
    pub outcome: CommandOutcome,
    /// Human-readable summary; empty when output was streamed.
    pub message: String,
}

impl CommandReport {
    /// Build a report.
    #[must_use]
    pub fn new(outcome: CommandOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// Collaborators shared by every command.
///
/// The type parameters are the seams: the cloud client, the provisioner, the
/// runner used for SSH and the Solana CLI, and the prompter.
#[derive(Debug)]
pub struct Services<C, V, R, P> {
    /// Loaded configuration.
    pub config: AppConfig,
    /// Deployment record.
    pub store: StateStore,
    /// Live-state probe.
    pub probe: InstanceProbe<C>,
    /// Infrastructure tool.
    pub provisioner: V,
    /// Runner for remote and key commands.
    pub runner: R,
    /// Confirmation prompter.
    pub prompter: P,
    /// Settings derived from `config`.
    pub settings: ReconcileSettings,
    /// Cancels waits when the operator interrupts.
    pub cancel: CancellationToken,
}

/// The injectable parts of [`Services`].
///
/// Groups the seams passed to [`Services::new`] to keep its parameter list
/// short.
#[derive(Debug)]
pub struct Collaborators<C, V, R, P> {
    /// Cloud control-plane client.
    pub client: C,
    /// Infrastructure tool.
    pub provisioner: V,
    /// Runner for remote and key commands.
    pub runner: R,
    /// Confirmation prompter.
    pub prompter: P,
}

/// [`Services`] wired to the real tools.
pub type SystemServices =
    Services<AwsCli<SystemRunner>, TerraformCli<SystemRunner>, SystemRunner, TerminalPrompter>;

impl SystemServices {
    /// Wire the real tools from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable rates and
    /// `StateError::Io` when the store directory cannot be opened.
    pub fn from_config(config: AppConfig, cancel: CancellationToken) -> DeployResult<Self> {
        let client = AwsCli::new(
            SystemRunner,
            config.aws.binary.as_str(),
            config.effective_region(),
        )
        .with_profile(config.profile.clone());
        let collaborators = Collaborators {
            client,
            provisioner: TerraformCli::from_config(SystemRunner, &config),
            runner: SystemRunner,
            prompter: TerminalPrompter::new(cancel.clone()),
        };
        Services::new(config, collaborators, cancel)
    }
}

impl<C, V, R, P> Services<C, V, R, P>
where
    C: CloudClient,
    V: Provisioner,
    R: CommandRunner,
    P: Prompter,
{
    /// Assemble services around the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable rates and
    /// `StateError::Io` when the store directory cannot be opened.
    pub fn new(
        config: AppConfig,
        collaborators: Collaborators<C, V, R, P>,
        cancel: CancellationToken,
    ) -> DeployResult<Self> {
        let Collaborators {
            client,
            provisioner,
            runner,
            prompter,
        } = collaborators;
        let settings = ReconcileSettings::from_config(&config)?;
        let store = StateStore::open(&config.state.file)?;
        let policy = RetryPolicy::new(
            config.polling.probe_retries,
            Duration::from_millis(config.polling.backoff_base_ms),
        );
        Ok(Self {
            probe: InstanceProbe::new(client, policy, cancel.clone()),
            config,
            store,
            provisioner,
            runner,
            prompter,
            settings,
            cancel,
        })
    }

    fn reconciler(&self) -> Reconciler<'_, C, V, P> {
        Reconciler::new(
            &self.store,
            &self.probe,
            &self.provisioner,
            &self.prompter,
            &self.settings,
        )
    }
}
