//! Validator service orchestration over SSH.

use crate::error::Result as DeployResult;
use crate::process::CommandRunner;
use crate::remote::{LogOutput, RemoteTarget, SshExecutor, Supervisor};
use crate::state::keys;

use super::{CommandOutcome, CommandReport, Services};

/// A `validator` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorRequest {
    /// Install the validator binary and its systemd unit.
    Deploy,
    /// Start the service.
    Start,
    /// Stop the service.
    Stop,
    /// Show the unit status.
    Status,
    /// Show or follow the journal.
    Logs {
        /// Lines to show; the configured default when `None`.
        lines: Option<u32>,
        /// Keep streaming new lines.
        follow: bool,
    },
}

/// Run a `validator` subcommand on the recorded host.
///
/// Only a completed `deploy` marks the validator as deployed in the store.
///
/// # Errors
///
/// Returns `ReconcileError::NotDeployed` or `ReconcileError::NoAddress` when
/// there is no host to reach, and connection or remote command failures.
pub async fn validator<C, V, R, P>(
    services: &Services<C, V, R, P>,
    request: ValidatorRequest,
) -> DeployResult<CommandReport>
where
    R: CommandRunner,
{
    let record = services.store.load()?;
    let target = RemoteTarget::resolve(&record, &services.config.ssh)?;
    let supervisor = Supervisor::new(
        SshExecutor::from_config(&services.runner, &services.config.ssh),
        services.config.validator.service.as_str(),
    );

    let message = match request {
        ValidatorRequest::Deploy => {
            let settings = &services.config.validator;
            supervisor
                .install(&target, &settings.install_command, &settings.exec_start)
                .await?;
            services.store.set_field(keys::VALIDATOR_DEPLOYED, true)?;
            format!(
                "Installed {} on {}. Start it with `valdeploy validator start`.",
                supervisor.service(),
                target.host
            )
        }
        ValidatorRequest::Start => {
            supervisor.start(&target).await?;
            format!(
                "Started {} on {}. Follow progress with `valdeploy validator logs --follow`.",
                supervisor.service(),
                target.host
            )
        }
        ValidatorRequest::Stop => {
            supervisor.stop(&target).await?;
            format!("Stopped {} on {}.", supervisor.service(), target.host)
        }
        ValidatorRequest::Status => supervisor.status(&target).await?,
        ValidatorRequest::Logs { lines, follow } => {
            let count = lines.unwrap_or(services.config.validator.log_lines);
            match supervisor.logs(&target, count, follow).await? {
                LogOutput::Captured(text) => text,
                LogOutput::Streamed => String::new(),
            }
        }
    };
    Ok(CommandReport::new(CommandOutcome::Success, message))
}
