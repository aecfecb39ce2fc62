//! Instance lifecycle and status orchestration.

use tracing::{debug, warn};

use crate::cloud::{CloudClient, ProbeReport, ResourceState};
use crate::error::Result as DeployResult;
use crate::gate::Prompter;
use crate::keys::SolanaCli;
use crate::process::CommandRunner;
use crate::provision::Provisioner;
use crate::reconcile::{ActionOutcome, ActionRequest, Completion, StatusReport, WaitEnd};
use crate::remote::{RemoteTarget, SshExecutor, Supervisor};
use crate::state::{DeploymentRecord, keys};

use super::{CommandOutcome, CommandReport, Services};

/// Run `deploy`, `start`, `stop` or `destroy`.
///
/// Declined confirmations and benign conflicts are successful outcomes; a
/// wait that runs out is [`CommandOutcome::TimedOut`].
///
/// # Errors
///
/// Returns fatal lifecycle conflicts (for example starting a terminated
/// instance), probe failures, tool failures and store failures.
pub async fn run_action<C, V, R, P>(
    services: &Services<C, V, R, P>,
    request: ActionRequest,
) -> DeployResult<CommandReport>
where
    C: CloudClient,
    V: Provisioner,
    R: CommandRunner,
    P: Prompter,
{
    let outcome = services.reconciler().execute(request).await?;
    Ok(describe(outcome))
}

fn describe(outcome: ActionOutcome) -> CommandReport {
    match outcome {
        ActionOutcome::Completed(completion) => {
            CommandReport::new(CommandOutcome::Success, describe_completion(&completion))
        }
        ActionOutcome::NoOp(reason) => {
            CommandReport::new(CommandOutcome::NoOp, capitalise(&reason.to_string()))
        }
        ActionOutcome::Declined => {
            CommandReport::new(CommandOutcome::Declined, "Cancelled; nothing was changed.")
        }
        ActionOutcome::StillInProgress {
            resource_id,
            target,
            ended,
        } => {
            let why = match ended {
                WaitEnd::TimedOut { attempts } => format!("after {attempts} checks"),
                WaitEnd::Interrupted => String::from("because the wait was interrupted"),
            };
            CommandReport::new(
                CommandOutcome::TimedOut,
                format!(
                    "Instance {resource_id} was not yet {target} {why}; the change may still be in progress. Run `valdeploy status` to check."
                ),
            )
        }
        ActionOutcome::Reported(report) => {
            CommandReport::new(CommandOutcome::Success, report.to_string())
        }
    }
}

fn describe_completion(completion: &Completion) -> String {
    match completion {
        Completion::Deployed {
            resource_id,
            public_address,
        } => format!(
            "Deployed instance {resource_id} at {}. Next: `valdeploy keys generate`, then `valdeploy validator deploy`.",
            public_address.as_deref().unwrap_or("an address not yet assigned")
        ),
        Completion::Started {
            resource_id,
            public_address,
        } => format!(
            "Instance {resource_id} is running at {}.",
            public_address.as_deref().unwrap_or("an address not yet assigned")
        ),
        Completion::Stopped { resource_id } => format!(
            "Instance {resource_id} is stopped. Compute billing has stopped; attached storage is still billed."
        ),
        Completion::Destroyed {
            resource_id,
            removed,
        } => {
            let paths: String = removed
                .iter()
                .map(|path| format!("\n  removed {path}"))
                .collect();
            format!("Destroyed instance {resource_id} and cleared the local record.{paths}")
        }
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect::<String>() + "."
    })
}

/// Run `status` once.
///
/// Unless `quick` is set, a running instance also gets a remote health probe
/// and a recorded vote account is looked up on the cluster. Failures of
/// either are shown in the report rather than failing it.
///
/// # Errors
///
/// Returns store failures and non-transient probe failures such as rejected
/// credentials.
pub async fn status<C, V, R, P>(
    services: &Services<C, V, R, P>,
    quick: bool,
) -> DeployResult<CommandReport>
where
    C: CloudClient,
    V: Provisioner,
    R: CommandRunner,
    P: Prompter,
{
    let report = status_report(services, quick).await?;
    Ok(CommandReport::new(CommandOutcome::Success, report.to_string()))
}

/// Re-run `status` on the polling interval until cancelled.
///
/// `on_report` receives each fresh report; returning an error stops the loop.
///
/// # Errors
///
/// Returns the first error from a status run or from `on_report`.
pub async fn watch_status<C, V, R, P, F>(
    services: &Services<C, V, R, P>,
    quick: bool,
    mut on_report: F,
) -> DeployResult<CommandReport>
where
    C: CloudClient,
    V: Provisioner,
    R: CommandRunner,
    P: Prompter,
    F: FnMut(&StatusReport) -> DeployResult<()>,
{
    let interval = services.settings.poll.interval;
    loop {
        let report = status_report(services, quick).await?;
        on_report(&report)?;
        if !services.cancel.sleep(interval).await {
            debug!("status watch interrupted");
            return Ok(CommandReport::new(CommandOutcome::Success, ""));
        }
    }
}

async fn status_report<C, V, R, P>(
    services: &Services<C, V, R, P>,
    quick: bool,
) -> DeployResult<StatusReport>
where
    C: CloudClient,
    V: Provisioner,
    R: CommandRunner,
    P: Prompter,
{
    let record = services.store.load()?;
    let live = match record.resource_id() {
        Some(resource_id) => services.probe.probe(resource_id).await?,
        None => ProbeReport::absent(),
    };
    let check_health = !quick && live.state == ResourceState::Running;
    let mut report = services.reconciler().status_report(&record, live);
    if check_health {
        report.validator_health = Some(validator_health(services, &record).await);
    }
    if !quick && report.is_deployed() {
        report.vote_account = vote_account(services).await?;
    }
    Ok(report)
}

async fn vote_account<C, V, R, P>(services: &Services<C, V, R, P>) -> DeployResult<Option<String>>
where
    R: CommandRunner,
{
    let pubkey: String = services.store.get_field_or(keys::VOTE_PUBKEY, String::new())?;
    if pubkey.is_empty() {
        return Ok(None);
    }
    let cli = SolanaCli::from_config(&services.runner, &services.config.solana);
    let line = match cli.vote_account(&pubkey).await {
        Ok(Some(account)) => format!("{pubkey} ({account})"),
        Ok(None) => format!("{pubkey} (not found)"),
        Err(error) => {
            warn!(pubkey = %pubkey, %error, "vote account lookup failed");
            format!("{pubkey} (not checked: {error})")
        }
    };
    Ok(Some(line))
}

async fn validator_health<C, V, R, P>(
    services: &Services<C, V, R, P>,
    record: &DeploymentRecord,
) -> String
where
    R: CommandRunner,
{
    let target = match RemoteTarget::resolve(record, &services.config.ssh) {
        Ok(target) => target,
        Err(error) => return format!("not checked ({error})"),
    };
    let supervisor = Supervisor::new(
        SshExecutor::from_config(&services.runner, &services.config.ssh),
        services.config.validator.service.as_str(),
    );
    match supervisor.health(&target).await {
        Ok(state) => state,
        Err(error) => {
            warn!(host = %target.host, %error, "validator health probe failed");
            format!("unreachable ({error})")
        }
    }
}
