//! Key material orchestration.

use std::time::Duration;

use serde_json::Value;

use crate::error::{ReconcileError, Result as DeployResult};
use crate::keys::{FundOutcome, KeyKind, SolanaCli, fund};
use crate::process::CommandRunner;
use crate::retry::PollSchedule;

use super::{CommandOutcome, CommandReport, Services};

/// A `keys` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysRequest {
    /// Create missing keypairs and record their public keys.
    Generate,
    /// Airdrop to the identity and wait for the balance.
    Fund {
        /// Whole SOL to request; the configured default when `None`.
        amount: Option<u64>,
    },
    /// Show recorded public keys and the identity balance.
    Show,
}

/// Run a `keys` subcommand.
///
/// # Errors
///
/// Returns `ReconcileError::KeysNotGenerated` when funding before any key
/// exists, and keygen, CLI and store failures.
pub async fn keys<C, V, R, P>(
    services: &Services<C, V, R, P>,
    request: KeysRequest,
) -> DeployResult<CommandReport>
where
    R: CommandRunner,
{
    let cli = SolanaCli::from_config(&services.runner, &services.config.solana);
    match request {
        KeysRequest::Generate => generate(services, &cli).await,
        KeysRequest::Fund { amount } => {
            let sol = amount.unwrap_or(services.config.solana.airdrop_sol);
            fund_identity(services, &cli, sol).await
        }
        KeysRequest::Show => show(services, &cli).await,
    }
}

async fn generate<C, V, R, P>(
    services: &Services<C, V, R, P>,
    cli: &SolanaCli<&R>,
) -> DeployResult<CommandReport>
where
    R: CommandRunner,
{
    let pairs = cli.generate(&services.config.state.keys_dir).await?;
    services.store.set_fields(
        pairs
            .iter()
            .map(|pair| (pair.kind.store_key(), Value::from(pair.pubkey.clone()))),
    )?;

    let created = pairs.iter().filter(|pair| pair.created).count();
    let lines: String = pairs
        .iter()
        .map(|pair| {
            let note = if pair.created { "new" } else { "kept" };
            format!("\n  {:<13}{} ({note}, {})", pair.kind.label(), pair.pubkey, pair.path)
        })
        .collect();
    let outcome = if created == 0 {
        CommandOutcome::NoOp
    } else {
        CommandOutcome::Success
    };
    Ok(CommandReport::new(
        outcome,
        format!("Keys in {}:{lines}", services.config.state.keys_dir),
    ))
}

async fn fund_identity<C, V, R, P>(
    services: &Services<C, V, R, P>,
    cli: &SolanaCli<&R>,
    sol: u64,
) -> DeployResult<CommandReport>
where
    R: CommandRunner,
{
    let pubkey = identity(services)?.ok_or(ReconcileError::KeysNotGenerated)?;
    let schedule = PollSchedule::new(
        Duration::from_secs(services.config.polling.interval_secs),
        services.config.solana.balance_poll_attempts,
    );
    let report = match fund(cli, &pubkey, sol, &schedule, &services.cancel).await? {
        FundOutcome::AlreadyFunded { balance } => CommandReport::new(
            CommandOutcome::NoOp,
            format!("Identity {pubkey} already holds {balance}; no airdrop requested."),
        ),
        FundOutcome::Funded { balance } => CommandReport::new(
            CommandOutcome::Success,
            format!("Identity {pubkey} now holds {balance}."),
        ),
        FundOutcome::Pending { attempts } => CommandReport::new(
            CommandOutcome::TimedOut,
            format!(
                "Airdrop to {pubkey} was accepted but the balance had not updated after {attempts} checks; it may still arrive. Check with `valdeploy keys show`."
            ),
        ),
        FundOutcome::Interrupted => CommandReport::new(
            CommandOutcome::TimedOut,
            format!(
                "Stopped waiting for the airdrop to {pubkey}; it may still arrive. Check with `valdeploy keys show`."
            ),
        ),
    };
    Ok(report)
}

async fn show<C, V, R, P>(
    services: &Services<C, V, R, P>,
    cli: &SolanaCli<&R>,
) -> DeployResult<CommandReport>
where
    R: CommandRunner,
{
    let Some(pubkey) = identity(services)? else {
        return Ok(CommandReport::new(
            CommandOutcome::NoOp,
            "No keys recorded. Run `valdeploy keys generate`.",
        ));
    };

    let mut lines = Vec::with_capacity(KeyKind::ALL.len() + 1);
    for kind in KeyKind::ALL {
        let recorded = services.store.get_field_or(kind.store_key(), String::new())?;
        let shown = if recorded.is_empty() { "-" } else { recorded.as_str() };
        lines.push(format!("{:<13}{shown}", kind.label()));
    }
    let balance = match cli.balance(&pubkey).await {
        Ok(amount) => amount.to_string(),
        Err(error) => format!("unavailable ({error})"),
    };
    lines.push(format!("{:<13}{balance}", "balance"));
    Ok(CommandReport::new(CommandOutcome::Success, lines.join("\n")))
}

fn identity<C, V, R, P>(services: &Services<C, V, R, P>) -> DeployResult<Option<String>> {
    let pubkey: String = services
        .store
        .get_field_or(KeyKind::Identity.store_key(), String::new())?;
    Ok((!pubkey.is_empty()).then_some(pubkey))
}
